//! Local catalog configuration
//!
//! The raw serde types mirror the YAML document operators write; the
//! normalization step validates them and constructs the immutable
//! `ApiConfig`s with live backends. The shared HTTP client is threaded in
//! here so every backend of a catalog generation reuses one pool.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Context};
use pipeline_core::{ApiConfig, Evaluator, EvaluatorType};
use serde::Deserialize;
use tracing::warn;

use crate::evaluators::apikey::{ApiKeyEntry, ApiKeyEvaluator};
use crate::evaluators::oidc::{OidcEvaluator, OidcProvider};
use crate::evaluators::patterns::{PatternOperator, PatternRule, PatternsEvaluator};
use crate::evaluators::{OpaEvaluator, UmaEvaluator, UserInfoEvaluator};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LocalConfig {
    #[serde(default)]
    pub apis: Vec<RawApi>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawApi {
    pub name: String,
    pub hosts: Vec<String>,
    #[serde(default)]
    pub identity: Vec<RawIdentity>,
    #[serde(default)]
    pub metadata: Vec<RawMetadata>,
    #[serde(default)]
    pub authorization: Vec<RawAuthorization>,
}

// no deny_unknown_fields here: it cannot be combined with flatten
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawIdentity {
    pub name: String,
    #[serde(flatten)]
    pub backend: RawIdentityBackend,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RawIdentityBackend {
    Oidc(RawOidc),
    ApiKey(RawApiKey),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawOidc {
    pub issuer: String,
    #[serde(default)]
    pub audiences: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawApiKey {
    #[serde(default = "default_api_key_header")]
    pub header: String,
    pub keys: Vec<RawApiKeyEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawApiKeyEntry {
    pub name: String,
    pub sha256: String,
}

fn default_api_key_header() -> String {
    "x-api-key".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMetadata {
    pub name: String,
    #[serde(flatten)]
    pub backend: RawMetadataBackend,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RawMetadataBackend {
    UserInfo(RawUserInfo),
    Uma(RawUma),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawUserInfo {
    /// Name of the OIDC identity evaluator whose provider is queried.
    pub identity: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawUma {
    pub endpoint: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAuthorization {
    pub name: String,
    #[serde(flatten)]
    pub backend: RawAuthorizationBackend,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RawAuthorizationBackend {
    Opa(RawOpa),
    Patterns(RawPatterns),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawOpa {
    /// Full data-API URL of the rule to query.
    pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawPatterns {
    pub rules: Vec<RawPatternRule>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawPatternRule {
    pub selector: String,
    pub operator: PatternOperator,
    pub value: String,
}

/// A parsed, validated catalog generation ready to install.
#[derive(Debug)]
pub struct NormalizedLocalConfig {
    pub apis: Vec<Arc<ApiConfig>>,
}

impl NormalizedLocalConfig {
    pub fn from(client: reqwest::Client, contents: &str) -> anyhow::Result<Self> {
        let raw: LocalConfig = serde_yaml::from_str(contents).context("parsing catalog config")?;

        let mut seen_hosts = HashSet::new();
        let mut apis = Vec::with_capacity(raw.apis.len());
        for api in raw.apis {
            for host in &api.hosts {
                if !seen_hosts.insert(host.to_ascii_lowercase()) {
                    bail!("host {host:?} is claimed by more than one api");
                }
            }
            apis.push(build_api(&client, api)?);
        }
        Ok(Self { apis })
    }
}

fn build_api(client: &reqwest::Client, api: RawApi) -> anyhow::Result<Arc<ApiConfig>> {
    if api.hosts.is_empty() {
        bail!("api {:?} matches no hosts", api.name);
    }
    if api.identity.is_empty() {
        bail!("api {:?} has no identity evaluators", api.name);
    }

    let mut names = HashSet::new();
    let mut check_name = move |name: &str| -> anyhow::Result<()> {
        if !names.insert(name.to_string()) {
            bail!("api has a duplicate evaluator name {name:?}");
        }
        Ok(())
    };

    let mut providers = std::collections::HashMap::new();
    let mut identity = Vec::with_capacity(api.identity.len());
    for raw in api.identity {
        check_name(&raw.name).with_context(|| format!("api {:?}", api.name))?;
        let evaluator = match raw.backend {
            RawIdentityBackend::Oidc(cfg) => {
                let provider = Arc::new(OidcProvider::new(
                    client.clone(),
                    cfg.issuer,
                    cfg.audiences,
                ));
                providers.insert(raw.name.clone(), provider.clone());
                Evaluator::new(
                    raw.name,
                    EvaluatorType::Oidc,
                    Arc::new(OidcEvaluator::new(provider)),
                )
            }
            RawIdentityBackend::ApiKey(cfg) => {
                let keys = cfg
                    .keys
                    .into_iter()
                    .map(|entry| {
                        if entry.sha256.len() != 64
                            || !entry.sha256.chars().all(|c| c.is_ascii_hexdigit())
                        {
                            bail!(
                                "api key {:?} of evaluator {:?} is not a sha256 digest",
                                entry.name,
                                raw.name
                            );
                        }
                        Ok(ApiKeyEntry {
                            name: entry.name,
                            sha256: entry.sha256,
                        })
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?;
                Evaluator::new(
                    raw.name,
                    EvaluatorType::ApiKey,
                    Arc::new(ApiKeyEvaluator::new(cfg.header, keys)),
                )
            }
        };
        identity.push(Arc::new(evaluator));
    }

    let mut metadata = Vec::with_capacity(api.metadata.len());
    for raw in api.metadata {
        check_name(&raw.name).with_context(|| format!("api {:?}", api.name))?;
        let evaluator = match raw.backend {
            RawMetadataBackend::UserInfo(cfg) => {
                let provider = providers.get(&cfg.identity).cloned().with_context(|| {
                    format!(
                        "userinfo evaluator {:?} references unknown oidc identity {:?}",
                        raw.name, cfg.identity
                    )
                })?;
                Evaluator::new(
                    raw.name,
                    EvaluatorType::UserInfo,
                    Arc::new(UserInfoEvaluator::new(cfg.identity, provider)),
                )
            }
            RawMetadataBackend::Uma(cfg) => Evaluator::new(
                raw.name,
                EvaluatorType::Uma,
                Arc::new(UmaEvaluator::new(
                    client.clone(),
                    cfg.endpoint,
                    cfg.client_id,
                    cfg.client_secret,
                )),
            ),
        };
        metadata.push(Arc::new(evaluator));
    }

    let mut authorization = Vec::with_capacity(api.authorization.len());
    for raw in api.authorization {
        check_name(&raw.name).with_context(|| format!("api {:?}", api.name))?;
        let evaluator = match raw.backend {
            RawAuthorizationBackend::Opa(cfg) => Evaluator::new(
                raw.name,
                EvaluatorType::Opa,
                Arc::new(OpaEvaluator::new(client.clone(), cfg.endpoint)),
            ),
            RawAuthorizationBackend::Patterns(cfg) => {
                let rules = cfg
                    .rules
                    .into_iter()
                    .map(|rule| {
                        PatternRule::new(rule.selector, rule.operator, rule.value)
                            .with_context(|| format!("pattern evaluator {:?}", raw.name))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?;
                Evaluator::new(
                    raw.name,
                    EvaluatorType::Patterns,
                    Arc::new(PatternsEvaluator::new(rules)),
                )
            }
        };
        authorization.push(Arc::new(evaluator));
    }

    if authorization.is_empty() {
        warn!(
            api = %api.name,
            "no authorization evaluators configured; authenticated requests will be allowed"
        );
    }

    Ok(Arc::new(ApiConfig {
        name: api.name,
        hosts: api.hosts,
        identity,
        metadata,
        authorization,
    }))
}
