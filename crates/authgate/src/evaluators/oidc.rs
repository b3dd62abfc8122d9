//! OIDC identity backend
//!
//! Verifies the request's bearer token against an OIDC provider: endpoint
//! discovery, JWKS fetch with an in-memory cache, then `jsonwebtoken`
//! signature and claim validation. The full claim set becomes the identity
//! object.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use pipeline_core::{AuthContext, AuthObject, Evaluate, EvalError};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

const DEFAULT_JWKS_REFRESH: Duration = Duration::from_secs(3600);

/// Relevant subset of the OIDC discovery document.
#[derive(Debug, Clone, Deserialize)]
struct DiscoveryDocument {
    issuer: String,
    jwks_uri: String,
    #[serde(default)]
    userinfo_endpoint: Option<String>,
}

struct JwksCache {
    set: JwkSet,
    last_refresh: Instant,
}

/// A configured OIDC provider, shared between the token verifier and any
/// UserInfo evaluator referencing it.
pub struct OidcProvider {
    issuer: String,
    audiences: Vec<String>,
    http: reqwest::Client,
    discovery: RwLock<Option<DiscoveryDocument>>,
    jwks: RwLock<Option<JwksCache>>,
    jwks_refresh: Duration,
}

impl OidcProvider {
    pub fn new(http: reqwest::Client, issuer: impl Into<String>, audiences: Vec<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audiences,
            http,
            discovery: RwLock::new(None),
            jwks: RwLock::new(None),
            jwks_refresh: DEFAULT_JWKS_REFRESH,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    fn well_known_url(&self) -> String {
        format!(
            "{}/.well-known/openid-configuration",
            self.issuer.trim_end_matches('/')
        )
    }

    async fn discovery(&self) -> Result<DiscoveryDocument, EvalError> {
        if let Some(doc) = self.discovery.read().await.clone() {
            return Ok(doc);
        }
        let url = self.well_known_url();
        let doc: DiscoveryDocument = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| EvalError::Upstream(format!("oidc discovery: {e}")))?
            .error_for_status()
            .map_err(|e| EvalError::Upstream(format!("oidc discovery: {e}")))?
            .json()
            .await
            .map_err(|e| EvalError::Upstream(format!("oidc discovery: {e}")))?;
        debug!(issuer = %doc.issuer, "fetched oidc discovery document");
        *self.discovery.write().await = Some(doc.clone());
        Ok(doc)
    }

    async fn refresh_jwks(&self) -> Result<(), EvalError> {
        let discovery = self.discovery().await?;
        let set: JwkSet = self
            .http
            .get(&discovery.jwks_uri)
            .send()
            .await
            .map_err(|e| EvalError::Upstream(format!("jwks fetch: {e}")))?
            .error_for_status()
            .map_err(|e| EvalError::Upstream(format!("jwks fetch: {e}")))?
            .json()
            .await
            .map_err(|e| EvalError::Upstream(format!("jwks fetch: {e}")))?;
        debug!(issuer = %self.issuer, keys = set.keys.len(), "refreshed jwks");
        *self.jwks.write().await = Some(JwksCache {
            set,
            last_refresh: Instant::now(),
        });
        Ok(())
    }

    fn pick<'a>(set: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
        match kid {
            Some(kid) => set.find(kid),
            None => set.keys.first(),
        }
    }

    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, EvalError> {
        // refresh when cold, stale, or the kid is unknown (key rotation)
        let usable = {
            let cache = self.jwks.read().await;
            cache.as_ref().is_some_and(|c| {
                c.last_refresh.elapsed() < self.jwks_refresh && Self::pick(&c.set, kid).is_some()
            })
        };
        if !usable {
            self.refresh_jwks().await?;
        }

        let cache = self.jwks.read().await;
        let set = &cache
            .as_ref()
            .ok_or_else(|| EvalError::Upstream("jwks unavailable".to_string()))?
            .set;
        let jwk = Self::pick(set, kid)
            .ok_or_else(|| EvalError::InvalidCredential("unknown signing key".to_string()))?;
        DecodingKey::from_jwk(jwk)
            .map_err(|e| EvalError::InvalidCredential(format!("unusable signing key: {e}")))
    }

    /// Validate the token signature, issuer, expiry, and (when configured)
    /// audience. Returns the full claim set.
    pub async fn verify(&self, token: &str) -> Result<Value, EvalError> {
        let header = decode_header(token)
            .map_err(|e| EvalError::InvalidCredential(format!("bad token header: {e}")))?;
        let key = self.decoding_key(header.kid.as_deref()).await?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.issuer]);
        if self.audiences.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&self.audiences);
        }

        let data = decode::<Value>(token, &key, &validation)
            .map_err(|e| EvalError::InvalidCredential(e.to_string()))?;
        Ok(data.claims)
    }

    /// Fetch the provider's UserInfo document for an access token.
    pub async fn userinfo(&self, access_token: &str) -> Result<Value, EvalError> {
        let discovery = self.discovery().await?;
        let endpoint = discovery
            .userinfo_endpoint
            .ok_or_else(|| EvalError::Upstream("provider has no userinfo endpoint".to_string()))?;
        self.http
            .get(&endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| EvalError::Upstream(format!("userinfo fetch: {e}")))?
            .error_for_status()
            .map_err(|e| EvalError::Upstream(format!("userinfo fetch: {e}")))?
            .json()
            .await
            .map_err(|e| EvalError::Upstream(format!("userinfo fetch: {e}")))
    }
}

/// Identity evaluator delegating to a shared [`OidcProvider`].
pub struct OidcEvaluator {
    provider: Arc<OidcProvider>,
}

impl OidcEvaluator {
    pub fn new(provider: Arc<OidcProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Evaluate for OidcEvaluator {
    async fn call(&self, ctx: &AuthContext) -> Result<AuthObject, EvalError> {
        let token = ctx.request().bearer_token()?;
        let claims = self.provider.verify(token).await?;
        Ok(AuthObject::Identity(claims))
    }
}
