//! UMA 2.0 resource-data metadata backend
//!
//! Looks up the resources registered for the request path at an UMA-enabled
//! authorization server: discovery, a protection API token via client
//! credentials, a resource search by URI, then one detail fetch per hit.
//! The collected resource documents become the metadata object.

use async_trait::async_trait;
use pipeline_core::{AuthContext, AuthObject, Evaluate, EvalError};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

/// Relevant subset of the UMA 2.0 discovery document.
#[derive(Debug, Clone, Deserialize)]
struct UmaDiscovery {
    token_endpoint: String,
    resource_registration_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct UmaEvaluator {
    endpoint: String,
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
    discovery: RwLock<Option<UmaDiscovery>>,
}

impl UmaEvaluator {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            http,
            discovery: RwLock::new(None),
        }
    }

    async fn discovery(&self) -> Result<UmaDiscovery, EvalError> {
        if let Some(doc) = self.discovery.read().await.clone() {
            return Ok(doc);
        }
        let url = format!(
            "{}/.well-known/uma2-configuration",
            self.endpoint.trim_end_matches('/')
        );
        let doc: UmaDiscovery = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| EvalError::Upstream(format!("uma discovery: {e}")))?
            .error_for_status()
            .map_err(|e| EvalError::Upstream(format!("uma discovery: {e}")))?
            .json()
            .await
            .map_err(|e| EvalError::Upstream(format!("uma discovery: {e}")))?;
        *self.discovery.write().await = Some(doc.clone());
        Ok(doc)
    }

    /// Protection API token via the client-credentials grant.
    async fn request_pat(&self, discovery: &UmaDiscovery) -> Result<String, EvalError> {
        let response: TokenResponse = self
            .http
            .post(&discovery.token_endpoint)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| EvalError::Upstream(format!("uma token: {e}")))?
            .error_for_status()
            .map_err(|e| EvalError::Upstream(format!("uma token: {e}")))?
            .json()
            .await
            .map_err(|e| EvalError::Upstream(format!("uma token: {e}")))?;
        Ok(response.access_token)
    }
}

#[async_trait]
impl Evaluate for UmaEvaluator {
    async fn call(&self, ctx: &AuthContext) -> Result<AuthObject, EvalError> {
        let discovery = self.discovery().await?;
        let pat = self.request_pat(&discovery).await?;

        let ids: Vec<String> = self
            .http
            .get(&discovery.resource_registration_endpoint)
            .query(&[("uri", ctx.request().path())])
            .bearer_auth(&pat)
            .send()
            .await
            .map_err(|e| EvalError::Upstream(format!("uma resource search: {e}")))?
            .error_for_status()
            .map_err(|e| EvalError::Upstream(format!("uma resource search: {e}")))?
            .json()
            .await
            .map_err(|e| EvalError::Upstream(format!("uma resource search: {e}")))?;
        debug!(path = ctx.request().path(), hits = ids.len(), "uma resource search");

        let mut resources = Vec::with_capacity(ids.len());
        for id in ids {
            let url = format!("{}/{}", discovery.resource_registration_endpoint, id);
            let resource: Value = self
                .http
                .get(&url)
                .bearer_auth(&pat)
                .send()
                .await
                .map_err(|e| EvalError::Upstream(format!("uma resource fetch: {e}")))?
                .error_for_status()
                .map_err(|e| EvalError::Upstream(format!("uma resource fetch: {e}")))?
                .json()
                .await
                .map_err(|e| EvalError::Upstream(format!("uma resource fetch: {e}")))?;
            resources.push(resource);
        }

        Ok(AuthObject::Metadata(Value::Array(resources)))
    }
}
