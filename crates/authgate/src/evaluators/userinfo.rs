//! OIDC UserInfo metadata backend
//!
//! Fetches the UserInfo document from the provider of a named OIDC identity
//! evaluator, using the request's own bearer token. Only meaningful once
//! that identity verified the request, so the lookup fails fast when the
//! named identity produced no result.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_core::{AuthContext, AuthObject, Evaluate, EvalError};

use super::oidc::OidcProvider;

pub struct UserInfoEvaluator {
    identity_name: String,
    provider: Arc<OidcProvider>,
}

impl UserInfoEvaluator {
    /// `identity_name` is the configured name of the OIDC identity evaluator
    /// whose provider is queried; the reference is resolved at catalog build
    /// time.
    pub fn new(identity_name: impl Into<String>, provider: Arc<OidcProvider>) -> Self {
        Self {
            identity_name: identity_name.into(),
            provider,
        }
    }
}

#[async_trait]
impl Evaluate for UserInfoEvaluator {
    async fn call(&self, ctx: &AuthContext) -> Result<AuthObject, EvalError> {
        ctx.find_identity_by_name(&self.identity_name)?;
        let token = ctx.request().bearer_token()?;
        let info = self.provider.userinfo(token).await?;
        Ok(AuthObject::Metadata(info))
    }
}
