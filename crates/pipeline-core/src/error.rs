//! Error kinds surfaced by the pipeline
//!
//! Evaluator backends fail with [`EvalError`]; the pipeline folds those into
//! the request-level [`AuthError`] returned to the transport. Deny responses
//! expose only the short [`AuthError::reason`] string, never backend detail.

use thiserror::Error;

/// Failure of a single evaluator call.
///
/// An evaluator never panics the pipeline; any condition preventing a
/// definitive success (bad credential, upstream error, policy rejection)
/// is reported through one of these kinds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// `authorization` header absent or not of the form `Bearer <token>`.
    #[error("authorization header malformed or not provided")]
    MalformedCredential,

    /// A lookup by identity-evaluator name found no verified identity.
    #[error("no verified identity for the requested name")]
    IdentityNotFound,

    /// The presented credential was rejected by the backend.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// The backend could not be reached or answered abnormally.
    #[error("upstream call failed: {0}")]
    Upstream(String),

    /// The backend reached a verdict and the verdict is "no".
    #[error("denied: {0}")]
    Denied(String),
}

impl EvalError {
    /// Short kind tag, stable across message changes. Used in logs and in
    /// user-visible deny reasons.
    pub fn kind(&self) -> &'static str {
        match self {
            EvalError::MalformedCredential => "malformed_credential",
            EvalError::IdentityNotFound => "identity_not_found",
            EvalError::InvalidCredential(_) => "invalid_credential",
            EvalError::Upstream(_) => "upstream_error",
            EvalError::Denied(_) => "denied",
        }
    }
}

/// Outcome of a full pipeline evaluation, or of resolving its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The API config carries no identity evaluators; nothing can vouch for
    /// the request.
    #[error("no identity source configured")]
    NoIdentitySource,

    /// Every identity evaluator failed; carries the last failure observed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(EvalError),

    /// An authorization evaluator rejected the request.
    #[error("authorization denied: {0}")]
    AuthorizationDenied(EvalError),

    /// The caller's cancellation context fired before a decision was reached.
    #[error("request aborted")]
    Aborted,

    /// The catalog has no API config for the request host. Produced by the
    /// transport before the pipeline runs.
    #[error("no configuration for host {0:?}")]
    HostNotConfigured(String),
}

impl AuthError {
    /// Opaque deny reason: kind tags only, no backend internals.
    pub fn reason(&self) -> String {
        match self {
            AuthError::NoIdentitySource => "no_identity_source".to_string(),
            AuthError::AuthenticationFailed(inner) => {
                format!("authentication_failed:{}", inner.kind())
            }
            AuthError::AuthorizationDenied(inner) => {
                format!("authorization_denied:{}", inner.kind())
            }
            AuthError::Aborted => "aborted".to_string(),
            AuthError::HostNotConfigured(_) => "host_not_configured".to_string(),
        }
    }
}
