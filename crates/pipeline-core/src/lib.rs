//! pipeline-core: the authorization pipeline engine behind authgate
//!
//! This crate evaluates a single authorization check against the declarative
//! configuration of the protected API. A check flows through three phases in
//! strict order:
//!
//! 1. **Identity** — at least one configured identity evaluator must verify a
//!    credential (`AnyOf` reduction: the first success wins and cancels its
//!    siblings).
//! 2. **Metadata** — enrichment lookups run to completion; failures are logged
//!    and dropped (`BestEffort` reduction).
//! 3. **Authorization** — every configured policy must allow (`AllOf`
//!    reduction: the first failure denies and cancels its siblings).
//!
//! Evaluator backends are opaque to this crate; they implement [`Evaluate`]
//! and are registered per phase in an [`ApiConfig`] installed into the
//! host-indexed [`Catalog`].
//!
//! # Example
//!
//! ```rust,ignore
//! use pipeline_core::{pipeline, AuthContext, Catalog, CheckInput};
//! use tokio_util::sync::CancellationToken;
//!
//! let catalog = Catalog::new();
//! // ... install ApiConfigs via catalog.replace(...)
//!
//! let input = CheckInput::from_check_request(&check_request);
//! let api = catalog.resolve(input.host()).expect("host configured");
//! let ctx = std::sync::Arc::new(AuthContext::new(
//!     CancellationToken::new(),
//!     input,
//!     api,
//! ));
//! match pipeline::evaluate(&ctx).await {
//!     Ok(()) => { /* allow */ }
//!     Err(err) => { /* deny with err.reason() */ }
//! }
//! ```

pub mod catalog;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod pipeline;
pub mod request;
pub mod runner;

#[cfg(test)]
pub(crate) mod test_support;

pub use catalog::{ApiConfig, Catalog};
pub use context::AuthContext;
pub use error::{AuthError, EvalError};
pub use evaluator::{
    AuthObject, Evaluate, EvaluationResponse, Evaluator, EvaluatorHandle, EvaluatorType, Phase,
};
pub use request::CheckInput;
pub use runner::Reduction;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::catalog::{ApiConfig, Catalog};
    pub use crate::context::AuthContext;
    pub use crate::error::{AuthError, EvalError};
    pub use crate::evaluator::{
        AuthObject, Evaluate, Evaluator, EvaluatorHandle, EvaluatorType, Phase,
    };
    pub use crate::pipeline;
    pub use crate::request::CheckInput;
}
