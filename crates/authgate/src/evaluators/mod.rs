//! Evaluator backends
//!
//! Each backend implements the engine's `Evaluate` capability and is
//! constructed from its declarative config at catalog build time. Identity
//! backends verify credentials, metadata backends enrich the context, and
//! authorization backends enforce policy.

pub mod apikey;
pub mod oidc;
pub mod opa;
pub mod patterns;
pub mod uma;
pub mod userinfo;

pub use apikey::ApiKeyEvaluator;
pub use oidc::{OidcEvaluator, OidcProvider};
pub use opa::OpaEvaluator;
pub use patterns::PatternsEvaluator;
pub use uma::UmaEvaluator;
pub use userinfo::UserInfoEvaluator;
