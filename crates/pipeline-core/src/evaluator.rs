//! The evaluator capability and its result types
//!
//! Every backend (token verifier, metadata fetcher, policy engine) is wired
//! into the pipeline as an [`Evaluator`]: a stable handle plus an object-safe
//! [`Evaluate`] implementation. The handle, not the backend instance, keys
//! every result map, so results stay addressable across catalog rebuilds.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::context::AuthContext;
use crate::error::EvalError;

/// One of the three pipeline phases, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Identity,
    Metadata,
    Authorization,
}

/// Type tag of an evaluator backend. The tag fixes the phase the evaluator
/// runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EvaluatorType {
    Oidc,
    ApiKey,
    UserInfo,
    Uma,
    Opa,
    Patterns,
}

impl EvaluatorType {
    pub fn phase(&self) -> Phase {
        match self {
            EvaluatorType::Oidc | EvaluatorType::ApiKey => Phase::Identity,
            EvaluatorType::UserInfo | EvaluatorType::Uma => Phase::Metadata,
            EvaluatorType::Opa | EvaluatorType::Patterns => Phase::Authorization,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluatorType::Oidc => "oidc",
            EvaluatorType::ApiKey => "apiKey",
            EvaluatorType::UserInfo => "userInfo",
            EvaluatorType::Uma => "uma",
            EvaluatorType::Opa => "opa",
            EvaluatorType::Patterns => "patterns",
        }
    }
}

impl fmt::Display for EvaluatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identity of a configured evaluator: its configured name plus its
/// type tag. Assigned at catalog build time and used as the key of the
/// per-phase result maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EvaluatorHandle {
    pub name: String,
    pub kind: EvaluatorType,
}

impl EvaluatorHandle {
    pub fn new(name: impl Into<String>, kind: EvaluatorType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

impl fmt::Display for EvaluatorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Output of a successful evaluator call, tagged by the phase that produced
/// it. The tag lets the context commit each object to the matching result
/// map without any downcasting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AuthObject {
    /// Verified identity claims.
    Identity(Value),
    /// Fetched enrichment data.
    Metadata(Value),
    /// Details of a passing policy verdict.
    Verdict(Value),
}

impl AuthObject {
    pub fn phase(&self) -> Phase {
        match self {
            AuthObject::Identity(_) => Phase::Identity,
            AuthObject::Metadata(_) => Phase::Metadata,
            AuthObject::Verdict(_) => Phase::Authorization,
        }
    }

    pub fn as_json(&self) -> &Value {
        match self {
            AuthObject::Identity(v) | AuthObject::Metadata(v) | AuthObject::Verdict(v) => v,
        }
    }

    pub fn into_json(self) -> Value {
        match self {
            AuthObject::Identity(v) | AuthObject::Metadata(v) | AuthObject::Verdict(v) => v,
        }
    }
}

/// The capability every backend implements.
///
/// Contract: the backend may read the auth context (the inbound request and
/// any prior-phase results) but must not retain or mutate it, and it must be
/// safe to invoke from multiple concurrent tasks, each against a distinct
/// context. Failures are ordinary [`EvalError`]s; a backend never panics the
/// pipeline.
#[async_trait]
pub trait Evaluate: Send + Sync {
    async fn call(&self, ctx: &AuthContext) -> Result<AuthObject, EvalError>;
}

/// A configured evaluator: handle + backend.
#[derive(Clone)]
pub struct Evaluator {
    handle: EvaluatorHandle,
    backend: Arc<dyn Evaluate>,
}

impl Evaluator {
    pub fn new(
        name: impl Into<String>,
        kind: EvaluatorType,
        backend: Arc<dyn Evaluate>,
    ) -> Self {
        Self {
            handle: EvaluatorHandle::new(name, kind),
            backend,
        }
    }

    pub fn handle(&self) -> &EvaluatorHandle {
        &self.handle
    }

    pub fn phase(&self) -> Phase {
        self.handle.kind.phase()
    }

    pub async fn call(&self, ctx: &AuthContext) -> Result<AuthObject, EvalError> {
        self.backend.call(ctx).await
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// A reduction record: which evaluator finished, and how.
#[derive(Debug)]
pub struct EvaluationResponse {
    pub evaluator: EvaluatorHandle,
    pub result: Result<AuthObject, EvalError>,
}

impl EvaluationResponse {
    pub fn success(evaluator: EvaluatorHandle, object: AuthObject) -> Self {
        Self {
            evaluator,
            result: Ok(object),
        }
    }

    pub fn failure(evaluator: EvaluatorHandle, error: EvalError) -> Self {
        Self {
            evaluator,
            result: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}
