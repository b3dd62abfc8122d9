//! OPA authorization backend
//!
//! Queries an Open Policy Agent data-API rule over HTTP, posting the state
//! of the check as the policy input. Anything other than a `true` result
//! (bare or under an `allow` key) denies the request.

use async_trait::async_trait;
use pipeline_core::{AuthContext, AuthObject, Evaluate, EvalError};
use serde_json::{json, Map, Value};

pub struct OpaEvaluator {
    endpoint: String,
    http: reqwest::Client,
}

impl OpaEvaluator {
    /// `endpoint` is the full data-API URL of the rule to query, e.g.
    /// `http://opa:8181/v1/data/authgate/allow`.
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http,
        }
    }

    /// The policy input document: request attributes, the verified identity,
    /// and the metadata view grouped by evaluator type.
    fn input(ctx: &AuthContext) -> Value {
        let request = ctx.request();
        let mut metadata = Map::new();
        for (kind, objects) in ctx.metadata_view() {
            metadata.insert(kind.as_str().to_string(), Value::Array(objects));
        }
        json!({
            "context": {
                "method": request.method(),
                "scheme": request.scheme(),
                "path": request.path(),
                "host": request.host(),
                "headers": request.headers(),
                "sourceAddress": request.source_address(),
            },
            "identity": ctx.identity().unwrap_or(Value::Null),
            "metadata": Value::Object(metadata),
        })
    }

    fn allowed(result: &Value) -> bool {
        match result {
            Value::Bool(b) => *b,
            Value::Object(obj) => obj.get("allow").and_then(Value::as_bool).unwrap_or(false),
            _ => false,
        }
    }
}

#[async_trait]
impl Evaluate for OpaEvaluator {
    async fn call(&self, ctx: &AuthContext) -> Result<AuthObject, EvalError> {
        let body = json!({ "input": Self::input(ctx) });
        let response: Value = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| EvalError::Upstream(format!("opa query: {e}")))?
            .error_for_status()
            .map_err(|e| EvalError::Upstream(format!("opa query: {e}")))?
            .json()
            .await
            .map_err(|e| EvalError::Upstream(format!("opa query: {e}")))?;

        let result = response.get("result").cloned().unwrap_or(Value::Null);
        if Self::allowed(&result) {
            Ok(AuthObject::Verdict(result))
        } else {
            Err(EvalError::Denied("opa rejected the request".to_string()))
        }
    }
}
