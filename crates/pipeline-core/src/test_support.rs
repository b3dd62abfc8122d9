//! Shared fakes for pipeline and runner tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::catalog::ApiConfig;
use crate::context::AuthContext;
use crate::error::EvalError;
use crate::evaluator::{AuthObject, Evaluate, Evaluator, EvaluatorType, Phase};
use crate::request::CheckInput;

type Observer = Box<dyn Fn(&AuthContext) + Send + Sync>;

/// Scriptable evaluator: fixed outcome, optional delay, optional callback
/// observing the context at call time.
pub(crate) struct FakeBackend {
    result: Result<AuthObject, EvalError>,
    delay: Duration,
    observer: Option<Observer>,
}

#[async_trait]
impl Evaluate for FakeBackend {
    async fn call(&self, ctx: &AuthContext) -> Result<AuthObject, EvalError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(observer) = &self.observer {
            observer(ctx);
        }
        self.result.clone()
    }
}

fn object_for(kind: EvaluatorType, name: &str) -> AuthObject {
    let payload = json!({ "evaluator": name });
    match kind.phase() {
        Phase::Identity => AuthObject::Identity(payload),
        Phase::Metadata => AuthObject::Metadata(payload),
        Phase::Authorization => AuthObject::Verdict(payload),
    }
}

pub(crate) fn eval_ok(kind: EvaluatorType, name: &str) -> Arc<Evaluator> {
    Arc::new(Evaluator::new(
        name,
        kind,
        Arc::new(FakeBackend {
            result: Ok(object_for(kind, name)),
            delay: Duration::ZERO,
            observer: None,
        }),
    ))
}

pub(crate) fn eval_fail(kind: EvaluatorType, name: &str) -> Arc<Evaluator> {
    Arc::new(Evaluator::new(
        name,
        kind,
        Arc::new(FakeBackend {
            result: Err(EvalError::Denied(format!("{name} rejects"))),
            delay: Duration::ZERO,
            observer: None,
        }),
    ))
}

pub(crate) fn eval_slow_ok(kind: EvaluatorType, name: &str, delay: Duration) -> Arc<Evaluator> {
    Arc::new(Evaluator::new(
        name,
        kind,
        Arc::new(FakeBackend {
            result: Ok(object_for(kind, name)),
            delay,
            observer: None,
        }),
    ))
}

pub(crate) fn eval_slow_fail(kind: EvaluatorType, name: &str, delay: Duration) -> Arc<Evaluator> {
    Arc::new(Evaluator::new(
        name,
        kind,
        Arc::new(FakeBackend {
            result: Err(EvalError::Denied(format!("{name} rejects"))),
            delay,
            observer: None,
        }),
    ))
}

pub(crate) fn eval_observing(
    kind: EvaluatorType,
    name: &str,
    observer: impl Fn(&AuthContext) + Send + Sync + 'static,
) -> Arc<Evaluator> {
    Arc::new(Evaluator::new(
        name,
        kind,
        Arc::new(FakeBackend {
            result: Ok(object_for(kind, name)),
            delay: Duration::ZERO,
            observer: Some(Box::new(observer)),
        }),
    ))
}

pub(crate) fn api_config(
    identity: Vec<Arc<Evaluator>>,
    metadata: Vec<Arc<Evaluator>>,
    authorization: Vec<Arc<Evaluator>>,
) -> Arc<ApiConfig> {
    Arc::new(ApiConfig {
        name: "test-api".to_string(),
        hosts: vec!["api.test".to_string()],
        identity,
        metadata,
        authorization,
    })
}

pub(crate) fn context(api: Arc<ApiConfig>) -> Arc<AuthContext> {
    context_with_cancel(CancellationToken::new(), api)
}

pub(crate) fn context_with_cancel(
    cancel: CancellationToken,
    api: Arc<ApiConfig>,
) -> Arc<AuthContext> {
    let request = CheckInput::new("GET", "/toys", "api.test")
        .with_header("authorization", "Bearer opaque-token")
        .with_source_address("10.1.2.3:40000");
    Arc::new(AuthContext::new(cancel, request, api))
}
