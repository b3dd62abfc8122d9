//! The three-phase evaluation pipeline
//!
//! `evaluate` drives identity → metadata → authorization strictly in order;
//! a later phase only starts once the previous phase's response channel has
//! been settled, so it observes everything the previous phase committed.

use std::sync::Arc;

use tracing::debug;

use crate::context::AuthContext;
use crate::error::{AuthError, EvalError};
use crate::runner::{self, Reduction};

/// Run the full pipeline for one request. `Ok(())` is an allow; any error is
/// a deny carrying the phase that produced it.
pub async fn evaluate(ctx: &Arc<AuthContext>) -> Result<(), AuthError> {
    evaluate_identity(ctx).await?;
    evaluate_metadata(ctx).await;
    evaluate_authorization(ctx).await?;
    Ok(())
}

/// Identity phase, `AnyOf`: the first verified credential settles the phase
/// and the remaining responses are discarded. With no success, the last
/// observed failure is what the caller learns about.
async fn evaluate_identity(ctx: &Arc<AuthContext>) -> Result<(), AuthError> {
    let evaluators = ctx.api().identity.clone();
    if evaluators.is_empty() {
        return Err(AuthError::NoIdentitySource);
    }

    let mut responses = runner::spawn_phase(ctx.clone(), evaluators, Reduction::AnyOf);
    let mut last_failure: Option<EvalError> = None;

    while let Some(response) = responses.recv().await {
        match response.result {
            Ok(object) => {
                debug!(evaluator = %response.evaluator, "identity verified");
                ctx.commit(response.evaluator, object);
                return Ok(());
            }
            Err(error) => {
                debug!(evaluator = %response.evaluator, %error, "identity evaluation failed");
                last_failure = Some(error);
            }
        }
    }

    if ctx.cancellation().is_cancelled() {
        return Err(AuthError::Aborted);
    }
    match last_failure {
        Some(error) => Err(AuthError::AuthenticationFailed(error)),
        // No success, no failure: every task was cancelled before a verdict.
        None => Err(AuthError::Aborted),
    }
}

/// Metadata phase, `BestEffort`: successes are committed, failures are
/// logged and dropped. This phase never fails the request.
async fn evaluate_metadata(ctx: &Arc<AuthContext>) {
    let evaluators = ctx.api().metadata.clone();
    if evaluators.is_empty() {
        return;
    }

    let mut responses = runner::spawn_phase(ctx.clone(), evaluators, Reduction::BestEffort);
    while let Some(response) = responses.recv().await {
        match response.result {
            Ok(object) => {
                debug!(evaluator = %response.evaluator, "metadata collected");
                ctx.commit(response.evaluator, object);
            }
            Err(error) => {
                debug!(evaluator = %response.evaluator, %error, "metadata evaluation failed");
            }
        }
    }
}

/// Authorization phase, `AllOf`: the first rejection denies the request; an
/// API with no authorization evaluators allows vacuously.
async fn evaluate_authorization(ctx: &Arc<AuthContext>) -> Result<(), AuthError> {
    let evaluators = ctx.api().authorization.clone();
    if evaluators.is_empty() {
        return Ok(());
    }

    let mut responses = runner::spawn_phase(ctx.clone(), evaluators, Reduction::AllOf);
    while let Some(response) = responses.recv().await {
        match response.result {
            Ok(object) => {
                debug!(evaluator = %response.evaluator, "authorization granted");
                ctx.commit(response.evaluator, object);
            }
            Err(error) => {
                debug!(evaluator = %response.evaluator, %error, "authorization rejected");
                if ctx.cancellation().is_cancelled() {
                    return Err(AuthError::Aborted);
                }
                return Err(AuthError::AuthorizationDenied(error));
            }
        }
    }

    if ctx.cancellation().is_cancelled() {
        return Err(AuthError::Aborted);
    }
    Ok(())
}
