//! Concurrent fan-out over one phase's evaluators
//!
//! The runner spawns one task per evaluator against a shared context and
//! streams an [`EvaluationResponse`] per completed call on a bounded channel.
//! The channel capacity equals the evaluator count, so producers never block
//! and the consumer is free to stop reading early. The channel closes once
//! every spawned task has reached an exit point.
//!
//! The reduction policy only controls the cancellation rule; interpreting
//! the responses is the consumer's job:
//!
//! - [`Reduction::AnyOf`]: the first *success* cancels the remaining tasks.
//! - [`Reduction::AllOf`]: the first *failure* cancels the remaining tasks.
//! - [`Reduction::BestEffort`]: siblings are never cancelled.
//!
//! Cancellation is scoped to the phase: each run derives a child token from
//! the request token, so the caller's cancellation reaches every task but a
//! phase-internal cancellation never leaks upward. A task cancelled before
//! (or while) its call is in flight exits without emitting; consumers must
//! treat an absent response as "no verdict reached".

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::trace;

use crate::context::AuthContext;
use crate::evaluator::{EvaluationResponse, Evaluator};

/// How a phase's fan-out reduces to a single outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// One success is enough; used by the identity phase.
    AnyOf,
    /// Every evaluator must succeed; used by the authorization phase.
    AllOf,
    /// Run everything to completion; used by the metadata phase.
    BestEffort,
}

/// Spawn the fan-out for `evaluators` and return the response stream.
///
/// Response order is unspecified; consumers must not rely on anything beyond
/// the policy's cancellation rule.
pub fn spawn_phase(
    ctx: Arc<AuthContext>,
    evaluators: Vec<Arc<Evaluator>>,
    policy: Reduction,
) -> mpsc::Receiver<EvaluationResponse> {
    let (tx, rx) = mpsc::channel(evaluators.len().max(1));
    let cancel = ctx.cancellation().child_token();

    let mut tasks = JoinSet::new();
    for evaluator in evaluators {
        let ctx = ctx.clone();
        let tx = tx.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            if cancel.is_cancelled() {
                trace!(evaluator = %evaluator.handle(), "skipped, phase already settled");
                return;
            }
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    trace!(evaluator = %evaluator.handle(), "cancelled mid-flight");
                    return;
                }
                outcome = evaluator.call(&ctx) => outcome,
            };
            let handle = evaluator.handle().clone();
            match outcome {
                Ok(object) => {
                    let _ = tx.send(EvaluationResponse::success(handle, object)).await;
                    if policy == Reduction::AnyOf {
                        cancel.cancel();
                    }
                }
                Err(error) => {
                    let _ = tx.send(EvaluationResponse::failure(handle, error)).await;
                    if policy == Reduction::AllOf {
                        cancel.cancel();
                    }
                }
            }
        });
    }
    drop(tx);

    // Reap the tasks; the channel closes when the last sender is dropped.
    tokio::spawn(async move { while tasks.join_next().await.is_some() {} });

    rx
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::error::EvalError;
    use crate::evaluator::EvaluatorType;
    use crate::test_support::{api_config, context, eval_fail, eval_ok, eval_slow_ok};

    async fn drain(mut rx: mpsc::Receiver<EvaluationResponse>) -> Vec<EvaluationResponse> {
        let mut out = Vec::new();
        while let Some(resp) = rx.recv().await {
            out.push(resp);
        }
        out
    }

    #[tokio::test]
    async fn best_effort_runs_every_evaluator() {
        let ctx = context(api_config(vec![], vec![], vec![]));
        let evaluators = vec![
            eval_ok(EvaluatorType::UserInfo, "a"),
            eval_fail(EvaluatorType::Uma, "b"),
            eval_ok(EvaluatorType::Uma, "c"),
        ];
        let responses = drain(spawn_phase(ctx, evaluators, Reduction::BestEffort)).await;
        assert_eq!(responses.len(), 3);
        assert_eq!(responses.iter().filter(|r| r.is_success()).count(), 2);
    }

    #[tokio::test]
    async fn any_of_success_cancels_slow_sibling() {
        let ctx = context(api_config(vec![], vec![], vec![]));
        let evaluators = vec![
            eval_ok(EvaluatorType::Oidc, "fast"),
            eval_slow_ok(EvaluatorType::ApiKey, "slow", Duration::from_secs(5)),
        ];
        let started = std::time::Instant::now();
        let responses = drain(spawn_phase(ctx, evaluators, Reduction::AnyOf)).await;
        assert!(started.elapsed() < Duration::from_secs(1), "sibling not cancelled");
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].evaluator.name, "fast");
    }

    #[tokio::test]
    async fn all_of_failure_cancels_slow_sibling() {
        let ctx = context(api_config(vec![], vec![], vec![]));
        let evaluators = vec![
            eval_fail(EvaluatorType::Opa, "denies"),
            eval_slow_ok(EvaluatorType::Patterns, "slow", Duration::from_secs(5)),
        ];
        let started = std::time::Instant::now();
        let responses = drain(spawn_phase(ctx, evaluators, Reduction::AllOf)).await;
        assert!(started.elapsed() < Duration::from_secs(1), "sibling not cancelled");
        assert_eq!(responses.len(), 1);
        assert!(!responses[0].is_success());
    }

    #[tokio::test]
    async fn all_of_collects_every_success() {
        let ctx = context(api_config(vec![], vec![], vec![]));
        let evaluators = vec![
            eval_ok(EvaluatorType::Opa, "a"),
            eval_ok(EvaluatorType::Patterns, "b"),
        ];
        let responses = drain(spawn_phase(ctx, evaluators, Reduction::AllOf)).await;
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|r| r.is_success()));
    }

    #[tokio::test]
    async fn parent_cancellation_reaches_in_flight_tasks() {
        let parent = CancellationToken::new();
        let ctx = crate::test_support::context_with_cancel(
            parent.clone(),
            api_config(vec![], vec![], vec![]),
        );
        let evaluators = vec![eval_slow_ok(
            EvaluatorType::Oidc,
            "slow",
            Duration::from_secs(5),
        )];
        let rx = spawn_phase(ctx, evaluators, Reduction::AnyOf);

        tokio::time::sleep(Duration::from_millis(10)).await;
        parent.cancel();

        let started = std::time::Instant::now();
        let responses = drain(rx).await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(responses.is_empty(), "cancelled task must not emit");
    }

    #[tokio::test]
    async fn phase_cancellation_does_not_leak_to_parent() {
        let parent = CancellationToken::new();
        let ctx = crate::test_support::context_with_cancel(
            parent.clone(),
            api_config(vec![], vec![], vec![]),
        );
        let evaluators = vec![eval_fail(EvaluatorType::Opa, "denies")];
        drain(spawn_phase(ctx, evaluators, Reduction::AllOf)).await;
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn empty_evaluator_list_closes_immediately() {
        let ctx = context(api_config(vec![], vec![], vec![]));
        let responses = drain(spawn_phase(ctx, Vec::new(), Reduction::AnyOf)).await;
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn every_completed_evaluator_emits_exactly_once() {
        let ctx = context(api_config(vec![], vec![], vec![]));
        let evaluators: Vec<_> = (0..8)
            .map(|i| {
                if i % 2 == 0 {
                    eval_ok(EvaluatorType::Uma, &format!("e{i}"))
                } else {
                    eval_fail(EvaluatorType::Uma, &format!("e{i}"))
                }
            })
            .collect();
        let responses = drain(spawn_phase(ctx, evaluators, Reduction::BestEffort)).await;
        let mut names: Vec<_> = responses.iter().map(|r| r.evaluator.name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8);
        assert_eq!(
            responses.iter().filter(|e| matches!(&e.result, Err(EvalError::Denied(_)))).count(),
            4
        );
    }
}
