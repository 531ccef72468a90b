use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::evaluator::{EvaluationRequest, Evaluator, Verdict};
use super::room::{ConnectionId, PendingSubmission};

/// A finished evaluation on its way back into the hub loop
#[derive(Debug, Clone)]
pub struct VerdictEvent {
    pub connection_id: ConnectionId,
    pub participant_id: String,
    pub task_id: String,
    pub verdict: Verdict,
}

/// Evaluates one accepted submission in the background. The hub is never
/// blocked on the evaluator; the verdict re-enters it through `verdicts`.
pub fn spawn(
    evaluator: Arc<dyn Evaluator>,
    verdicts: mpsc::UnboundedSender<VerdictEvent>,
    connection_id: ConnectionId,
    participant_id: String,
    submission: PendingSubmission,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let PendingSubmission {
            task_id,
            code,
            tests,
        } = submission;

        tracing::info!(
            participant_id = %participant_id,
            task_id = %task_id,
            tests = tests.len(),
            "Evaluating submission"
        );

        let started = Instant::now();
        let verdict = evaluator.evaluate(EvaluationRequest { code, tests }).await;

        tracing::info!(
            participant_id = %participant_id,
            task_id = %task_id,
            success = verdict.success,
            passed = verdict.passed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Submission evaluated"
        );

        let event = VerdictEvent {
            connection_id,
            participant_id,
            task_id,
            verdict,
        };
        if verdicts.send(event).is_err() {
            tracing::warn!("Room hub stopped before verdict could be applied");
        }
    })
}
