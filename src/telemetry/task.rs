//! Task execution span helpers.

use tracing::Span;
use uuid::Uuid;

/// Start a span for one task invocation.
///
/// `task.outcome` is declared empty and filled via [`record_outcome`].
pub fn start_task_span(task_name: &str, invocation_id: &Uuid) -> Span {
    tracing::info_span!(
        "task.execute",
        "task.name" = task_name,
        "task.id" = %invocation_id,
        "task.outcome" = tracing::field::Empty,
    )
}

/// Emit an activity status transition inside the given span.
pub fn record_status_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::debug!(from = from, to = to, "status_transition");
    });
}

/// Record how the invocation ended ("completed", "cached", "failed", ...).
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("task.outcome", outcome);
}
