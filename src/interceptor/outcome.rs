//! How an invocation ended, and the ways it can leave the happy path.

use serde_json::Value;

use crate::fingerprint::Fingerprint;
use crate::model::ActivityId;

pub use crate::model::invocation::is_truthy;

/// Departures from plain success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interruption {
    /// The no-op task; nothing was touched.
    Skip,
    /// Tracking was wanted but the scan could not be resolved. The task
    /// still runs, untracked.
    Resolution { scan: String, reason: String },
    /// The task body failed.
    Execution {
        /// One-line rendering of the error chain.
        error: String,
        /// Full debug rendering (chain and backtrace), when diagnostics are on.
        trace: Option<String>,
    },
}

impl Interruption {
    /// Classify a task body error. `debug > 0` keeps the full trace.
    pub fn execution(err: &anyhow::Error, debug: u8) -> Self {
        Interruption::Execution {
            error: format!("{err:#}"),
            trace: (debug > 0).then(|| format!("{err:?}")),
        }
    }

    /// Classify a panic payload caught from a task body.
    pub fn panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Interruption::Execution {
            error: format!("task panicked: {message}"),
            trace: None,
        }
    }

    /// Text stored on a failed activity (before truncation).
    pub fn activity_message(&self) -> Option<String> {
        match self {
            Interruption::Execution { error, trace: None } => Some(error.clone()),
            Interruption::Execution {
                error,
                trace: Some(trace),
            } => Some(format!("{error}\n =>{trace}")),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Interruption::Skip => "skipped",
            Interruption::Resolution { .. } => "unresolved",
            Interruption::Execution { .. } => "failed",
        }
    }
}

/// Terminal state of an invocation as seen by the queue runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The body ran and returned.
    Completed(Value),
    /// Served from the result cache; the body did not run.
    Cached(Value),
    /// Skipped, or failed with the failure swallowed.
    Interrupted(Interruption),
}

impl Outcome {
    /// The task result, `Null` when there is none.
    pub fn into_value(self) -> Value {
        match self {
            Outcome::Completed(value) | Outcome::Cached(value) => value,
            Outcome::Interrupted(_) => Value::Null,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Completed(_) => "completed",
            Outcome::Cached(_) => "cached",
            Outcome::Interrupted(interruption) => interruption.label(),
        }
    }
}

/// Everything the interceptor did for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub outcome: Outcome,
    /// Activity tracking this invocation, if one was created.
    pub activity_id: Option<ActivityId>,
    /// Cache key used, if caching was enabled.
    pub fingerprint: Option<Fingerprint>,
    /// Why tracking was wanted but not done, if so.
    pub resolution: Option<Interruption>,
}
