//! Scan activity types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of the long-running scan that owns activity records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScanId(pub i64);

impl ScanId {
    /// Interpret a task argument as a scan id.
    ///
    /// Integers and integer strings resolve; `null` and anything else do not.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(Self),
            serde_json::Value::String(s) => s.trim().parse().ok().map(Self),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned identifier of an activity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivityId(pub i64);

impl std::fmt::Display for ActivityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of an activity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Record created, task not started yet.
    Initiated,
    /// Task body executing.
    Running,
    /// Task body returned, or a cached result was served.
    Success,
    /// Task body failed.
    Failed,
}

impl Status {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Initiated, Running)
                | (Initiated, Success) // cache hit
                | (Running, Success)
                | (Running, Failed)
        )
    }

    /// Statuses from which `self` may be entered.
    pub fn predecessors(self) -> Vec<Status> {
        [
            Status::Initiated,
            Status::Running,
            Status::Success,
            Status::Failed,
        ]
        .into_iter()
        .filter(|from| from.can_transition_to(self))
        .collect()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Success | Status::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Initiated => "initiated",
            Status::Running => "running",
            Status::Success => "success",
            Status::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "initiated" => Ok(Status::Initiated),
            "running" => Ok(Status::Running),
            "success" => Ok(Status::Success),
            "failed" => Ok(Status::Failed),
            other => Err(Error::Other(format!("unknown activity status: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A persisted lifecycle entry for one tracked task invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: ActivityId,
    /// Owning scan.
    pub scan_id: ScanId,
    pub title: String,
    pub status: Status,
    /// At most 300 characters; see [`crate::activity::truncate_error`].
    pub error_message: Option<String>,
    /// Re-stamped on every status transition.
    pub time: DateTime<Utc>,
}

/// Parameters for inserting a new activity record.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub scan_id: ScanId,
    pub title: String,
    pub status: Status,
    pub time: DateTime<Utc>,
}

/// In-place mutation applied to an existing activity record.
#[derive(Debug, Clone)]
pub struct ActivityUpdate {
    pub status: Status,
    /// `None` clears any previous message.
    pub error_message: Option<String>,
    pub time: DateTime<Utc>,
}
