//! Task invocation types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::activity::{ActivityId, ScanId};

/// Keyword arguments, ordered by name.
pub type Kwargs = BTreeMap<String, Value>;

/// Keyword naming the scan when it is not passed positionally.
pub const SCAN_ID_KWARG: &str = "scan_history_id";
/// Keyword reserving an activity slot.
pub const ACTIVITY_ID_KWARG: &str = "activity_id";
/// Keyword overriding the derived description. Consumed by the interceptor.
pub const DESCRIPTION_KWARG: &str = "description";

/// One execution attempt of a named task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInvocation {
    /// Per-attempt identifier, for log correlation only.
    pub id: Uuid,
    /// Dot-qualified task name, e.g. `scan.port_scan`.
    pub name: String,
    pub args: Vec<Value>,
    pub kwargs: Kwargs,
}

impl TaskInvocation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            args: Vec::new(),
            kwargs: Kwargs::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn args(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.args.extend(values);
        self
    }

    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    /// The segment after the last `.` of the name.
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// The scan argument: first positional, else the `scan_history_id` keyword.
    ///
    /// `null` counts as absent. The value is returned raw; see
    /// [`ScanId::from_value`] for resolution.
    pub fn scan_arg(&self) -> Option<&Value> {
        let value = match self.args.first() {
            Some(first) => Some(first),
            None => self.kwargs.get(SCAN_ID_KWARG),
        };
        value.filter(|v| !v.is_null())
    }

    /// Whether the caller reserved room for an activity id: a second
    /// positional argument, or an `activity_id` keyword.
    pub fn has_activity_slot(&self) -> bool {
        self.args.len() > 1 || self.kwargs.contains_key(ACTIVITY_ID_KWARG)
    }

    /// Explicit truthy `description` keyword, if any. Falsy values (`null`,
    /// `false`, `0`, empty string/array/object) fall back to the derived one.
    pub fn description_override(&self) -> Option<String> {
        match self.kwargs.get(DESCRIPTION_KWARG)? {
            value if !is_truthy(value) => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// The invocation as handed to the task body: everything but the
    /// interceptor-owned `description` keyword.
    pub fn for_body(&self) -> TaskInvocation {
        let mut body = self.clone();
        body.kwargs.remove(DESCRIPTION_KWARG);
        body
    }
}

/// Context handed to a task body next to its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskContext {
    pub task_name: String,
    pub invocation_id: Uuid,
    pub scan_id: Option<ScanId>,
    /// Activity created for this invocation; `None` when untracked.
    pub activity_id: Option<ActivityId>,
    pub description: String,
}

/// Whether a value counts as present: not null, `false`, zero, or empty.
/// Decides both description fallback and result caching.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
