//! Interceptor behavior switches.
//!
//! Readable from environment variables or from a TOML file with the same
//! field names:
//!
//! ```toml
//! cache_enabled = true
//! cache_ignore_kwargs = ["ctx"]
//! skip_record_activity = ["scan.report"]
//! debug = 1
//! raise_on_error = false
//! skip_task = "tasks.skip"
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default name of the no-op task.
pub const DEFAULT_SKIP_TASK: &str = "tasks.skip";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterceptorConfig {
    /// Serve and store results through the result cache.
    pub cache_enabled: bool,
    /// Keyword arguments left out of fingerprints and verbose descriptions.
    pub cache_ignore_kwargs: BTreeSet<String>,
    /// Task names never tracked as scan activities.
    pub skip_record_activity: BTreeSet<String>,
    /// Verbosity: above 0 appends traces to activity errors, above 1 appends
    /// arguments to descriptions.
    pub debug: u8,
    /// Propagate task failures instead of swallowing them.
    pub raise_on_error: bool,
    /// Name of the task that short-circuits with no side effects.
    pub skip_task: String,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ignore_kwargs: BTreeSet::new(),
            skip_record_activity: BTreeSet::new(),
            debug: 0,
            raise_on_error: false,
            skip_task: DEFAULT_SKIP_TASK.to_string(),
        }
    }
}

impl InterceptorConfig {
    /// Read `TASK_*` environment variables; unset ones keep their defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            cache_enabled: bool_var("TASK_CACHE")?.unwrap_or(defaults.cache_enabled),
            cache_ignore_kwargs: list_var("TASK_CACHE_IGNORE_KWARGS")
                .unwrap_or(defaults.cache_ignore_kwargs),
            skip_record_activity: list_var("TASK_SKIP_RECORD_ACTIVITY")
                .unwrap_or(defaults.skip_record_activity),
            debug: match std::env::var("TASK_DEBUG") {
                Ok(raw) => raw.trim().parse().map_err(|_| {
                    Error::Config(format!("TASK_DEBUG must be a small integer, got {raw:?}"))
                })?,
                Err(_) => defaults.debug,
            },
            raise_on_error: bool_var("TASK_RAISE_ON_ERROR")?.unwrap_or(defaults.raise_on_error),
            skip_task: std::env::var("TASK_SKIP_NAME").unwrap_or(defaults.skip_task),
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("bad interceptor config: {e}")))
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read interceptor config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }
}

fn bool_var(name: &str) -> Result<Option<bool>> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" | "" => Ok(Some(false)),
        _ => Err(Error::Config(format!("{name} must be a boolean, got {raw:?}"))),
    }
}

/// Comma-separated list; blank items are dropped.
fn list_var(name: &str) -> Option<BTreeSet<String>> {
    let raw = std::env::var(name).ok()?;
    Some(
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
    )
}
