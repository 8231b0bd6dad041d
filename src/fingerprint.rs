//! Cache keys derived from a task name and its arguments.
//!
//! Rendering is versioned. `v1` renders every value as compact JSON with
//! object keys sorted, so strings stay quoted and `"42"` never collides with
//! `42`. Numbers keep their JSON form: `1` and `1.0` produce different keys.
//! Positional order matters, keyword order does not.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::model::{Kwargs, TaskInvocation};

/// Version tag prefixed to every fingerprint.
pub const FINGERPRINT_VERSION: &str = "v1";

const ARG_SEPARATOR: &str = "_";
const SECTION_SEPARATOR: &str = "__";

/// A deterministic cache key for one task invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(name: &str, args: &[Value], kwargs: &Kwargs, ignore: &BTreeSet<String>) -> Self {
        Self(format!(
            "{FINGERPRINT_VERSION}:{name}{SECTION_SEPARATOR}{}{SECTION_SEPARATOR}{}",
            render_args(args),
            render_kwargs(kwargs, ignore),
        ))
    }

    pub fn of(invocation: &TaskInvocation, ignore: &BTreeSet<String>) -> Self {
        Self::compute(&invocation.name, &invocation.args, &invocation.kwargs, ignore)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical text form of a single value.
pub fn render_value(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

// Object keys are sorted explicitly: serde_json's map keeps insertion order
// whenever `preserve_order` is enabled anywhere in the dependency graph.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Positional arguments in call order, joined by `_`.
pub fn render_args(args: &[Value]) -> String {
    args.iter()
        .map(render_value)
        .collect::<Vec<_>>()
        .join(ARG_SEPARATOR)
}

/// `key=value` pairs in key order, ignored keys excluded, joined by `_`.
pub fn render_kwargs(kwargs: &Kwargs, ignore: &BTreeSet<String>) -> String {
    kwargs
        .iter()
        .filter(|(key, _)| !ignore.contains(*key))
        .map(|(key, value)| format!("{key}={}", render_value(value)))
        .collect::<Vec<_>>()
        .join(ARG_SEPARATOR)
}
