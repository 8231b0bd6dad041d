//! Per-invocation decisions made before anything touches a store.

use serde_json::Value;

use crate::config::InterceptorConfig;
use crate::fingerprint::{Fingerprint, render_args, render_kwargs};
use crate::model::{ScanId, TaskInvocation};

/// Where the invocation stands with respect to a parent scan.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanRef {
    /// No scan argument at all.
    Absent,
    Resolved(ScanId),
    /// A scan argument that is not an id.
    Unresolvable(Value),
}

#[derive(Debug, Clone)]
pub struct InvocationPlan {
    pub scan: ScanRef,
    /// Track this invocation as a scan activity.
    pub record_activity: bool,
    pub description: String,
    /// `None` when caching is disabled.
    pub fingerprint: Option<Fingerprint>,
}

impl InvocationPlan {
    pub fn new(invocation: &TaskInvocation, config: &InterceptorConfig) -> Self {
        let scan = match invocation.scan_arg() {
            None => ScanRef::Absent,
            Some(value) => match ScanId::from_value(value) {
                Some(id) => ScanRef::Resolved(id),
                None => ScanRef::Unresolvable(value.clone()),
            },
        };

        let record_activity = scan != ScanRef::Absent
            && !config.skip_record_activity.contains(&invocation.name)
            && invocation.has_activity_slot();

        let fingerprint = config
            .cache_enabled
            .then(|| Fingerprint::of(invocation, &config.cache_ignore_kwargs));

        Self {
            scan,
            record_activity,
            description: describe(invocation, config),
            fingerprint,
        }
    }
}

/// Human label for an invocation.
///
/// The `description` keyword wins; otherwise the short name reads as a
/// phrase: `scan.port_scan` becomes `Port scan`.
pub fn describe(invocation: &TaskInvocation, config: &InterceptorConfig) -> String {
    let mut description = invocation
        .description_override()
        .unwrap_or_else(|| humanize(invocation.short_name()));

    if config.debug > 1 {
        description.push_str(&format!(
            " | {} | {}",
            render_args(&invocation.args),
            render_kwargs(&invocation.kwargs, &config.cache_ignore_kwargs),
        ));
    }
    description
}

/// `port_scan` -> `Port scan`.
pub fn humanize(short_name: &str) -> String {
    let spaced = short_name.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
