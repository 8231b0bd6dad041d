//! Metric instrument factories for taskgate.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"taskgate"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("taskgate")
}

/// Counter: task invocations seen by the interceptor.
/// Labels: `task`, `outcome` ("completed" | "cached" | "failed" | "skipped").
pub fn task_invocations() -> Counter<u64> {
    meter()
        .u64_counter("taskgate.task.invocations")
        .with_description("Task invocations handled by the interceptor")
        .build()
}

/// Counter: result cache lookups.
/// Labels: `result` ("hit" | "miss" | "error").
pub fn cache_lookups() -> Counter<u64> {
    meter()
        .u64_counter("taskgate.cache.lookups")
        .with_description("Result cache lookups")
        .build()
}

/// Counter: activity records written, by the status they entered.
/// Labels: `status`.
pub fn activity_transitions() -> Counter<u64> {
    meter()
        .u64_counter("taskgate.activity.transitions")
        .with_description("Scan activity status transitions")
        .build()
}

/// Histogram: task body execution time in milliseconds.
/// Labels: `task`.
pub fn task_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("taskgate.task.duration_ms")
        .with_description("Task body execution time in milliseconds")
        .with_unit("ms")
        .build()
}
