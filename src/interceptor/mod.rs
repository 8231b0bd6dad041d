//! The task interceptor: the single choke point every task invocation
//! passes through.
//!
//! Per invocation, in order: track (`initiated`), check the result cache,
//! execute, track (`running` then `success`/`failed`), write the result
//! cache. An activity transition always lands before the cache read or write
//! of the same step.
//!
//! Nothing here locks across the check-execute-write sequence. Two workers
//! running the same fingerprint at once may both miss and both execute; the
//! cache only makes duplicates unlikely within its TTL.

pub mod outcome;
pub mod plan;
pub mod registry;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt as _;
use opentelemetry::KeyValue;
use serde_json::Value;
use tracing::{Instrument, Span, debug, error, info, warn};

use crate::activity::ActivityTracker;
use crate::cache::{NULL_PAYLOAD, RESULT_TTL, ResultCache};
use crate::config::InterceptorConfig;
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::model::{ActivityId, Status, TaskContext, TaskInvocation};
use crate::telemetry::metrics;
use crate::telemetry::task::{record_outcome, record_status_transition, start_task_span};

pub use outcome::{Dispatch, Interruption, Outcome, is_truthy};
pub use plan::{InvocationPlan, ScanRef};
pub use registry::{FnTask, Task, TaskRegistry, task_fn};

/// Wraps every registered task body with activity tracking, result caching
/// and the failure policy.
#[derive(Clone)]
pub struct Interceptor {
    registry: Arc<TaskRegistry>,
    cache: Arc<dyn ResultCache>,
    tracker: ActivityTracker,
    config: Arc<InterceptorConfig>,
}

impl Interceptor {
    pub fn new(
        registry: TaskRegistry,
        cache: Arc<dyn ResultCache>,
        tracker: ActivityTracker,
        config: InterceptorConfig,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            cache,
            tracker,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Run an invocation and return only its result.
    ///
    /// Skips and swallowed failures yield `Value::Null`.
    pub async fn call(&self, invocation: TaskInvocation) -> Result<Value> {
        Ok(self.dispatch(invocation).await?.outcome.into_value())
    }

    /// Run an invocation through the full pipeline.
    ///
    /// # Errors
    ///
    /// `InvalidInvocation` for an empty name, `NotFound` for an unregistered
    /// task, and `TaskFailed` when the body fails with `raise_on_error` set.
    pub async fn dispatch(&self, invocation: TaskInvocation) -> Result<Dispatch> {
        if invocation.name == self.config.skip_task {
            debug!(task = %invocation.name, "skip task, nothing to do");
            metrics::task_invocations().add(
                1,
                &[
                    KeyValue::new("task", invocation.name.clone()),
                    KeyValue::new("outcome", Interruption::Skip.label()),
                ],
            );
            return Ok(Dispatch {
                outcome: Outcome::Interrupted(Interruption::Skip),
                activity_id: None,
                fingerprint: None,
                resolution: None,
            });
        }

        if invocation.name.trim().is_empty() {
            return Err(Error::InvalidInvocation("task name is empty".to_string()));
        }
        let task = self
            .registry
            .get(&invocation.name)
            .ok_or_else(|| Error::NotFound(format!("task {}", invocation.name)))?;

        let span = start_task_span(&invocation.name, &invocation.id);
        self.intercept(task, invocation)
            .instrument(span)
            .await
    }

    // Warn and error events name their task explicitly: the task span is
    // info-level and disappears under a stricter filter.
    async fn intercept(&self, task: Arc<dyn Task>, invocation: TaskInvocation) -> Result<Dispatch> {
        let plan = InvocationPlan::new(&invocation, &self.config);
        info!("task started");

        let (activity_id, resolution) = if plan.record_activity {
            match self.begin_activity(&invocation.name, &plan).await {
                Ok(id) => (Some(id), None),
                Err(interruption) => (None, Some(interruption)),
            }
        } else {
            (None, None)
        };

        let ctx = TaskContext {
            task_name: invocation.name.clone(),
            invocation_id: invocation.id,
            scan_id: match plan.scan {
                ScanRef::Resolved(id) => Some(id),
                _ => None,
            },
            activity_id,
            description: plan.description.clone(),
        };

        if let Some(fingerprint) = &plan.fingerprint {
            if let Some(value) = self.lookup(&invocation.name, fingerprint).await {
                info!("task served from cache");
                self.advance(&invocation.name, activity_id, Status::Initiated, Status::Success, None)
                    .await;
                return Ok(self.finish(
                    &invocation.name,
                    Dispatch {
                        outcome: Outcome::Cached(value),
                        activity_id,
                        fingerprint: plan.fingerprint,
                        resolution,
                    },
                ));
            }
        }

        self.advance(&invocation.name, activity_id, Status::Initiated, Status::Running, None)
            .await;

        let started = Instant::now();
        let executed = self.execute(task.as_ref(), &ctx, &invocation.for_body()).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        metrics::task_duration_ms().record(
            duration_ms as f64,
            &[KeyValue::new("task", invocation.name.clone())],
        );

        match executed {
            Ok(value) => {
                info!(duration_ms, "task succeeded");
                self.advance(&invocation.name, activity_id, Status::Running, Status::Success, None)
                    .await;
                if let Some(fingerprint) = &plan.fingerprint {
                    if is_truthy(&value) {
                        self.store(&invocation.name, fingerprint, &value).await;
                    }
                }
                Ok(self.finish(
                    &invocation.name,
                    Dispatch {
                        outcome: Outcome::Completed(value),
                        activity_id,
                        fingerprint: plan.fingerprint,
                        resolution,
                    },
                ))
            }
            Err(interruption) => {
                let message = interruption.activity_message().unwrap_or_default();
                error!(task = %invocation.name, duration_ms, error = %message, "task failed");
                self.advance(
                    &invocation.name,
                    activity_id,
                    Status::Running,
                    Status::Failed,
                    Some(&message),
                )
                .await;

                if self.config.raise_on_error {
                    record_outcome(&Span::current(), interruption.label());
                    metrics::task_invocations().add(
                        1,
                        &[
                            KeyValue::new("task", invocation.name.clone()),
                            KeyValue::new("outcome", interruption.label()),
                        ],
                    );
                    let error = match interruption {
                        Interruption::Execution { error, .. } => error,
                        other => other.label().to_string(),
                    };
                    return Err(Error::TaskFailed {
                        task: invocation.name,
                        error,
                    });
                }
                Ok(self.finish(
                    &invocation.name,
                    Dispatch {
                        outcome: Outcome::Interrupted(interruption),
                        activity_id,
                        fingerprint: plan.fingerprint,
                        resolution,
                    },
                ))
            }
        }
    }

    /// Create the `initiated` activity. A scan that cannot be resolved comes
    /// back as [`Interruption::Resolution`]; the invocation then continues
    /// untracked.
    async fn begin_activity(
        &self,
        task: &str,
        plan: &InvocationPlan,
    ) -> std::result::Result<ActivityId, Interruption> {
        let created = match &plan.scan {
            ScanRef::Resolved(id) => self
                .tracker
                .create(*id, &plan.description, Status::Initiated)
                .await
                .map_err(|e| Interruption::Resolution {
                    scan: id.to_string(),
                    reason: e.to_string(),
                }),
            ScanRef::Unresolvable(value) => Err(Interruption::Resolution {
                scan: value.to_string(),
                reason: "not a scan id".to_string(),
            }),
            ScanRef::Absent => Err(Interruption::Resolution {
                scan: "-".to_string(),
                reason: "no scan argument".to_string(),
            }),
        };

        match &created {
            Ok(_) => record_status_transition(&Span::current(), "none", Status::Initiated.as_str()),
            Err(Interruption::Resolution { scan, reason }) => {
                warn!(task, scan = %scan, reason = %reason, "scan unresolved, running untracked");
            }
            Err(_) => {}
        }
        created
    }

    /// Move the activity, if any, from `from` to `to`. Store errors are
    /// logged; they never abort the invocation.
    async fn advance(
        &self,
        task: &str,
        activity_id: Option<ActivityId>,
        from: Status,
        to: Status,
        error: Option<&str>,
    ) {
        let Some(id) = activity_id else {
            return;
        };
        record_status_transition(&Span::current(), from.as_str(), to.as_str());
        if let Err(e) = self.tracker.update(id, to, error).await {
            warn!(task, activity_id = %id, %from, %to, error = %e, "activity update failed");
        }
    }

    /// Run the body, turning both `Err` and panics into an interruption.
    async fn execute(
        &self,
        task: &dyn Task,
        ctx: &TaskContext,
        invocation: &TaskInvocation,
    ) -> std::result::Result<Value, Interruption> {
        match AssertUnwindSafe(task.run(ctx, invocation)).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(Interruption::execution(&err, self.config.debug)),
            Err(payload) => Err(Interruption::panic(payload.as_ref())),
        }
    }

    /// A usable cached result: present, not `null`, valid JSON. Cache errors
    /// count as a miss.
    async fn lookup(&self, task: &str, fingerprint: &Fingerprint) -> Option<Value> {
        let payload = match self.cache.get(fingerprint.as_str()).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(task, key = %fingerprint, provider = self.cache.provider_name(), error = %e, "cache read failed");
                metrics::cache_lookups().add(1, &[KeyValue::new("result", "error")]);
                return None;
            }
        };

        let value = payload
            .filter(|payload| payload != NULL_PAYLOAD)
            .and_then(|payload| match serde_json::from_str::<Value>(&payload) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(task, key = %fingerprint, error = %e, "ignoring undecodable cache entry");
                    None
                }
            })
            .filter(|value| !value.is_null());

        let result = if value.is_some() { "hit" } else { "miss" };
        debug!(key = %fingerprint, result, "cache lookup");
        metrics::cache_lookups().add(1, &[KeyValue::new("result", result)]);
        value
    }

    async fn store(&self, task: &str, fingerprint: &Fingerprint, value: &Value) {
        if let Err(e) = self
            .cache
            .set(fingerprint.as_str(), &value.to_string(), RESULT_TTL)
            .await
        {
            warn!(task, key = %fingerprint, provider = self.cache.provider_name(), error = %e, "cache write failed");
        }
    }

    fn finish(&self, task: &str, dispatch: Dispatch) -> Dispatch {
        record_outcome(&Span::current(), dispatch.outcome.label());
        metrics::task_invocations().add(
            1,
            &[
                KeyValue::new("task", task.to_string()),
                KeyValue::new("outcome", dispatch.outcome.label()),
            ],
        );
        dispatch
    }
}
