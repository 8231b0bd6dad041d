//! Integration tests for the task interceptor, on in-memory stores.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use taskgate::activity::{ActivityTracker, InMemoryActivityStore, TRIM_MARKER};
use taskgate::cache::{MemoryCache, RESULT_TTL, ResultCache};
use taskgate::config::InterceptorConfig;
use taskgate::error::Error;
use taskgate::fingerprint::Fingerprint;
use taskgate::interceptor::{Interceptor, Interruption, Outcome, TaskRegistry, task_fn};
use taskgate::model::{ScanId, Status, TaskInvocation};

const SCAN: ScanId = ScanId(42);

struct Harness {
    interceptor: Interceptor,
    store: InMemoryActivityStore,
    cache: MemoryCache,
}

fn harness(registry: TaskRegistry, config: InterceptorConfig) -> Harness {
    let store = InMemoryActivityStore::new();
    store.add_scan(SCAN);
    let cache = MemoryCache::new();
    let interceptor = Interceptor::new(
        registry,
        Arc::new(cache.clone()),
        ActivityTracker::new(Arc::new(store.clone())),
        config,
    );
    Harness {
        interceptor,
        store,
        cache,
    }
}

/// Registry with `scan.port_scan` returning a fixed port list and counting calls.
fn port_scan_registry(calls: &Arc<AtomicUsize>) -> TaskRegistry {
    let calls = Arc::clone(calls);
    TaskRegistry::new().register(
        "scan.port_scan",
        task_fn(move |_ctx, _inv| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(json!({"ports": [80, 443]}))
            }
        }),
    )
}

fn failing_registry(message: &'static str) -> TaskRegistry {
    TaskRegistry::new().register(
        "scan.fetch_url",
        task_fn(move |_ctx, _inv| async move { Err::<Value, _>(anyhow::anyhow!(message)) }),
    )
}

fn port_scan(scan: impl Into<Value>) -> TaskInvocation {
    TaskInvocation::new("scan.port_scan")
        .arg(scan)
        .arg(Value::Null)
}

/// Cache that counts every call, to prove the skip path never touches it.
#[derive(Default)]
struct CountingCache {
    calls: AtomicUsize,
}

#[async_trait]
impl ResultCache for CountingCache {
    async fn get(&self, _key: &str) -> taskgate::error::Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> taskgate::error::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "counting"
    }
}

// ---------------------------------------------------------------------------
// Skip sentinel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn skip_task_has_no_side_effects() {
    let store = InMemoryActivityStore::new();
    store.add_scan(SCAN);
    let cache = Arc::new(CountingCache::default());
    let interceptor = Interceptor::new(
        TaskRegistry::new(),
        cache.clone(),
        ActivityTracker::new(Arc::new(store.clone())),
        InterceptorConfig::default(),
    );

    let dispatch = interceptor
        .dispatch(TaskInvocation::new("tasks.skip").arg(42).arg(1))
        .await
        .unwrap();

    assert_eq!(dispatch.outcome, Outcome::Interrupted(Interruption::Skip));
    assert_eq!(dispatch.activity_id, None);
    assert_eq!(dispatch.fingerprint, None);
    assert!(store.records().is_empty());
    assert_eq!(cache.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn skip_task_name_is_configurable() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = harness(
        port_scan_registry(&calls),
        InterceptorConfig {
            skip_task: "scan.port_scan".to_string(),
            ..Default::default()
        },
    );

    let value = h.interceptor.call(port_scan(42)).await.unwrap();
    assert_eq!(value, Value::Null);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Tracked + cached lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn port_scan_is_tracked_cached_and_deduplicated() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = harness(port_scan_registry(&calls), InterceptorConfig::default());

    let first = h.interceptor.dispatch(port_scan(42)).await.unwrap();
    assert_eq!(first.outcome, Outcome::Completed(json!({"ports": [80, 443]})));
    assert_eq!(first.resolution, None);

    let activity = first.activity_id.expect("activity should be created");
    let record = h.store.records().pop().unwrap();
    assert_eq!(record.id, activity);
    assert_eq!(record.scan_id, SCAN);
    assert_eq!(record.title, "Port scan");
    assert_eq!(record.status, Status::Success);
    assert_eq!(
        h.store.transitions(activity),
        vec![Status::Initiated, Status::Running, Status::Success]
    );

    let fingerprint = first.fingerprint.clone().expect("caching is on");
    let cached = h.cache.get(fingerprint.as_str()).await.unwrap();
    assert_eq!(cached.as_deref(), Some(r#"{"ports":[80,443]}"#));

    // Second identical call: served from cache, body untouched.
    let second = h.interceptor.dispatch(port_scan(42)).await.unwrap();
    assert_eq!(second.outcome, Outcome::Cached(json!({"ports": [80, 443]})));
    assert_eq!(second.fingerprint, Some(fingerprint));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let second_activity = second.activity_id.unwrap();
    assert_ne!(second_activity, activity);
    assert_eq!(
        h.store.transitions(second_activity),
        vec![Status::Initiated, Status::Success]
    );
}

#[tokio::test(start_paused = true)]
async fn cached_result_expires_after_ttl() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = harness(port_scan_registry(&calls), InterceptorConfig::default());

    h.interceptor.call(port_scan(42)).await.unwrap();
    tokio::time::advance(RESULT_TTL - Duration::from_secs(1)).await;
    h.interceptor.call(port_scan(42)).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    let value = h.interceptor.call(port_scan(42)).await.unwrap();
    assert_eq!(value, json!({"ports": [80, 443]}));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn caching_disabled_always_executes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = harness(
        port_scan_registry(&calls),
        InterceptorConfig {
            cache_enabled: false,
            ..Default::default()
        },
    );

    let first = h.interceptor.dispatch(port_scan(42)).await.unwrap();
    h.interceptor.dispatch(port_scan(42)).await.unwrap();

    assert_eq!(first.fingerprint, None);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn falsy_results_are_not_cached() {
    let h = harness(
        TaskRegistry::new().register(
            "scan.subdomains",
            task_fn(|_ctx, _inv| async { Ok::<_, anyhow::Error>(json!([])) }),
        ),
        InterceptorConfig::default(),
    );

    let value = h
        .interceptor
        .call(TaskInvocation::new("scan.subdomains").arg(42))
        .await
        .unwrap();

    assert_eq!(value, json!([]));
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn null_cache_payload_is_a_miss() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = harness(port_scan_registry(&calls), InterceptorConfig::default());

    let key = Fingerprint::of(&port_scan(42), &Default::default());
    h.cache.set(key.as_str(), "null", RESULT_TTL).await.unwrap();

    let dispatch = h.interceptor.dispatch(port_scan(42)).await.unwrap();
    assert!(matches!(dispatch.outcome, Outcome::Completed(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn ignored_kwargs_do_not_split_the_cache() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = harness(
        port_scan_registry(&calls),
        InterceptorConfig {
            cache_ignore_kwargs: ["ctx".to_string()].into(),
            ..Default::default()
        },
    );

    h.interceptor
        .call(port_scan(42).kwarg("ctx", json!({"worker": 1})))
        .await
        .unwrap();
    let dispatch = h
        .interceptor
        .dispatch(port_scan(42).kwarg("ctx", json!({"worker": 2})))
        .await
        .unwrap();

    assert!(matches!(dispatch.outcome, Outcome::Cached(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Tracking decisions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_scan_runs_untracked_and_still_caches() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = harness(port_scan_registry(&calls), InterceptorConfig::default());

    let dispatch = h
        .interceptor
        .dispatch(TaskInvocation::new("scan.port_scan").kwarg("host", "example.com"))
        .await
        .unwrap();

    assert_eq!(dispatch.activity_id, None);
    assert!(h.store.records().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.cache.len(), 1);
}

#[tokio::test]
async fn unknown_scan_runs_untracked() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = harness(port_scan_registry(&calls), InterceptorConfig::default());

    let dispatch = h.interceptor.dispatch(port_scan(999)).await.unwrap();

    assert!(matches!(dispatch.outcome, Outcome::Completed(_)));
    assert_eq!(dispatch.activity_id, None);
    match &dispatch.resolution {
        Some(resolution @ Interruption::Resolution { scan, reason }) => {
            assert_eq!(scan, "999");
            assert!(reason.contains("not found"), "{reason}");
            assert_eq!(resolution.label(), "unresolved");
        }
        other => panic!("expected a resolution failure, got {other:?}"),
    }
    assert!(h.store.records().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_numeric_scan_runs_untracked() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = harness(port_scan_registry(&calls), InterceptorConfig::default());

    let dispatch = h.interceptor.dispatch(port_scan("latest")).await.unwrap();

    assert_eq!(dispatch.activity_id, None);
    assert_eq!(
        dispatch.resolution,
        Some(Interruption::Resolution {
            scan: r#""latest""#.to_string(),
            reason: "not a scan id".to_string(),
        })
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn no_activity_slot_means_no_tracking() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = harness(port_scan_registry(&calls), InterceptorConfig::default());

    let dispatch = h
        .interceptor
        .dispatch(TaskInvocation::new("scan.port_scan").arg(42))
        .await
        .unwrap();

    assert_eq!(dispatch.activity_id, None);
    assert!(h.store.records().is_empty());
}

#[tokio::test]
async fn skip_record_activity_disables_tracking() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = harness(
        port_scan_registry(&calls),
        InterceptorConfig {
            skip_record_activity: ["scan.port_scan".to_string()].into(),
            ..Default::default()
        },
    );

    let dispatch = h.interceptor.dispatch(port_scan(42)).await.unwrap();

    assert_eq!(dispatch.activity_id, None);
    assert!(h.store.records().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn keyword_scan_and_activity_slot_reach_the_body() {
    let h = harness(
        TaskRegistry::new().register(
            "scan.dir_fuzz",
            task_fn(|ctx, inv| async move {
                Ok::<_, anyhow::Error>(json!({
                    "activity": ctx.activity_id.map(|id| id.0),
                    "scan": ctx.scan_id.map(|id| id.0),
                    "saw_description": inv.kwargs.contains_key("description"),
                    "title": ctx.description,
                }))
            }),
        ),
        InterceptorConfig::default(),
    );

    let dispatch = h
        .interceptor
        .dispatch(
            TaskInvocation::new("scan.dir_fuzz")
                .kwarg("scan_history_id", 42)
                .kwarg("activity_id", Value::Null)
                .kwarg("description", "Directory fuzzing"),
        )
        .await
        .unwrap();

    let activity = dispatch.activity_id.expect("tracked via keywords");
    assert_eq!(
        dispatch.outcome,
        Outcome::Completed(json!({
            "activity": activity.0,
            "scan": 42,
            "saw_description": false,
            "title": "Directory fuzzing",
        }))
    );
    assert_eq!(h.store.records()[0].title, "Directory fuzzing");
}

#[tokio::test]
async fn falsy_description_falls_back_to_task_name() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = harness(port_scan_registry(&calls), InterceptorConfig::default());

    for description in [json!(0), json!(""), json!([]), json!({}), json!(false), Value::Null] {
        h.interceptor
            .call(port_scan(42).kwarg("description", description))
            .await
            .unwrap();
    }
    h.interceptor
        .call(port_scan(42).kwarg("description", 7))
        .await
        .unwrap();

    let titles: Vec<_> = h.store.records().into_iter().map(|r| r.title).collect();
    assert_eq!(titles[..6], ["Port scan"; 6]);
    assert_eq!(titles[6], "7");
}

#[tokio::test]
async fn verbose_description_includes_arguments() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = harness(
        port_scan_registry(&calls),
        InterceptorConfig {
            debug: 2,
            cache_ignore_kwargs: ["ctx".to_string()].into(),
            ..Default::default()
        },
    );

    h.interceptor
        .call(port_scan(42).kwarg("ports", "top-100").kwarg("ctx", "hidden"))
        .await
        .unwrap();

    assert_eq!(
        h.store.records()[0].title,
        r#"Port scan | 42_null | ports="top-100""#
    );
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn swallowed_failure_returns_null_and_marks_failed() {
    let h = harness(
        failing_registry("connection refused"),
        InterceptorConfig::default(),
    );

    let dispatch = h
        .interceptor
        .dispatch(TaskInvocation::new("scan.fetch_url").arg(42).arg(Value::Null))
        .await
        .unwrap();

    assert!(matches!(
        dispatch.outcome,
        Outcome::Interrupted(Interruption::Execution { .. })
    ));
    assert_eq!(dispatch.outcome.clone().into_value(), Value::Null);

    let activity = dispatch.activity_id.unwrap();
    assert_eq!(
        h.store.transitions(activity),
        vec![Status::Initiated, Status::Running, Status::Failed]
    );
    let record = &h.store.records()[0];
    assert_eq!(record.error_message.as_deref(), Some("connection refused"));
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn raise_on_error_propagates_the_failure() {
    let h = harness(
        failing_registry("connection refused"),
        InterceptorConfig {
            raise_on_error: true,
            ..Default::default()
        },
    );

    let err = h
        .interceptor
        .call(TaskInvocation::new("scan.fetch_url").arg(42).arg(Value::Null))
        .await
        .unwrap_err();

    match err {
        Error::TaskFailed { task, error } => {
            assert_eq!(task, "scan.fetch_url");
            assert_eq!(error, "connection refused");
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
    assert_eq!(h.store.records()[0].status, Status::Failed);
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn verbose_failure_appends_trace() {
    let h = harness(
        failing_registry("connection refused"),
        InterceptorConfig {
            debug: 1,
            ..Default::default()
        },
    );

    h.interceptor
        .call(TaskInvocation::new("scan.fetch_url").arg(42).arg(Value::Null))
        .await
        .unwrap();

    let message = h.store.records()[0].error_message.clone().unwrap();
    assert!(message.starts_with("connection refused\n =>"), "{message}");
}

#[tokio::test]
async fn long_failure_message_is_truncated() {
    let h = harness(
        TaskRegistry::new().register(
            "scan.screenshot",
            task_fn(|_ctx, _inv| async { Err::<Value, _>(anyhow::anyhow!("x".repeat(500))) }),
        ),
        InterceptorConfig::default(),
    );

    h.interceptor
        .call(TaskInvocation::new("scan.screenshot").arg(42).arg(Value::Null))
        .await
        .unwrap();

    let message = h.store.records()[0].error_message.clone().unwrap();
    assert_eq!(message.chars().count(), 300);
    assert!(message.ends_with(TRIM_MARKER));
}

#[tokio::test]
async fn panicking_body_is_a_failure() {
    let h = harness(
        TaskRegistry::new().register(
            "scan.crawl",
            task_fn(|_ctx, _inv| async {
                if true {
                    panic!("index out of range");
                }
                Ok::<_, anyhow::Error>(Value::Null)
            }),
        ),
        InterceptorConfig::default(),
    );

    let dispatch = h
        .interceptor
        .dispatch(TaskInvocation::new("scan.crawl").arg(42).arg(Value::Null))
        .await
        .unwrap();

    match dispatch.outcome {
        Outcome::Interrupted(Interruption::Execution { error, .. }) => {
            assert!(error.contains("index out of range"), "{error}");
        }
        other => panic!("expected execution failure, got {other:?}"),
    }
    assert_eq!(h.store.records()[0].status, Status::Failed);
}

// ---------------------------------------------------------------------------
// Rejections and concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_and_unknown_names_are_rejected() {
    let h = harness(TaskRegistry::new(), InterceptorConfig::default());

    let empty = h.interceptor.call(TaskInvocation::new("")).await.unwrap_err();
    assert!(matches!(empty, Error::InvalidInvocation(_)));

    let unknown = h
        .interceptor
        .call(TaskInvocation::new("scan.nope").arg(42).arg(1))
        .await
        .unwrap_err();
    assert!(matches!(unknown, Error::NotFound(_)));
    assert!(h.store.records().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_invocations_each_get_their_own_activity() {
    let calls = Arc::new(AtomicUsize::new(0));
    let h = harness(port_scan_registry(&calls), InterceptorConfig::default());

    let handles: Vec<_> = (0..8)
        .map(|port| {
            let interceptor = h.interceptor.clone();
            tokio::spawn(async move {
                interceptor
                    .dispatch(port_scan(42).kwarg("port", port))
                    .await
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        let dispatch = handle.await.unwrap();
        let id = dispatch.activity_id.unwrap();
        assert_eq!(
            h.store.transitions(id),
            vec![Status::Initiated, Status::Running, Status::Success]
        );
    }
    assert_eq!(h.store.records().len(), 8);
    assert_eq!(calls.load(Ordering::SeqCst), 8);
}
