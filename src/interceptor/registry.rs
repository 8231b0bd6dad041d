//! Task bodies and the registry the interceptor dispatches into.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{TaskContext, TaskInvocation};

/// The business logic of one task type.
///
/// Bodies receive their own arguments untouched (minus `description`) and
/// find their activity handle in [`TaskContext::activity_id`].
#[async_trait]
pub trait Task: Send + Sync {
    async fn run(&self, ctx: &TaskContext, invocation: &TaskInvocation) -> anyhow::Result<Value>;
}

/// A [`Task`] backed by an async closure over owned inputs.
pub struct FnTask<F>(F);

/// Wrap an async closure as a task body.
pub fn task_fn<F, Fut>(f: F) -> FnTask<F>
where
    F: Fn(TaskContext, TaskInvocation) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    FnTask(f)
}

#[async_trait]
impl<F, Fut> Task for FnTask<F>
where
    F: Fn(TaskContext, TaskInvocation) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn run(&self, ctx: &TaskContext, invocation: &TaskInvocation) -> anyhow::Result<Value> {
        (self.0)(ctx.clone(), invocation.clone()).await
    }
}

/// Registry of task bodies, indexed by dotted task name.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, Arc<dyn Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the body for `name`.
    pub fn register(mut self, name: impl Into<String>, task: impl Task + 'static) -> Self {
        self.tasks.insert(name.into(), Arc::new(task));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(name).cloned()
    }

    /// Registered task names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tasks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
