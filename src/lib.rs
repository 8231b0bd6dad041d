//! # taskgate
//!
//! Execution wrapper for queue workers. Every task invocation passes through
//! an [`interceptor::Interceptor`], which records a scan activity trail in
//! Postgres, serves recent identical invocations from a Redis result cache,
//! runs the task body, and applies one failure policy to all tasks.

pub mod activity;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod interceptor;
pub mod model;
pub mod telemetry;
