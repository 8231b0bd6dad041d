//! Result cache: serialized task results keyed by fingerprint, with expiry.
//!
//! Providers are dumb string stores. Interpreting payloads (the `null`
//! sentinel, JSON decoding, truthiness) is the interceptor's job.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::MemoryCache;
pub use redis::RedisCache;

/// Lifetime of every result written by the interceptor.
pub const RESULT_TTL: Duration = Duration::from_secs(600);

/// Payload treated the same as a missing entry.
pub const NULL_PAYLOAD: &str = "null";

#[async_trait]
pub trait ResultCache: Send + Sync {
    /// `Ok(None)` on a miss or an expired entry.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write `value` so that it expires `ttl` after this call.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    fn provider_name(&self) -> &'static str;
}
