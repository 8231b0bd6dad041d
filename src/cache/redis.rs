//! Redis-backed result cache.

use std::time::Duration;

use ::redis::AsyncCommands;
use ::redis::aio::MultiplexedConnection;
use async_trait::async_trait;
use tracing::debug;

use super::ResultCache;
use crate::error::Result;

/// Result cache over a single multiplexed Redis connection.
///
/// The connection is opened once and cloned per call; clones share the same
/// socket. Nothing here reconnects: a dropped connection surfaces as
/// [`crate::error::Error::Cache`] on every subsequent call.
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("conn", &"MultiplexedConnection")
            .finish()
    }
}

impl RedisCache {
    /// Connect to `redis://[:<password>@]<host>:<port>[/<db>]`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = ::redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        debug!("redis result cache connected");
        Ok(Self { conn })
    }

    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ResultCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        // SET .. EX: value and expiry land together.
        let seconds = ttl.as_secs().max(1);
        let () = conn.set_ex(key, value, seconds).await?;
        debug!(key, ttl_seconds = seconds, "result cached");
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "redis"
    }
}
