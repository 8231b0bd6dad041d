//! Scan activity tracking.
//!
//! [`ActivityTracker`] owns the record-keeping rules (timestamps, error
//! truncation). [`ActivityStore`] is the persistence seam: Postgres in
//! production ([`crate::db::Db`]), [`InMemoryActivityStore`] otherwise.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use opentelemetry::KeyValue;
use tracing::debug;

use crate::error::Result;
use crate::model::activity::*;
use crate::telemetry::metrics;

pub use memory::InMemoryActivityStore;

/// Maximum stored length of an activity error message, in characters.
pub const ERROR_MESSAGE_LIMIT: usize = 300;
/// Characters kept from an over-long message before the trim marker.
pub const ERROR_MESSAGE_KEEP: usize = 288;
/// Appended to truncated messages. `KEEP + marker == LIMIT`.
pub const TRIM_MARKER: &str = "...[trimmed]";

/// Persistence operations needed to track activities.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Resolve a scan. `Error::NotFound` if it does not exist.
    async fn fetch_scan(&self, scan_id: ScanId) -> Result<ScanId>;

    async fn insert_activity(&self, new: NewActivity) -> Result<ActivityId>;

    /// Apply `update` in place. `Error::InvalidTransition` if the record's
    /// current status cannot move to `update.status`.
    async fn update_activity(&self, id: ActivityId, update: ActivityUpdate) -> Result<()>;

    async fn get_activity(&self, id: ActivityId) -> Result<ActivityRecord>;

    /// Activities of a scan, oldest first.
    async fn list_activities(&self, scan_id: ScanId) -> Result<Vec<ActivityRecord>>;
}

/// Creates and advances activity records.
#[derive(Clone)]
pub struct ActivityTracker {
    store: Arc<dyn ActivityStore>,
}

impl ActivityTracker {
    pub fn new(store: Arc<dyn ActivityStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ActivityStore> {
        &self.store
    }

    /// Create a record for `scan_id`. Fails if the scan does not exist.
    pub async fn create(&self, scan_id: ScanId, title: &str, status: Status) -> Result<ActivityId> {
        let scan_id = self.store.fetch_scan(scan_id).await?;
        let id = self
            .store
            .insert_activity(NewActivity {
                scan_id,
                title: title.to_string(),
                status,
                time: Utc::now(),
            })
            .await?;

        debug!(scan_id = %scan_id, activity_id = %id, %status, "activity created");
        metrics::activity_transitions().add(1, &[KeyValue::new("status", status.as_str())]);
        Ok(id)
    }

    /// Move a record to `status`, replacing its error message.
    pub async fn update(&self, id: ActivityId, status: Status, error: Option<&str>) -> Result<()> {
        self.store
            .update_activity(
                id,
                ActivityUpdate {
                    status,
                    error_message: error.map(truncate_error),
                    time: Utc::now(),
                },
            )
            .await?;

        debug!(activity_id = %id, %status, "activity updated");
        metrics::activity_transitions().add(1, &[KeyValue::new("status", status.as_str())]);
        Ok(())
    }
}

/// Clip an error message to [`ERROR_MESSAGE_LIMIT`] characters.
pub fn truncate_error(error: &str) -> String {
    if error.chars().count() <= ERROR_MESSAGE_LIMIT {
        return error.to_string();
    }
    let mut clipped: String = error.chars().take(ERROR_MESSAGE_KEEP).collect();
    clipped.push_str(TRIM_MARKER);
    clipped
}
