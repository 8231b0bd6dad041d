//! Scan activity rows: the Postgres [`ActivityStore`].

use async_trait::async_trait;

use crate::activity::ActivityStore;
use crate::error::{Error, Result};
use crate::model::activity::*;

impl super::Db {
    /// Insert a bare scan row. For fixtures and local setups; production
    /// scans are created by the scan service.
    pub async fn create_scan(&self) -> Result<ScanId> {
        let row: (i64,) = sqlx::query_as("INSERT INTO scan_history DEFAULT VALUES RETURNING id")
            .fetch_one(self.pool())
            .await?;
        Ok(ScanId(row.0))
    }
}

#[async_trait]
impl ActivityStore for super::Db {
    async fn fetch_scan(&self, scan_id: ScanId) -> Result<ScanId> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM scan_history WHERE id = $1")
            .bind(scan_id.0)
            .fetch_optional(self.pool())
            .await?;

        row.map(|(id,)| ScanId(id))
            .ok_or_else(|| Error::NotFound(format!("scan {scan_id}")))
    }

    async fn insert_activity(&self, new: NewActivity) -> Result<ActivityId> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO scan_activity (scan_of, title, status, time)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(new.scan_id.0)
        .bind(&new.title)
        .bind(new.status.as_str())
        .bind(new.time)
        .fetch_one(self.pool())
        .await?;
        Ok(ActivityId(row.0))
    }

    async fn update_activity(&self, id: ActivityId, update: ActivityUpdate) -> Result<()> {
        let allowed_from: Vec<String> = update
            .status
            .predecessors()
            .into_iter()
            .map(|s| s.to_string())
            .collect();

        let rows_affected = sqlx::query(
            "UPDATE scan_activity SET status = $1, error_message = $2, time = $3
             WHERE id = $4 AND status = ANY($5)",
        )
        .bind(update.status.as_str())
        .bind(&update.error_message)
        .bind(update.time)
        .bind(id.0)
        .bind(&allowed_from)
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows_affected == 0 {
            // Missing row, or a status that cannot move to the new one.
            let current = self.get_activity(id).await?;
            return Err(Error::InvalidTransition {
                from: current.status.to_string(),
                to: update.status.to_string(),
            });
        }
        Ok(())
    }

    async fn get_activity(&self, id: ActivityId) -> Result<ActivityRecord> {
        let row: Option<ActivityRow> = sqlx::query_as(
            "SELECT id, scan_of, title, status, error_message, time
             FROM scan_activity WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(self.pool())
        .await?;

        row.ok_or_else(|| Error::NotFound(format!("activity {id}")))?
            .try_into_record()
    }

    async fn list_activities(&self, scan_id: ScanId) -> Result<Vec<ActivityRecord>> {
        let rows: Vec<ActivityRow> = sqlx::query_as(
            "SELECT id, scan_of, title, status, error_message, time
             FROM scan_activity WHERE scan_of = $1
             ORDER BY id",
        )
        .bind(scan_id.0)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(ActivityRow::try_into_record).collect()
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: i64,
    scan_of: i64,
    title: String,
    status: String,
    error_message: Option<String>,
    time: chrono::DateTime<chrono::Utc>,
}

impl ActivityRow {
    fn try_into_record(self) -> Result<ActivityRecord> {
        Ok(ActivityRecord {
            id: ActivityId(self.id),
            scan_id: ScanId(self.scan_of),
            title: self.title,
            status: self.status.parse()?,
            error_message: self.error_message,
            time: self.time,
        })
    }
}
