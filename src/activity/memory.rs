//! In-memory activity store for tests and single-process runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use super::ActivityStore;
use crate::error::{Error, Result};
use crate::model::activity::*;

#[derive(Debug, Clone, Default)]
pub struct InMemoryActivityStore {
    scans: Arc<DashSet<ScanId>>,
    records: Arc<DashMap<ActivityId, ActivityRecord>>,
    /// Every status each record has held, in order.
    journal: Arc<DashMap<ActivityId, Vec<Status>>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scan so activities can be attached to it.
    pub fn add_scan(&self, scan_id: ScanId) {
        self.scans.insert(scan_id);
    }

    /// Status history of a record, oldest first. Empty if unknown.
    pub fn transitions(&self, id: ActivityId) -> Vec<Status> {
        self.journal
            .get(&id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// All records, ordered by id.
    pub fn records(&self) -> Vec<ActivityRecord> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.id);
        records
    }
}

#[async_trait]
impl ActivityStore for InMemoryActivityStore {
    async fn fetch_scan(&self, scan_id: ScanId) -> Result<ScanId> {
        if self.scans.contains(&scan_id) {
            Ok(scan_id)
        } else {
            Err(Error::NotFound(format!("scan {scan_id}")))
        }
    }

    async fn insert_activity(&self, new: NewActivity) -> Result<ActivityId> {
        let id = ActivityId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.records.insert(
            id,
            ActivityRecord {
                id,
                scan_id: new.scan_id,
                title: new.title,
                status: new.status,
                error_message: None,
                time: new.time,
            },
        );
        self.journal.insert(id, vec![new.status]);
        Ok(id)
    }

    async fn update_activity(&self, id: ActivityId, update: ActivityUpdate) -> Result<()> {
        let mut record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("activity {id}")))?;

        if !record.status.can_transition_to(update.status) {
            return Err(Error::InvalidTransition {
                from: record.status.to_string(),
                to: update.status.to_string(),
            });
        }

        record.status = update.status;
        record.error_message = update.error_message;
        record.time = update.time;
        drop(record);

        self.journal.entry(id).or_default().push(update.status);
        Ok(())
    }

    async fn get_activity(&self, id: ActivityId) -> Result<ActivityRecord> {
        self.records
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::NotFound(format!("activity {id}")))
    }

    async fn list_activities(&self, scan_id: ScanId) -> Result<Vec<ActivityRecord>> {
        Ok(self
            .records()
            .into_iter()
            .filter(|r| r.scan_id == scan_id)
            .collect())
    }
}
