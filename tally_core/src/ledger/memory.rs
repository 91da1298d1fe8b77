use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::Result;
use super::models::{IngestStatus, IngestedUpdate};
use super::traits::IngestLedger;

/// In-memory ledger for local development and unit tests.
///
/// Dedup semantics match the Postgres backend: one record per update id,
/// the first insert wins.
#[derive(Clone, Default)]
pub struct MemoryIngestLedger {
    records: Arc<Mutex<BTreeMap<i64, IngestedUpdate>>>,
}

impl MemoryIngestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records (primarily for tests).
    pub async fn all(&self) -> Vec<IngestedUpdate> {
        self.records.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl IngestLedger for MemoryIngestLedger {
    async fn record_if_new(&self, update_id: i64, payload: &serde_json::Value) -> Result<bool> {
        let mut records = self.records.lock().await;
        if records.contains_key(&update_id) {
            return Ok(false);
        }
        records.insert(update_id, IngestedUpdate::pending(update_id, payload.clone()));
        Ok(true)
    }

    async fn is_duplicate(&self, update_id: i64) -> Result<bool> {
        Ok(self.records.lock().await.contains_key(&update_id))
    }

    async fn mark_processing(&self, update_id: i64) -> Result<()> {
        if let Some(rec) = self.records.lock().await.get_mut(&update_id) {
            rec.status = IngestStatus::Processing;
        }
        Ok(())
    }

    async fn mark_completed(&self, update_id: i64) -> Result<()> {
        if let Some(rec) = self.records.lock().await.get_mut(&update_id) {
            rec.status = IngestStatus::Completed;
            rec.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_failed(&self, update_id: i64, error: &str) -> Result<()> {
        if let Some(rec) = self.records.lock().await.get_mut(&update_id) {
            rec.status = IngestStatus::Failed;
            rec.error = Some(error.to_string());
            rec.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get(&self, update_id: i64) -> Result<Option<IngestedUpdate>> {
        Ok(self.records.lock().await.get(&update_id).cloned())
    }
}
