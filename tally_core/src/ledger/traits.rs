use async_trait::async_trait;

use super::Result;
use super::models::IngestedUpdate;

#[async_trait]
pub trait IngestLedger: Send + Sync {
    /// Insert a `pending` record for `update_id` if it has never been seen.
    ///
    /// Returns `true` on first sight (the insert succeeded) and `false` when
    /// the id already exists; the unique-key conflict is control flow, not
    /// an error. Any other storage failure propagates as `Err`.
    async fn record_if_new(&self, update_id: i64, payload: &serde_json::Value) -> Result<bool>;

    /// Read-only existence probe, usable before attempting the insert to
    /// short-circuit obviously repeated deliveries without a write.
    async fn is_duplicate(&self, update_id: i64) -> Result<bool>;

    async fn mark_processing(&self, update_id: i64) -> Result<()>;

    async fn mark_completed(&self, update_id: i64) -> Result<()>;

    async fn mark_failed(&self, update_id: i64, error: &str) -> Result<()>;

    /// Fetch a record (for diagnostics and tests).
    async fn get(&self, update_id: i64) -> Result<Option<IngestedUpdate>>;
}
