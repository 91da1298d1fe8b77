use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A durable record of one externally-delivered update.
///
/// Keyed by the transport's own update id. Created on first sight with
/// status `pending`; never deleted by this subsystem (retention is an
/// external concern).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedUpdate {
    pub update_id: i64,
    /// Raw delivery payload, kept opaque for replay and debugging.
    pub payload: serde_json::Value,
    pub status: IngestStatus,
    pub error: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl IngestedUpdate {
    #[tracing::instrument(level = "debug", skip(payload))]
    pub fn pending(update_id: i64, payload: serde_json::Value) -> Self {
        Self {
            update_id,
            payload,
            status: IngestStatus::Pending,
            error: None,
            received_at: Utc::now(),
            processed_at: None,
        }
    }
}
