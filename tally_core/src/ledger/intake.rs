use std::sync::Arc;

use async_trait::async_trait;

use super::traits::IngestLedger;

/// Outcome of one inbound delivery, for logging and tests. The webhook layer
/// above acknowledges the source regardless of the variant: "accept and
/// drop" beats "reject and get redelivered forever" for this class of event
/// source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// First delivery: the pipeline ran and returned cleanly.
    Dispatched,
    /// The update id was already seen (or lost the insert race); nothing was
    /// dispatched.
    Duplicate,
    /// The pipeline ran and failed; recorded in the ledger.
    Failed,
}

/// Seam between ingestion and the message pipeline. The assistant implements
/// this; tests substitute counting fakes.
#[async_trait]
pub trait UpdateDispatcher: Send + Sync {
    async fn dispatch(&self, update_id: i64, payload: &serde_json::Value) -> crate::Result<()>;
}

/// Deduplicating front door for externally-delivered updates.
pub struct UpdateIntake {
    ledger: Arc<dyn IngestLedger>,
    dispatcher: Arc<dyn UpdateDispatcher>,
}

impl UpdateIntake {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(ledger: Arc<dyn IngestLedger>, dispatcher: Arc<dyn UpdateDispatcher>) -> Self {
        Self { ledger, dispatcher }
    }

    /// Handle one delivery of `update_id`.
    ///
    /// Exactly-once dispatch is guaranteed by the ledger's unique key: of N
    /// concurrent deliveries of the same id, one wins `record_if_new` and
    /// dispatches, the rest short-circuit. Ledger bookkeeping failures are
    /// logged and never block processing; the ledger is a dedup aid, not
    /// the source of truth for the user-visible effect.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn handle(&self, update_id: i64, payload: serde_json::Value) -> IntakeOutcome {
        // Probe first: repeated deliveries are common under at-least-once
        // transports and should not cost a write.
        match self.ledger.is_duplicate(update_id).await {
            Ok(true) => {
                tracing::debug!(update_id, "duplicate delivery, skipping");
                return IntakeOutcome::Duplicate;
            }
            Ok(false) => {}
            Err(error) => {
                tracing::warn!(update_id, %error, "ledger duplicate probe failed");
            }
        }

        match self.ledger.record_if_new(update_id, &payload).await {
            Ok(true) => {}
            Ok(false) => {
                // Lost the race to a concurrent identical delivery.
                tracing::debug!(update_id, "concurrent duplicate delivery, skipping");
                return IntakeOutcome::Duplicate;
            }
            Err(error) => {
                // Availability over strict bookkeeping: process the update
                // anyway, but keep this failure distinguishable from a
                // processing failure in the logs.
                tracing::warn!(update_id, %error, "ledger insert failed; dispatching unrecorded");
            }
        }

        if let Err(error) = self.ledger.mark_processing(update_id).await {
            tracing::warn!(update_id, %error, "ledger mark_processing failed");
        }

        match self.dispatcher.dispatch(update_id, &payload).await {
            Ok(()) => {
                if let Err(error) = self.ledger.mark_completed(update_id).await {
                    tracing::warn!(update_id, %error, "ledger mark_completed failed");
                }
                IntakeOutcome::Dispatched
            }
            Err(error) => {
                tracing::error!(update_id, %error, "update processing failed");
                if let Err(mark_err) = self
                    .ledger
                    .mark_failed(update_id, &error.to_string())
                    .await
                {
                    tracing::warn!(update_id, %mark_err, "ledger mark_failed failed");
                }
                IntakeOutcome::Failed
            }
        }
    }
}
