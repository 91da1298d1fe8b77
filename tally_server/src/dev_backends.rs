//! Backend wiring: Postgres-backed stores when a database URL is
//! configured, in-memory dev backends otherwise. The keyword classifier and
//! logging sink make `tally serve` usable with no credentials at all.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use regex::Regex;

use tally_core::assistant::Assistant;
use tally_core::assistant::cache::MemoryResponseCache;
use tally_core::assistant::models::{Intent, QueryWindow, TransactionDraft};
use tally_core::assistant::traits::{IntentClassifier, ReceiptReader, SpeechTranscriber};
use tally_core::ledger::intake::UpdateIntake;
use tally_core::ledger::memory::MemoryIngestLedger;
use tally_core::ledger::store::PgIngestLedger;
use tally_core::ledger::traits::IngestLedger;
use tally_core::progress::{MessageRef, MessageSink};
use tally_core::records::memory::MemoryTransactionStore;
use tally_core::records::store::PgTransactionStore;
use tally_core::records::traits::TransactionStore;
use tally_core::{ChatId, Error, OwnerId, Result};
use tally_integrations::TelegramSink;

use crate::config::AppConfig;
use crate::state::AppState;

const DEV_CURRENCY: &str = "EUR";

#[tracing::instrument(level = "debug", skip_all)]
pub async fn build_state(cfg: &AppConfig) -> anyhow::Result<AppState> {
    let ledger: Arc<dyn IngestLedger> = match &cfg.postgres_url {
        Some(url) => {
            let ledger = PgIngestLedger::connect(url).await?;
            ledger.migrate().await?;
            Arc::new(ledger)
        }
        None => {
            tracing::info!("no database configured; using the in-memory ledger");
            Arc::new(MemoryIngestLedger::new())
        }
    };

    let store: Arc<dyn TransactionStore> = match &cfg.postgres_url {
        Some(url) => {
            let store = PgTransactionStore::connect(url).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        None => Arc::new(MemoryTransactionStore::new()),
    };

    let sink: Arc<dyn MessageSink> = match &cfg.bot_token {
        Some(token) => Arc::new(TelegramSink::new(token.clone())),
        None => {
            tracing::info!("no bot token configured; replies go to the log");
            Arc::new(LoggingSink::default())
        }
    };

    let assistant = Assistant::new(
        sink,
        Arc::new(UnconfiguredTranscriber),
        Arc::new(UnconfiguredReceiptReader),
        Arc::new(KeywordClassifier::new()),
        Arc::new(MemoryResponseCache::new()),
        store,
        cfg.retry,
        cfg.progress_policy,
    )?;

    let intake = Arc::new(UpdateIntake::new(ledger, Arc::new(assistant)));
    Ok(AppState::new(intake, cfg.webhook_signing_secret.clone()))
}

/// Rule-based classifier for dev runs. The production classifier is an
/// LLM-backed implementation of the same trait, wired in at deployment.
pub struct KeywordClassifier {
    amount: Regex,
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self {
            amount: Regex::new(r"(\d+)(?:[.,](\d{1,2}))?").expect("amount regex"),
        }
    }

    fn parse_amount_minor(&self, text: &str) -> Option<i64> {
        let cap = self.amount.captures(text)?;
        let major: i64 = cap.get(1)?.as_str().parse().ok()?;
        let minor = match cap.get(2) {
            Some(frac) if frac.as_str().len() == 1 => frac.as_str().parse::<i64>().ok()? * 10,
            Some(frac) => frac.as_str().parse::<i64>().ok()?,
            None => 0,
        };
        Some(major * 100 + minor)
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    #[tracing::instrument(level = "debug", skip_all)]
    async fn classify(&self, _owner: OwnerId, text: &str) -> Result<Intent> {
        let lower = text.to_lowercase();

        if lower.contains("how much") || lower.contains("total") {
            let window = if lower.contains("month") {
                QueryWindow::Month
            } else if lower.contains("today") {
                QueryWindow::Today
            } else {
                QueryWindow::Week
            };
            return Ok(Intent::QuerySpending { window });
        }

        let spend_shaped =
            lower.starts_with("spent") || lower.starts_with("paid") || lower.contains(" on ");
        if spend_shaped {
            if let Some(amount_minor) = self.parse_amount_minor(&lower) {
                let description = lower
                    .split_once(" on ")
                    .map(|(_, rest)| rest.trim().to_string())
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| "expense".to_string());
                return Ok(Intent::LogTransaction {
                    draft: TransactionDraft {
                        amount_minor,
                        currency: DEV_CURRENCY.to_string(),
                        description,
                        category: None,
                    },
                });
            }
        }

        Ok(Intent::SmallTalk {
            reply: "I can log expenses and total them up. Try 'spent 4.20 on coffee'.".to_string(),
        })
    }
}

struct UnconfiguredTranscriber;

#[async_trait]
impl SpeechTranscriber for UnconfiguredTranscriber {
    async fn transcribe(&self, _file_id: &str) -> Result<String> {
        Err(Error::InvalidInput(
            "voice transcription is not configured on this instance".to_string(),
        ))
    }
}

struct UnconfiguredReceiptReader;

#[async_trait]
impl ReceiptReader for UnconfiguredReceiptReader {
    async fn extract(&self, _file_id: &str, _caption: Option<&str>) -> Result<String> {
        Err(Error::InvalidInput(
            "receipt reading is not configured on this instance".to_string(),
        ))
    }
}

/// Sink that writes outbound messages to the log instead of a chat API.
#[derive(Default)]
pub struct LoggingSink {
    next_id: AtomicI64,
}

#[async_trait]
impl MessageSink for LoggingSink {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageRef> {
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(%chat, message_id, text, "send");
        Ok(MessageRef { chat, message_id })
    }

    async fn edit_text(&self, target: &MessageRef, text: &str) -> Result<()> {
        tracing::info!(chat = %target.chat, message_id = target.message_id, text, "edit");
        Ok(())
    }

    async fn delete(&self, target: &MessageRef) -> Result<()> {
        tracing::info!(chat = %target.chat, message_id = target.message_id, "delete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spend_messages_classify_as_log_drafts() {
        let classifier = KeywordClassifier::new();
        let intent = classifier
            .classify(OwnerId(1), "spent 3.5 on coffee")
            .await
            .unwrap();
        match intent {
            Intent::LogTransaction { draft } => {
                assert_eq!(draft.amount_minor, 350);
                assert_eq!(draft.description, "coffee");
            }
            other => panic!("unexpected intent: {other:?}"),
        }
    }

    #[tokio::test]
    async fn questions_classify_as_queries() {
        let classifier = KeywordClassifier::new();
        let intent = classifier
            .classify(OwnerId(1), "How much did I spend this month?")
            .await
            .unwrap();
        assert_eq!(
            intent,
            Intent::QuerySpending {
                window: QueryWindow::Month
            }
        );
    }

    #[tokio::test]
    async fn everything_else_is_small_talk() {
        let classifier = KeywordClassifier::new();
        let intent = classifier.classify(OwnerId(1), "hello there").await.unwrap();
        assert!(matches!(intent, Intent::SmallTalk { .. }));
    }
}
