use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::records::models::{OwnerTotals, Transaction};
use crate::{ChatId, OwnerId};

/// What the user sent, decoded from the transport update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub owner: OwnerId,
    pub chat: ChatId,
    pub kind: MessageKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum MessageKind {
    Text { text: String },
    Voice { file_id: String },
    Photo { file_id: String, caption: Option<String> },
}

/// Classified user intent. Produced by the [`IntentClassifier`] seam; the
/// prompt and model behind it are opaque to this crate.
///
/// [`IntentClassifier`]: super::traits::IntentClassifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "intent")]
pub enum Intent {
    LogTransaction { draft: TransactionDraft },
    QuerySpending { window: QueryWindow },
    SmallTalk { reply: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDraft {
    pub amount_minor: i64,
    pub currency: String,
    pub description: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryWindow {
    Today,
    Week,
    Month,
}

impl QueryWindow {
    /// Rolling-window start. Calendar alignment and timezone handling are a
    /// formatting concern upstream of this core.
    pub fn since(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Today => now - Duration::days(1),
            Self::Week => now - Duration::days(7),
            Self::Month => now - Duration::days(30),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Week => "this week",
            Self::Month => "this month",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpendingSummary {
    pub window: QueryWindow,
    pub totals: OwnerTotals,
}

/// The single typed payload threaded through the pipeline. Each step reads
/// what it needs and fills in its own fields; the schema only ever grows
/// along the run.
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub message: InboundMessage,

    /// Extracted by the content branch (text passthrough, transcription, or
    /// receipt reading).
    pub text: Option<String>,
    /// Cache key derived from `text`.
    pub normalized: Option<String>,
    /// Precomputed reply found by the cache-lookup step. Downstream steps
    /// serve this instead of recomputing.
    pub cached: Option<String>,
    pub intent: Option<Intent>,

    // Respond-branch outputs. Exactly one is set per run; the executor
    // checks that before the join runs.
    pub cached_reply: Option<String>,
    pub logged: Option<Transaction>,
    pub summary: Option<SpendingSummary>,
    pub chat_reply: Option<String>,

    pub reply: Option<String>,
    pub served_from_cache: bool,
}

impl MessageContext {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(message: InboundMessage) -> Self {
        Self {
            message,
            text: None,
            normalized: None,
            cached: None,
            intent: None,
            cached_reply: None,
            logged: None,
            summary: None,
            chat_reply: None,
            reply: None,
            served_from_cache: false,
        }
    }
}
