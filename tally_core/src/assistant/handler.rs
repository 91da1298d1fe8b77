use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::models::{InboundMessage, MessageContext, MessageKind};
use super::pipeline::{AssistantDeps, build_pipeline, stage_for_step};
use super::traits::{IntentClassifier, ReceiptReader, ResponseCache, SpeechTranscriber};
use crate::ledger::intake::UpdateDispatcher;
use crate::pipeline::{Pipeline, StepId, StepObserver};
use crate::progress::{MessageSink, ProgressReporter, Stage, UpdatePolicy};
use crate::records::traits::TransactionStore;
use crate::records::{InsertRetrier, RetryPolicy};
use crate::{ChatId, Error, OwnerId, Result};

const APOLOGY: &str = "Sorry, something went wrong on my side. Please try again in a moment.";

/// The bot's message handler: decodes updates, runs the pipeline, and keeps
/// the user looking at a live status message that ends as the reply.
pub struct Assistant {
    sink: Arc<dyn MessageSink>,
    pipeline: Pipeline<MessageContext>,
    policy: UpdatePolicy,
}

impl Assistant {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(
        sink: Arc<dyn MessageSink>,
        transcriber: Arc<dyn SpeechTranscriber>,
        receipts: Arc<dyn ReceiptReader>,
        classifier: Arc<dyn IntentClassifier>,
        cache: Arc<dyn ResponseCache>,
        store: Arc<dyn TransactionStore>,
        retry: RetryPolicy,
        policy: UpdatePolicy,
    ) -> Result<Self> {
        let retrier = Arc::new(
            InsertRetrier::new(store.clone(), retry)
                .map_err(|e| Error::InvalidInput(e.to_string()))?,
        );
        let pipeline = build_pipeline(AssistantDeps {
            transcriber,
            receipts,
            classifier,
            cache,
            retrier,
            store,
        });
        Ok(Self {
            sink,
            pipeline,
            policy,
        })
    }
}

/// Relays executor step transitions to the progress session. `emit` is
/// fire-and-forget, so a slow edit never holds up the pipeline.
struct ProgressObserver {
    reporter: ProgressReporter,
}

impl StepObserver for ProgressObserver {
    fn step_started(&self, step: StepId) {
        if let Some(stage) = stage_for_step(step) {
            self.reporter.emit(stage);
        }
    }
}

#[async_trait]
impl UpdateDispatcher for Assistant {
    #[tracing::instrument(level = "info", skip_all)]
    async fn dispatch(&self, update_id: i64, payload: &serde_json::Value) -> Result<()> {
        let Some(message) = decode_update(payload)? else {
            tracing::debug!(update_id, "update carries no handleable message");
            return Ok(());
        };
        let chat = message.chat;

        let target = self.sink.send_text(chat, Stage::Received.text()).await?;
        let reporter = ProgressReporter::new(self.sink.clone(), target, self.policy);
        let observer = ProgressObserver {
            reporter: reporter.clone(),
        };

        let report = self
            .pipeline
            .run(MessageContext::new(message), Some(&observer))
            .await;

        match report.into_result() {
            Ok(ctx) => {
                let reply = ctx.reply.ok_or_else(|| {
                    Error::BackendMessage("pipeline finished without a reply".to_string())
                })?;
                reporter.complete().await;
                // The status message becomes the reply: one edit, no extra
                // message in the chat.
                self.sink.edit_text(&target, &reply).await?;
                Ok(())
            }
            Err(error) => {
                // Never leave the user staring at frozen progress text.
                reporter.fail().await;
                if let Err(send_err) = self.sink.send_text(chat, APOLOGY).await {
                    tracing::warn!(%send_err, "failed to send apology");
                }
                Err(Error::backend("pipeline", error))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateEnvelope {
    #[serde(default)]
    message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    #[serde(default)]
    from: Option<Sender>,
    chat: ChatInfo,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    voice: Option<VoiceInfo>,
    #[serde(default)]
    photo: Vec<PhotoSize>,
    #[serde(default)]
    caption: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Sender {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct ChatInfo {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct VoiceInfo {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct PhotoSize {
    file_id: String,
}

/// Decode the transport update into an [`InboundMessage`].
///
/// `Ok(None)` for updates this bot does not handle (channel posts, edits,
/// stickers); a malformed body is an error.
#[tracing::instrument(level = "debug", skip_all)]
fn decode_update(payload: &serde_json::Value) -> Result<Option<InboundMessage>> {
    let envelope: UpdateEnvelope = serde_json::from_value(payload.clone())
        .map_err(|e| Error::InvalidInput(format!("malformed update: {e}")))?;
    let Some(msg) = envelope.message else {
        return Ok(None);
    };

    // Group chats share a chat id; the sender id is the owner key. Messages
    // without a sender (channel posts) fall back to the chat itself.
    let owner = OwnerId(msg.from.as_ref().map(|s| s.id).unwrap_or(msg.chat.id));
    let chat = ChatId(msg.chat.id);

    let kind = if let Some(text) = msg.text {
        MessageKind::Text { text }
    } else if let Some(voice) = msg.voice {
        MessageKind::Voice {
            file_id: voice.file_id,
        }
    } else if let Some(photo) = msg.photo.last() {
        // The transport lists sizes smallest first; take the largest.
        MessageKind::Photo {
            file_id: photo.file_id.clone(),
            caption: msg.caption,
        }
    } else {
        return Ok(None);
    };

    Ok(Some(InboundMessage { owner, chat, kind }))
}
