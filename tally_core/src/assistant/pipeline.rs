use std::sync::Arc;

use chrono::Utc;

use super::cache::normalize;
use super::models::{Intent, MessageContext, MessageKind, SpendingSummary};
use super::traits::{IntentClassifier, ReceiptReader, ResponseCache, SpeechTranscriber};
use crate::pipeline::{Arm, Branch, Node, Pipeline, Step, StepId};
use crate::progress::Stage;
use crate::records::models::{NewTransaction, Transaction};
use crate::records::traits::TransactionStore;
use crate::records::InsertRetrier;
use crate::Error;

/// Everything the pipeline steps call out to. All handles are injected; no
/// ambient globals, so tests can substitute fakes per run.
pub struct AssistantDeps {
    pub transcriber: Arc<dyn SpeechTranscriber>,
    pub receipts: Arc<dyn ReceiptReader>,
    pub classifier: Arc<dyn IntentClassifier>,
    pub cache: Arc<dyn ResponseCache>,
    pub retrier: Arc<InsertRetrier>,
    pub store: Arc<dyn TransactionStore>,
}

/// Map executor step transitions to user-visible stages. Steps without an
/// entry (normalization, cache bookkeeping) are too fast to be worth an
/// edit.
pub(crate) fn stage_for_step(step: StepId) -> Option<Stage> {
    match step.0 {
        "transcribe_voice" => Some(Stage::Transcribing),
        "read_receipt" => Some(Stage::ReadingReceipt),
        "classify" => Some(Stage::Classifying),
        "log_transaction" => Some(Stage::Logging),
        "summarize_spending" => Some(Stage::Summing),
        "compose_reply" => Some(Stage::Replying),
        _ => None,
    }
}

#[tracing::instrument(level = "debug", skip_all)]
pub fn build_pipeline(deps: AssistantDeps) -> Pipeline<MessageContext> {
    Pipeline::new(vec![
        Node::Branch(extract_branch(&deps)),
        Node::Step(normalize_step()),
        Node::Step(cache_lookup_step(&deps)),
        Node::Step(classify_step(&deps)),
        Node::Branch(respond_branch(&deps)),
        Node::Step(cache_store_step(&deps)),
    ])
}

/// Content extraction: one arm per message kind, all normalizing into
/// `ctx.text`.
fn extract_branch(deps: &AssistantDeps) -> Branch<MessageContext> {
    let transcriber = deps.transcriber.clone();
    let receipts = deps.receipts.clone();

    Branch::new(
        "extract",
        vec![
            Arm::new(
                |ctx: &MessageContext| matches!(ctx.message.kind, MessageKind::Text { .. }),
                Step::new("extract_text", |mut ctx: MessageContext| async move {
                    let MessageKind::Text { text } = &ctx.message.kind else {
                        return Err(Error::InvalidInput(
                            "extract_text arm on a non-text message".to_string(),
                        ));
                    };
                    ctx.text = Some(text.clone());
                    Ok(ctx)
                }),
            ),
            Arm::new(
                |ctx: &MessageContext| matches!(ctx.message.kind, MessageKind::Voice { .. }),
                Step::new("transcribe_voice", move |mut ctx: MessageContext| {
                    let transcriber = transcriber.clone();
                    async move {
                        let MessageKind::Voice { file_id } = &ctx.message.kind else {
                            return Err(Error::InvalidInput(
                                "transcribe_voice arm on a non-voice message".to_string(),
                            ));
                        };
                        let text = transcriber.transcribe(file_id).await?;
                        ctx.text = Some(text);
                        Ok(ctx)
                    }
                }),
            ),
            Arm::new(
                |ctx: &MessageContext| matches!(ctx.message.kind, MessageKind::Photo { .. }),
                Step::new("read_receipt", move |mut ctx: MessageContext| {
                    let receipts = receipts.clone();
                    async move {
                        let MessageKind::Photo { file_id, caption } = &ctx.message.kind else {
                            return Err(Error::InvalidInput(
                                "read_receipt arm on a non-photo message".to_string(),
                            ));
                        };
                        let text = receipts.extract(file_id, caption.as_deref()).await?;
                        ctx.text = Some(text);
                        Ok(ctx)
                    }
                }),
            ),
        ],
        |ctx: &MessageContext| ctx.text.iter().count(),
        Step::new("accept_text", |mut ctx: MessageContext| async move {
            let text = ctx.text.as_deref().map(str::trim).unwrap_or_default();
            if text.is_empty() {
                return Err(Error::InvalidInput(
                    "message contained no usable text".to_string(),
                ));
            }
            ctx.text = Some(text.to_string());
            Ok(ctx)
        }),
    )
}

fn normalize_step() -> Step<MessageContext> {
    Step::new("normalize", |mut ctx: MessageContext| async move {
        let text = ctx
            .text
            .as_deref()
            .ok_or_else(|| Error::InvalidInput("normalize before extraction".to_string()))?;
        ctx.normalized = Some(normalize(text));
        Ok(ctx)
    })
}

fn cache_lookup_step(deps: &AssistantDeps) -> Step<MessageContext> {
    let cache = deps.cache.clone();
    Step::new("cache_lookup", move |mut ctx: MessageContext| {
        let cache = cache.clone();
        async move {
            let Some(key) = ctx.normalized.as_deref() else {
                return Err(Error::InvalidInput(
                    "cache lookup before normalization".to_string(),
                ));
            };
            match cache.get(ctx.message.owner, key).await {
                Ok(hit) => ctx.cached = hit,
                Err(error) => {
                    // A cache outage must not fail the message.
                    tracing::warn!(%error, "response cache lookup failed");
                }
            }
            Ok(ctx)
        }
    })
}

fn classify_step(deps: &AssistantDeps) -> Step<MessageContext> {
    let classifier = deps.classifier.clone();
    Step::new("classify", move |mut ctx: MessageContext| {
        let classifier = classifier.clone();
        async move {
            // A cache hit made the expensive call unnecessary; the rest of
            // the pipeline's bookkeeping still runs.
            if ctx.cached.is_some() {
                return Ok(ctx);
            }
            let text = ctx
                .text
                .as_deref()
                .ok_or_else(|| Error::InvalidInput("classify before extraction".to_string()))?;
            let intent = classifier.classify(ctx.message.owner, text).await?;
            ctx.intent = Some(intent);
            Ok(ctx)
        }
    })
}

/// Specialist routines: exactly one arm per run, selected from the cache
/// flag and the classified intent.
fn respond_branch(deps: &AssistantDeps) -> Branch<MessageContext> {
    let retrier = deps.retrier.clone();
    let store = deps.store.clone();

    Branch::new(
        "respond",
        vec![
            Arm::new(
                |ctx: &MessageContext| ctx.cached.is_some(),
                Step::new("serve_cached", |mut ctx: MessageContext| async move {
                    let Some(reply) = ctx.cached.take() else {
                        return Err(Error::InvalidInput(
                            "serve_cached arm without a cached reply".to_string(),
                        ));
                    };
                    ctx.cached_reply = Some(reply);
                    Ok(ctx)
                }),
            ),
            Arm::new(
                |ctx: &MessageContext| {
                    ctx.cached.is_none()
                        && matches!(ctx.intent, Some(Intent::LogTransaction { .. }))
                },
                Step::new("log_transaction", move |mut ctx: MessageContext| {
                    let retrier = retrier.clone();
                    async move {
                        let Some(Intent::LogTransaction { draft }) = ctx.intent.clone() else {
                            return Err(Error::InvalidInput(
                                "log_transaction arm without a draft".to_string(),
                            ));
                        };
                        let new = NewTransaction::new(
                            ctx.message.owner,
                            draft.amount_minor,
                            draft.currency,
                            draft.description,
                            draft.category,
                            None,
                        )
                        .map_err(|e| Error::InvalidInput(e.to_string()))?;

                        let receipt = retrier
                            .insert_with_retry(&new)
                            .await
                            .map_err(|e| Error::backend("transactions", e))?;
                        tracing::debug!(
                            owner = %new.owner,
                            display_id = receipt.transaction.display_id,
                            attempts = receipt.attempts,
                            duration_ms = receipt.duration_ms,
                            "transaction logged"
                        );
                        ctx.logged = Some(receipt.transaction);
                        Ok(ctx)
                    }
                }),
            ),
            Arm::new(
                |ctx: &MessageContext| {
                    ctx.cached.is_none()
                        && matches!(ctx.intent, Some(Intent::QuerySpending { .. }))
                },
                Step::new("summarize_spending", move |mut ctx: MessageContext| {
                    let store = store.clone();
                    async move {
                        let Some(Intent::QuerySpending { window }) = ctx.intent.clone() else {
                            return Err(Error::InvalidInput(
                                "summarize_spending arm without a window".to_string(),
                            ));
                        };
                        let totals = store
                            .totals_since(ctx.message.owner, window.since(Utc::now()))
                            .await
                            .map_err(|e| Error::backend("transactions", e))?;
                        ctx.summary = Some(SpendingSummary { window, totals });
                        Ok(ctx)
                    }
                }),
            ),
            Arm::new(
                |ctx: &MessageContext| {
                    ctx.cached.is_none() && matches!(ctx.intent, Some(Intent::SmallTalk { .. }))
                },
                Step::new("chat_reply", |mut ctx: MessageContext| async move {
                    let Some(Intent::SmallTalk { reply }) = ctx.intent.clone() else {
                        return Err(Error::InvalidInput(
                            "chat_reply arm without a reply".to_string(),
                        ));
                    };
                    ctx.chat_reply = Some(reply);
                    Ok(ctx)
                }),
            ),
        ],
        |ctx: &MessageContext| {
            ctx.cached_reply.iter().count()
                + ctx.logged.iter().count()
                + ctx.summary.iter().count()
                + ctx.chat_reply.iter().count()
        },
        Step::new("compose_reply", |mut ctx: MessageContext| async move {
            ctx.served_from_cache = ctx.cached_reply.is_some();
            let reply = if let Some(reply) = &ctx.cached_reply {
                reply.clone()
            } else if let Some(logged) = &ctx.logged {
                format_logged(logged)
            } else if let Some(summary) = &ctx.summary {
                format_summary(summary)
            } else if let Some(reply) = &ctx.chat_reply {
                reply.clone()
            } else {
                return Err(Error::BackendMessage(
                    "respond branch produced no output".to_string(),
                ));
            };
            ctx.reply = Some(reply);
            Ok(ctx)
        }),
    )
}

fn cache_store_step(deps: &AssistantDeps) -> Step<MessageContext> {
    let cache = deps.cache.clone();
    Step::new("cache_store", move |ctx: MessageContext| {
        let cache = cache.clone();
        async move {
            // Serving from cache caches nothing new.
            if ctx.served_from_cache {
                return Ok(ctx);
            }
            // Transactional replies are never cached: replaying one later
            // would skip the write it describes.
            if ctx.logged.is_some() {
                return Ok(ctx);
            }
            if let (Some(key), Some(reply)) = (ctx.normalized.as_deref(), ctx.reply.as_deref()) {
                if let Err(error) = cache.put(ctx.message.owner, key, reply).await {
                    tracing::warn!(%error, "response cache store failed");
                }
            }
            Ok(ctx)
        }
    })
}

fn format_logged(t: &Transaction) -> String {
    format!(
        "Logged #{}: {} ({})",
        t.display_id,
        t.description,
        format_amount(t.amount_minor, &t.currency)
    )
}

fn format_summary(s: &SpendingSummary) -> String {
    format!(
        "You've logged {} transaction{} {} for a total of {}.",
        s.totals.count,
        if s.totals.count == 1 { "" } else { "s" },
        s.window.label(),
        format_minor(s.totals.total_minor)
    )
}

fn format_amount(amount_minor: i64, currency: &str) -> String {
    format!("{} {currency}", format_minor(amount_minor))
}

fn format_minor(amount_minor: i64) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_render_in_major_units() {
        assert_eq!(format_minor(1_250), "12.50");
        assert_eq!(format_minor(5), "0.05");
        assert_eq!(format_minor(-307), "-3.07");
    }
}
