use async_trait::async_trait;

use super::models::Intent;
use crate::{OwnerId, Result};

/// LLM-backed intent classification. Prompt content and model selection live
/// behind this seam; transforms here may call arbitrary external services.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, owner: OwnerId, text: &str) -> Result<Intent>;
}

/// Voice-note transcription seam.
#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    async fn transcribe(&self, file_id: &str) -> Result<String>;
}

/// Receipt-photo extraction seam.
#[async_trait]
pub trait ReceiptReader: Send + Sync {
    async fn extract(&self, file_id: &str, caption: Option<&str>) -> Result<String>;
}

/// Response cache keyed by `(owner, normalized input text)`.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, owner: OwnerId, key: &str) -> Result<Option<String>>;

    async fn put(&self, owner: OwnerId, key: &str, reply: &str) -> Result<()>;
}
