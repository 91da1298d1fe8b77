use async_trait::async_trait;

use super::models::MessageRef;
use crate::{ChatId, Result};

/// Outbound message-edit capability of the chat transport.
///
/// All operations are fallible; callers in this crate treat failures as
/// cosmetic (logged, never fatal).
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Post a new message, returning its location for later edits.
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageRef>;

    async fn edit_text(&self, target: &MessageRef, text: &str) -> Result<()>;

    async fn delete(&self, target: &MessageRef) -> Result<()>;
}
