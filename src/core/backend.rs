use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

use super::types::{ChatId, ChatSession, Message, ReplyRequest};
use crate::backend::error::BackendError;

/// Raw reply body: opaque fragments in arrival order, no framing.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BackendError>> + Send>>;

/// Every remote call the chat core makes.
///
/// Implementations report failures as values; deciding which of them are
/// shown to the user, logged, or retried belongs to the caller.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Starts a reply and returns its body once the response head arrived
    /// with a success status.
    async fn open_reply(&self, request: ReplyRequest) -> Result<ByteStream, BackendError>;

    async fn save_message(&self, chat_id: &ChatId, message: &Message) -> Result<(), BackendError>;

    /// `Ok(None)` when the summarizer answered without a usable title.
    async fn generate_title(&self, response: &str) -> Result<Option<String>, BackendError>;

    async fn update_chat_title(&self, chat_id: &ChatId, title: &str) -> Result<(), BackendError>;

    async fn list_chats(&self) -> Result<Vec<ChatSession>, BackendError>;

    async fn chat_data(&self, chat_id: &ChatId) -> Result<Vec<Message>, BackendError>;
}
