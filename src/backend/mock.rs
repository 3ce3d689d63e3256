#![allow(clippy::expect_used)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::BackendError;
use crate::core::backend::{ByteStream, ChatBackend};
use crate::core::types::{ChatId, ChatSession, Message, ReplyRequest};

/// How a scripted reply ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEnding {
    Complete,
    /// Transport error after the scripted chunks.
    Fail(String),
    /// The response head never arrives.
    Refuse(String),
    /// The body stays open forever after the scripted chunks.
    Stall,
}

#[derive(Debug, Clone)]
pub struct MockReply {
    pub chunks: Vec<Bytes>,
    pub ending: MockEnding,
    pub delay: Option<Duration>,
}

impl MockReply {
    #[must_use]
    pub fn chunks<I, T>(chunks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            ending: MockEnding::Complete,
            delay: None,
        }
    }

    #[must_use]
    pub fn text(text: &str) -> Self {
        Self::chunks([text.to_string()])
    }

    #[must_use]
    pub fn refused(message: impl Into<String>) -> Self {
        Self {
            chunks: Vec::new(),
            ending: MockEnding::Refuse(message.into()),
            delay: None,
        }
    }

    #[must_use]
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.ending = MockEnding::Fail(message.into());
        self
    }

    #[must_use]
    pub fn then_stall(mut self) -> Self {
        self.ending = MockEnding::Stall;
        self
    }

    /// Sleep before each chunk.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn into_stream(self) -> ByteStream {
        let delay = self.delay;
        let mut items: Vec<Result<Bytes, BackendError>> =
            self.chunks.into_iter().map(Ok).collect();
        if let MockEnding::Fail(message) = &self.ending {
            items.push(Err(BackendError::StreamError(message.clone())));
        }

        let body = stream::iter(items).then(move |item| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            item
        });

        match self.ending {
            MockEnding::Stall => Box::pin(body.chain(stream::pending())),
            _ => Box::pin(body),
        }
    }
}

/// Scripted title-derivation answer.
#[derive(Debug, Clone)]
pub enum MockTitle {
    Title(Option<String>),
    Fail(String),
}

#[derive(Default)]
struct Recorded {
    replies: VecDeque<MockReply>,
    titles: VecDeque<MockTitle>,
    reply_requests: Vec<ReplyRequest>,
    saved: Vec<(ChatId, Message)>,
    title_requests: Vec<String>,
    title_updates: Vec<(ChatId, String)>,
}

/// In-memory [`ChatBackend`] driven by queued replies and titles.
///
/// Every call is recorded so tests can assert on what reached the backend.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<Recorded>>,
    chats: Arc<Mutex<Vec<ChatSession>>>,
    chat_data: Arc<Mutex<HashMap<ChatId, Vec<Message>>>>,
    fail_saves: bool,
    title_delay: Option<Duration>,
    load_delay: Option<Duration>,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_reply(self, reply: MockReply) -> Self {
        self.push_reply(reply);
        self
    }

    #[must_use]
    pub fn with_title(self, title: MockTitle) -> Self {
        self.state
            .lock()
            .expect("MockBackend mutex poisoned")
            .titles
            .push_back(title);
        self
    }

    #[must_use]
    pub const fn with_failing_saves(mut self) -> Self {
        self.fail_saves = true;
        self
    }

    #[must_use]
    pub const fn with_title_delay(mut self, delay: Duration) -> Self {
        self.title_delay = Some(delay);
        self
    }

    #[must_use]
    pub const fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_chat(self, session: ChatSession, messages: Vec<Message>) -> Self {
        self.chat_data
            .lock()
            .expect("MockBackend mutex poisoned")
            .insert(session.id.clone(), messages);
        self.chats
            .lock()
            .expect("MockBackend mutex poisoned")
            .push(session);
        self
    }

    pub fn push_reply(&self, reply: MockReply) {
        self.state
            .lock()
            .expect("MockBackend mutex poisoned")
            .replies
            .push_back(reply);
    }

    #[must_use]
    pub fn reply_requests(&self) -> Vec<ReplyRequest> {
        self.lock().reply_requests.clone()
    }

    #[must_use]
    pub fn saved(&self) -> Vec<(ChatId, Message)> {
        self.lock().saved.clone()
    }

    /// Texts of saved messages for one chat, in save order.
    #[must_use]
    pub fn saved_texts(&self, chat_id: &ChatId) -> Vec<String> {
        self.lock()
            .saved
            .iter()
            .filter(|(id, _)| id == chat_id)
            .map(|(_, m)| m.text.clone())
            .collect()
    }

    #[must_use]
    pub fn title_requests(&self) -> Vec<String> {
        self.lock().title_requests.clone()
    }

    #[must_use]
    pub fn title_updates(&self) -> Vec<(ChatId, String)> {
        self.lock().title_updates.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.state.lock().expect("MockBackend mutex poisoned")
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn open_reply(&self, request: ReplyRequest) -> Result<ByteStream, BackendError> {
        let reply = {
            let mut state = self.lock();
            state.reply_requests.push(request);
            state.replies.pop_front()
        };

        let Some(reply) = reply else {
            return Err(BackendError::InvalidRequest(
                "MockBackend: no replies queued".to_string(),
            ));
        };

        if let MockEnding::Refuse(message) = &reply.ending {
            return Err(BackendError::Connection(message.clone()));
        }
        Ok(reply.into_stream())
    }

    async fn save_message(&self, chat_id: &ChatId, message: &Message) -> Result<(), BackendError> {
        if self.fail_saves {
            return Err(BackendError::server(500, "MockBackend: save failed"));
        }
        self.lock().saved.push((chat_id.clone(), message.clone()));
        Ok(())
    }

    async fn generate_title(&self, response: &str) -> Result<Option<String>, BackendError> {
        let scripted = {
            let mut state = self.lock();
            state.title_requests.push(response.to_string());
            state.titles.pop_front()
        };

        if let Some(delay) = self.title_delay {
            tokio::time::sleep(delay).await;
        }

        match scripted {
            Some(MockTitle::Title(title)) => Ok(title),
            Some(MockTitle::Fail(message)) => Err(BackendError::Unavailable(message)),
            None => Ok(None),
        }
    }

    async fn update_chat_title(&self, chat_id: &ChatId, title: &str) -> Result<(), BackendError> {
        self.lock()
            .title_updates
            .push((chat_id.clone(), title.to_string()));
        Ok(())
    }

    async fn list_chats(&self) -> Result<Vec<ChatSession>, BackendError> {
        Ok(self
            .chats
            .lock()
            .expect("MockBackend mutex poisoned")
            .clone())
    }

    async fn chat_data(&self, chat_id: &ChatId) -> Result<Vec<Message>, BackendError> {
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }
        self.chat_data
            .lock()
            .expect("MockBackend mutex poisoned")
            .get(chat_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("Chat {chat_id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_request() -> ReplyRequest {
        ReplyRequest::Text {
            chat_id: ChatId::new("chat_m"),
            query: "hello".into(),
            history: Vec::new(),
        }
    }

    async fn collect(mut body: ByteStream) -> Vec<Result<Bytes, BackendError>> {
        let mut items = Vec::new();
        while let Some(item) = body.next().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn test_replies_are_served_in_order_and_recorded() {
        let mock = MockBackend::new()
            .with_reply(MockReply::chunks(["a", "b"]))
            .with_reply(MockReply::text("second"));

        let first = collect(mock.open_reply(text_request()).await.unwrap()).await;
        let second = collect(mock.open_reply(text_request()).await.unwrap()).await;

        assert_eq!(first.len(), 2);
        assert_eq!(&second[0].as_ref().unwrap()[..], b"second");
        assert_eq!(mock.reply_requests().len(), 2);
        assert!(mock.open_reply(text_request()).await.is_err());
    }

    #[tokio::test]
    async fn test_failure_endings() {
        let mock = MockBackend::new()
            .with_reply(MockReply::chunks(["part"]).then_fail("reset"))
            .with_reply(MockReply::refused("no route"));

        let items = collect(mock.open_reply(text_request()).await.unwrap()).await;
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(BackendError::StreamError(_))));

        let refused = mock.open_reply(text_request()).await;
        assert!(matches!(refused, Err(BackendError::Connection(_))));
    }

    #[tokio::test]
    async fn test_titles_and_saves_are_recorded() {
        let mock = MockBackend::new()
            .with_title(MockTitle::Title(Some("Flu".into())))
            .with_title(MockTitle::Fail("down".into()));
        let chat_id = ChatId::new("chat_m");

        assert_eq!(mock.generate_title("x").await.unwrap(), Some("Flu".into()));
        assert!(mock.generate_title("y").await.is_err());
        assert_eq!(mock.generate_title("z").await.unwrap(), None);
        assert_eq!(mock.title_requests(), vec!["x", "y", "z"]);

        mock.save_message(&chat_id, &Message::user("hi")).await.unwrap();
        assert_eq!(mock.saved_texts(&chat_id), vec!["hi"]);

        let failing = MockBackend::new().with_failing_saves();
        assert!(failing.save_message(&chat_id, &Message::user("hi")).await.is_err());
    }
}
