use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::backend::ChatBackend;
use super::chat_book::{ChatBook, TitleState};
use super::error::{ChatError, Result};
use super::events::{ChatEvent, ChatEventEmitter, ChatEventHandler};
use super::finalizer::Finalizer;
use super::ledger::{Ledger, LedgerStore};
use super::reply::{ReplyOutcome, ReplyStream, ReplyTarget};
use super::types::{Attachment, ChatId, ChatSession, Message, MessageId, ReplyRequest};

/// Knobs for how replies are driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyConfig {
    /// `None` waits on a silent stream forever.
    pub idle_timeout: Option<Duration>,
    /// Cancel the previous chat's reply when the user switches away.
    pub cancel_on_switch: bool,
    pub send_history: bool,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(60)),
            cancel_on_switch: false,
            send_history: true,
        }
    }
}

/// Result of one `send_message` round trip.
#[derive(Debug)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub user_message_id: MessageId,
    pub reply_id: MessageId,
    pub outcome: ReplyOutcome,
    pub title: Option<String>,
}

/// Replies streaming in one chat, all children of `token`.
#[derive(Default)]
struct InflightReplies {
    token: CancellationToken,
    live: usize,
}

/// Holds one reply's place in [`InflightReplies`] until dropped, including
/// when the `send_message` future itself is dropped.
struct ReplyScope<'a> {
    inflight: &'a Mutex<HashMap<ChatId, InflightReplies>>,
    chat_id: ChatId,
    parent: CancellationToken,
}

impl ReplyScope<'_> {
    fn child_token(&self) -> CancellationToken {
        self.parent.child_token()
    }
}

impl Drop for ReplyScope<'_> {
    fn drop(&mut self) {
        // a cancelled parent was already removed by `cancel`
        if self.parent.is_cancelled() {
            return;
        }
        let mut inflight = self.inflight.lock();
        if let Some(entry) = inflight.get_mut(&self.chat_id) {
            entry.live = entry.live.saturating_sub(1);
            if entry.live == 0 {
                inflight.remove(&self.chat_id);
            }
        }
    }
}

/// Entry point for everything the user can do in a chat window.
///
/// The controller owns the on-screen ledger, the sidebar and one
/// cancellation scope per chat. Each `send_message` call drives its own
/// reply; several can run at once, in the same chat or in different ones.
pub struct ChatController {
    backend: Arc<dyn ChatBackend>,
    config: ReplyConfig,
    events: Arc<ChatEventEmitter>,
    book: Arc<Mutex<ChatBook>>,
    ledger: Arc<LedgerStore>,
    finalizer: Finalizer,
    inflight: Mutex<HashMap<ChatId, InflightReplies>>,
    /// Bumped on every chat switch; a load that finishes under an older
    /// value is stale.
    switch_seq: Mutex<u64>,
}

impl ChatController {
    /// Starts on a fresh, empty chat that is not yet in the sidebar.
    #[must_use]
    pub fn new(backend: Arc<dyn ChatBackend>, config: ReplyConfig) -> Self {
        let events = Arc::new(ChatEventEmitter::new());
        let book = Arc::new(Mutex::new(ChatBook::new()));
        let ledger = Arc::new(LedgerStore::new(
            Ledger::new(ChatId::generate()),
            Arc::clone(&events),
        ));
        let finalizer = Finalizer::new(Arc::clone(&backend), Arc::clone(&book), Arc::clone(&events));

        Self {
            backend,
            config,
            events,
            book,
            ledger,
            finalizer,
            inflight: Mutex::new(HashMap::new()),
            switch_seq: Mutex::new(0),
        }
    }

    pub fn register_event_handler(&self, handler: Arc<dyn ChatEventHandler>) {
        self.events.add_handler(handler);
    }

    #[must_use]
    pub const fn config(&self) -> &ReplyConfig {
        &self.config
    }

    #[must_use]
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    #[must_use]
    pub fn current_chat(&self) -> ChatId {
        self.ledger.chat_id()
    }

    #[must_use]
    pub fn ledger(&self) -> Arc<Ledger> {
        self.ledger.snapshot()
    }

    #[must_use]
    pub fn sessions(&self) -> Vec<ChatSession> {
        self.book.lock().sessions()
    }

    #[must_use]
    pub fn title_state(&self, chat_id: &ChatId) -> TitleState {
        self.book.lock().title_state(chat_id)
    }

    /// Switches to a brand-new empty chat. It joins the sidebar with its
    /// first message.
    pub fn new_chat(&self) -> ChatId {
        let id = ChatId::generate();
        self.switch_to(Ledger::new(id.clone()));
        id
    }

    /// Switches to `chat_id` and loads its stored messages.
    ///
    /// A chat missing from the sidebar pulls the chat list first, so a
    /// stored title is known before the next reply could ask for one. A
    /// failed load leaves the chat empty. A load that completes after the
    /// user moved on is discarded.
    #[tracing::instrument(skip_all, fields(chat_id = %chat_id))]
    pub async fn select_chat(&self, chat_id: &ChatId) -> Arc<Ledger> {
        let seq = self.switch_to(Ledger::new(chat_id.clone()));

        let known = self.book.lock().contains(chat_id);
        if !known {
            if let Err(e) = self.refresh_chats().await {
                tracing::warn!(error = %e, "Failed to load chat list");
            }
        }

        let messages = match self.backend.chat_data(chat_id).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load chat");
                Vec::new()
            }
        };

        let current = self.switch_seq.lock();
        if *current == seq {
            // messages sent while loading stay after the stored ones
            self.ledger.prepend_loaded(chat_id, messages);
        } else {
            tracing::debug!("Discarding stale chat load");
        }
        drop(current);

        self.ledger.snapshot()
    }

    /// Merges the backend's chat list into the sidebar.
    pub async fn refresh_chats(&self) -> Result<Vec<ChatSession>> {
        let remote = self.backend.list_chats().await?;
        let mut book = self.book.lock();
        book.merge_remote(remote);
        Ok(book.sessions())
    }

    /// Cancels every reply still streaming in `chat_id`. Returns `false`
    /// when none is.
    pub fn cancel(&self, chat_id: &ChatId) -> bool {
        let Some(entry) = self.inflight.lock().remove(chat_id) else {
            return false;
        };
        tracing::info!(chat_id = %chat_id, live = entry.live, "Cancelling in-flight replies");
        entry.token.cancel();
        true
    }

    /// Sends a message in the current chat and drives the reply to its end.
    ///
    /// Transport failures are not errors here: they end in a
    /// [`ReplyOutcome::Failed`] with the failure notice on screen.
    #[tracing::instrument(skip_all)]
    pub async fn send_message(
        &self,
        text: impl Into<String>,
        attachment: Option<Attachment>,
    ) -> Result<SentMessage> {
        let text = text.into();
        if text.trim().is_empty() && attachment.is_none() {
            return Err(ChatError::InvalidState("Message is empty".to_string()));
        }
        if let Some(attachment) = &attachment {
            if !attachment.is_supported() {
                return Err(ChatError::Attachment(format!(
                    "{}: only PDF, PNG and JPEG files are accepted",
                    attachment.file_name
                )));
            }
        }

        let chat_id = self.ledger.chat_id();
        self.book.lock().ensure_session(&chat_id);

        let media = attachment.as_ref().map(|a| a.file_name.clone());
        let history = if self.config.send_history {
            self.ledger.snapshot().history()
        } else {
            Vec::new()
        };

        let user = Message::user(text.clone()).with_media(media.clone());
        let user_message_id = user.id;
        self.ledger.append(&chat_id, user.clone());
        if let Err(e) = self.backend.save_message(&chat_id, &user).await {
            tracing::warn!(chat_id = %chat_id, error = %e, "Failed to persist user message");
        }

        let reply = Message::pending_reply().with_media(media);
        let reply_id = reply.id;
        self.ledger.append(&chat_id, reply.clone());

        let request = match attachment {
            Some(attachment) => ReplyRequest::Image {
                chat_id: chat_id.clone(),
                prompt: text,
                attachment,
            },
            None => ReplyRequest::Text {
                chat_id: chat_id.clone(),
                query: text,
                history,
            },
        };

        let scope = self.begin_reply(&chat_id);
        let stream = ReplyStream::new(
            ReplyTarget::new(chat_id.clone(), reply_id),
            request.failure_text(),
        )
        .with_idle_timeout(self.config.idle_timeout)
        .with_cancellation(scope.child_token());

        let outcome = stream
            .run(self.backend.open_reply(request), self.ledger.as_ref())
            .await;
        drop(scope);
        self.events
            .emit_reply_finished(&chat_id, reply_id, outcome.phase());

        let title = match outcome.final_text() {
            Some(final_text) => {
                let finished = Message {
                    text: final_text.to_string(),
                    ..reply
                };
                self.finalizer
                    .finalize(&chat_id, &finished, outcome.is_completed())
                    .await
                    .title
            }
            None => None,
        };

        Ok(SentMessage {
            chat_id,
            user_message_id,
            reply_id,
            outcome,
            title,
        })
    }

    fn begin_reply(&self, chat_id: &ChatId) -> ReplyScope<'_> {
        let mut inflight = self.inflight.lock();
        let entry = inflight.entry(chat_id.clone()).or_default();
        entry.live += 1;
        ReplyScope {
            inflight: &self.inflight,
            chat_id: chat_id.clone(),
            parent: entry.token.clone(),
        }
    }

    fn switch_to(&self, ledger: Ledger) -> u64 {
        let previous = self.ledger.chat_id();
        let next = ledger.chat_id().clone();
        if self.config.cancel_on_switch && previous != next {
            self.cancel(&previous);
        }

        let seq = {
            let mut seq = self.switch_seq.lock();
            *seq += 1;
            self.ledger.replace(ledger);
            *seq
        };

        self.events.emit(&ChatEvent::ChatSwitched { chat_id: next });
        seq
    }
}

impl std::fmt::Debug for ChatController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatController")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("current_chat", &self.current_chat())
            .finish_non_exhaustive()
    }
}
