use parking_lot::RwLock;
use std::sync::Arc;

use super::events::{ChatEvent, ChatEventEmitter};
use super::reply::{ReplySink, ReplyTarget};
use super::types::{ChatId, HistoryTurn, Message, MessageId};

/// Messages of the conversation currently on screen.
///
/// A `Ledger` is an immutable value: every change produces a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    chat_id: ChatId,
    messages: Vec<Message>,
}

impl Ledger {
    #[must_use]
    pub const fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            messages: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_messages(chat_id: ChatId, messages: Vec<Message>) -> Self {
        Self { chat_id, messages }
    }

    #[must_use]
    pub const fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: MessageId) -> bool {
        self.message(id).is_some()
    }

    #[must_use]
    pub fn with_message(&self, message: Message) -> Self {
        let mut messages = self.messages.clone();
        messages.push(message);
        Self {
            chat_id: self.chat_id.clone(),
            messages,
        }
    }

    /// Copy of the ledger with `id`'s text replaced. An unknown id yields an
    /// unchanged copy: late updates for a message that was switched away
    /// from are dropped here.
    #[must_use]
    pub fn update_message_text(&self, id: MessageId, text: impl Into<String>) -> Self {
        let mut next = self.clone();
        if let Some(message) = next.messages.iter_mut().find(|m| m.id == id) {
            message.text = text.into();
        }
        next
    }

    /// Prior turns to send along with a new question.
    #[must_use]
    pub fn history(&self) -> Vec<HistoryTurn> {
        self.messages
            .iter()
            .filter(|m| !m.text.trim().is_empty() && !m.is_failure_notice())
            .map(HistoryTurn::from_message)
            .collect()
    }
}

/// Shared holder of the current [`Ledger`].
///
/// Writers replace the whole value under a short write lock; readers get a
/// cheap `Arc` snapshot that never changes underneath them.
pub struct LedgerStore {
    current: RwLock<Arc<Ledger>>,
    events: Arc<ChatEventEmitter>,
}

impl LedgerStore {
    #[must_use]
    pub fn new(ledger: Ledger, events: Arc<ChatEventEmitter>) -> Self {
        Self {
            current: RwLock::new(Arc::new(ledger)),
            events,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<Ledger> {
        Arc::clone(&self.current.read())
    }

    #[must_use]
    pub fn chat_id(&self) -> ChatId {
        self.current.read().chat_id.clone()
    }

    pub fn replace(&self, ledger: Ledger) {
        *self.current.write() = Arc::new(ledger);
    }

    /// Puts stored messages in front of whatever the ledger for `chat_id`
    /// gained while they were loading. Read and write happen under one lock,
    /// so no concurrent append or reply update is lost.
    pub fn prepend_loaded(&self, chat_id: &ChatId, loaded: Vec<Message>) -> bool {
        let mut current = self.current.write();
        if current.chat_id != *chat_id {
            return false;
        }
        let mut messages = loaded;
        messages.extend(current.messages.iter().cloned());
        *current = Arc::new(Ledger::with_messages(chat_id.clone(), messages));
        true
    }

    /// Appends to the ledger if it still shows `chat_id`.
    pub fn append(&self, chat_id: &ChatId, message: Message) -> bool {
        let mut current = self.current.write();
        if current.chat_id != *chat_id {
            return false;
        }
        *current = Arc::new(current.with_message(message));
        true
    }

    /// Sets a reply's text. Returns `false`, changing nothing, when the
    /// target is not part of the ledger on screen.
    pub fn apply_reply_text(&self, target: &ReplyTarget, text: &str) -> bool {
        {
            let mut current = self.current.write();
            if current.chat_id != target.chat_id || !current.contains(target.message_id) {
                tracing::trace!(
                    chat_id = %target.chat_id,
                    message_id = %target.message_id,
                    "Dropping reply update for message not on screen"
                );
                return false;
            }
            *current = Arc::new(current.update_message_text(target.message_id, text));
        }

        self.events.emit(&ChatEvent::ReplyUpdated {
            chat_id: target.chat_id.clone(),
            message_id: target.message_id,
            text: text.to_string(),
        });
        true
    }
}

impl ReplySink for LedgerStore {
    fn on_text(&self, target: &ReplyTarget, text: &str) {
        self.apply_reply_text(target, text);
    }
}

impl std::fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStore")
            .field("current", &self.current.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::EventLog;
    use crate::core::types::{Sender, TEXT_REPLY_FAILURE};

    fn ledger_with_reply() -> (Ledger, MessageId) {
        let reply = Message::pending_reply();
        let id = reply.id;
        let ledger = Ledger::new(ChatId::new("chat_1"))
            .with_message(Message::user("I have a sore throat"))
            .with_message(reply);
        (ledger, id)
    }

    #[test]
    fn update_replaces_only_the_target() {
        let (ledger, id) = ledger_with_reply();
        let updated = ledger.update_message_text(id, "Gargle with warm salt water.");

        assert_eq!(updated.messages().len(), 2);
        assert_eq!(updated.messages()[0], ledger.messages()[0]);
        assert_eq!(
            updated.message(id).map(|m| m.text.as_str()),
            Some("Gargle with warm salt water.")
        );
        // the original value is untouched
        assert_eq!(ledger.message(id).map(|m| m.text.as_str()), Some(""));
    }

    #[test]
    fn update_of_missing_id_is_a_noop() {
        let (ledger, _) = ledger_with_reply();
        let updated = ledger.update_message_text(MessageId::new(), "stray");
        assert_eq!(updated, ledger);
    }

    #[test]
    fn history_skips_blank_and_failed_messages() {
        let ledger = Ledger::new(ChatId::new("chat_1"))
            .with_message(Message::user("first question"))
            .with_message(Message::new(Sender::Bot, TEXT_REPLY_FAILURE))
            .with_message(Message::user("second question"))
            .with_message(Message::new(Sender::Bot, "an answer"))
            .with_message(Message::pending_reply());

        let history = ledger.history();
        let roles: Vec<&str> = history.iter().map(|t| t.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "user", "model"]);
        assert_eq!(history[2].parts, vec!["an answer".to_string()]);
    }

    #[test]
    fn store_applies_and_emits_for_visible_target() {
        let events = Arc::new(ChatEventEmitter::new());
        let log = Arc::new(EventLog::new());
        events.add_handler(log.clone());

        let (ledger, id) = ledger_with_reply();
        let store = LedgerStore::new(ledger, events);
        let target = ReplyTarget::new(ChatId::new("chat_1"), id);

        assert!(store.apply_reply_text(&target, "Gargle"));
        assert_eq!(
            store.snapshot().message(id).map(|m| m.text.clone()),
            Some("Gargle".to_string())
        );
        assert_eq!(log.snapshots_for(id), vec!["Gargle"]);
    }

    #[test]
    fn store_ignores_other_chats_and_unknown_messages() {
        let events = Arc::new(ChatEventEmitter::new());
        let log = Arc::new(EventLog::new());
        events.add_handler(log.clone());

        let (ledger, id) = ledger_with_reply();
        let store = LedgerStore::new(ledger.clone(), events);

        let wrong_chat = ReplyTarget::new(ChatId::new("chat_2"), id);
        let unknown = ReplyTarget::new(ChatId::new("chat_1"), MessageId::new());

        assert!(!store.apply_reply_text(&wrong_chat, "leak"));
        assert!(!store.apply_reply_text(&unknown, "stray"));
        assert_eq!(*store.snapshot(), ledger);
        assert!(log.events().is_empty());
    }

    #[test]
    fn snapshots_are_stable_across_updates() {
        let (ledger, id) = ledger_with_reply();
        let store = LedgerStore::new(ledger, Arc::new(ChatEventEmitter::new()));

        let before = store.snapshot();
        store.apply_reply_text(&ReplyTarget::new(ChatId::new("chat_1"), id), "new");
        assert_eq!(before.message(id).map(|m| m.text.as_str()), Some(""));
    }

    #[test]
    fn append_and_replace_respect_current_chat() {
        let store = LedgerStore::new(
            Ledger::new(ChatId::new("chat_1")),
            Arc::new(ChatEventEmitter::new()),
        );

        assert!(!store.append(&ChatId::new("chat_2"), Message::user("wrong chat")));
        assert!(store.append(&ChatId::new("chat_1"), Message::user("right chat")));
        assert_eq!(store.snapshot().messages().len(), 1);

        store.replace(Ledger::new(ChatId::new("chat_2")));
        assert_eq!(store.chat_id(), ChatId::new("chat_2"));
        assert!(store.snapshot().messages().is_empty());
    }

    #[test]
    fn prepend_loaded_keeps_updates_made_during_the_load() {
        let (ledger, id) = ledger_with_reply();
        let store = LedgerStore::new(ledger, Arc::new(ChatEventEmitter::new()));
        let chat_id = ChatId::new("chat_1");

        // the reply fails while the stored messages are still in flight
        store.apply_reply_text(&ReplyTarget::new(chat_id.clone(), id), TEXT_REPLY_FAILURE);

        let stored = vec![
            Message::user("Earlier question"),
            Message::new(Sender::Bot, "Earlier answer"),
        ];
        assert!(store.prepend_loaded(&chat_id, stored));

        let snapshot = store.snapshot();
        let texts: Vec<&str> = snapshot.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "Earlier question",
                "Earlier answer",
                "I have a sore throat",
                TEXT_REPLY_FAILURE
            ]
        );
        assert!(!store.prepend_loaded(&ChatId::new("chat_2"), vec![Message::user("other")]));
        assert_eq!(store.snapshot().messages().len(), 4);
    }
}
