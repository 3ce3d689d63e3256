use parking_lot::RwLock;
use std::sync::Arc;

use super::reply::ReplyPhase;
use super::types::{ChatId, MessageId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// New snapshot of a reply that is visible in the current ledger.
    ReplyUpdated {
        chat_id: ChatId,
        message_id: MessageId,
        text: String,
    },
    ReplyFinished {
        chat_id: ChatId,
        message_id: MessageId,
        phase: ReplyPhase,
    },
    TitleChanged {
        chat_id: ChatId,
        title: String,
    },
    ChatSwitched {
        chat_id: ChatId,
    },
}

pub trait ChatEventHandler: Send + Sync {
    fn handle(&self, event: &ChatEvent);
}

/// Fans events out to every registered handler, synchronously and in
/// emission order.
#[derive(Default)]
pub struct ChatEventEmitter {
    handlers: RwLock<Vec<Arc<dyn ChatEventHandler>>>,
}

impl ChatEventEmitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&self, handler: Arc<dyn ChatEventHandler>) {
        self.handlers.write().push(handler);
    }

    pub fn emit(&self, event: &ChatEvent) {
        for handler in self.handlers.read().iter() {
            handler.handle(event);
        }
    }

    pub fn emit_title_changed(&self, chat_id: &ChatId, title: impl Into<String>) {
        self.emit(&ChatEvent::TitleChanged {
            chat_id: chat_id.clone(),
            title: title.into(),
        });
    }

    pub fn emit_reply_finished(&self, chat_id: &ChatId, message_id: MessageId, phase: ReplyPhase) {
        self.emit(&ChatEvent::ReplyFinished {
            chat_id: chat_id.clone(),
            message_id,
            phase,
        });
    }
}

impl std::fmt::Debug for ChatEventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatEventEmitter")
            .field("handlers", &self.handlers.read().len())
            .finish()
    }
}

/// Handler that keeps every event; used by tests and by `digidoc ask`.
#[derive(Debug, Default)]
pub struct EventLog {
    events: parking_lot::Mutex<Vec<ChatEvent>>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<ChatEvent> {
        self.events.lock().clone()
    }

    /// Reply snapshots observed for one message, in order.
    #[must_use]
    pub fn snapshots_for(&self, message_id: MessageId) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ChatEvent::ReplyUpdated {
                    message_id: id,
                    text,
                    ..
                } if *id == message_id => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ChatEventHandler for EventLog {
    fn handle(&self, event: &ChatEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitter_delivers_in_order_to_all_handlers() {
        let first = Arc::new(EventLog::new());
        let second = Arc::new(EventLog::new());
        let emitter = ChatEventEmitter::new();
        emitter.add_handler(first.clone());
        emitter.add_handler(second.clone());

        let chat_id = ChatId::new("chat_a");
        let message_id = MessageId::new();
        emitter.emit(&ChatEvent::ReplyUpdated {
            chat_id: chat_id.clone(),
            message_id,
            text: "Hi".into(),
        });
        emitter.emit_reply_finished(&chat_id, message_id, ReplyPhase::Completed);
        emitter.emit_title_changed(&chat_id, "Headache advice");

        assert_eq!(first.events(), second.events());
        let events = first.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], ChatEvent::ReplyUpdated { text, .. } if text == "Hi"));
        assert!(matches!(
            &events[1],
            ChatEvent::ReplyFinished {
                phase: ReplyPhase::Completed,
                ..
            }
        ));
        assert!(matches!(&events[2], ChatEvent::TitleChanged { title, .. } if title == "Headache advice"));
    }

    #[test]
    fn test_snapshots_for_filters_by_message() {
        let log = EventLog::new();
        let chat_id = ChatId::new("chat_a");
        let mine = MessageId::new();
        let other = MessageId::new();

        for (id, text) in [(mine, "a"), (other, "x"), (mine, "ab")] {
            log.handle(&ChatEvent::ReplyUpdated {
                chat_id: chat_id.clone(),
                message_id: id,
                text: text.into(),
            });
        }

        assert_eq!(log.snapshots_for(mine), vec!["a", "ab"]);
        assert_eq!(log.snapshots_for(other), vec!["x"]);
    }
}
