use parking_lot::Mutex;
use std::sync::Arc;

use super::backend::ChatBackend;
use super::chat_book::ChatBook;
use super::events::ChatEventEmitter;
use super::types::{ChatId, Message};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeReport {
    pub persisted: bool,
    /// Title applied by this run, if any.
    pub title: Option<String>,
}

/// Work done once a reply reached a terminal phase.
///
/// The reply's final text is persisted, and for a successful non-blank
/// reply the chat gets a generated title unless it already has one. Every
/// remote failure here is logged and swallowed.
pub struct Finalizer {
    backend: Arc<dyn ChatBackend>,
    book: Arc<Mutex<ChatBook>>,
    events: Arc<ChatEventEmitter>,
}

impl Finalizer {
    #[must_use]
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        book: Arc<Mutex<ChatBook>>,
        events: Arc<ChatEventEmitter>,
    ) -> Self {
        Self {
            backend,
            book,
            events,
        }
    }

    #[tracing::instrument(
        name = "finalize",
        skip_all,
        fields(chat_id = %chat_id, message_id = %reply.id, completed = completed)
    )]
    pub async fn finalize(&self, chat_id: &ChatId, reply: &Message, completed: bool) -> FinalizeReport {
        let mut report = FinalizeReport::default();

        match self.backend.save_message(chat_id, reply).await {
            Ok(()) => report.persisted = true,
            Err(e) => tracing::warn!(error = %e, "Failed to persist reply"),
        }

        if !completed || reply.text.trim().is_empty() {
            return report;
        }

        if !self.book.lock().claim_title(chat_id) {
            tracing::debug!("Chat already titled or title in flight");
            return report;
        }

        let title = match self.backend.generate_title(&reply.text).await {
            Ok(Some(title)) if !title.trim().is_empty() => title.trim().to_string(),
            Ok(_) => {
                let placeholder = self.book.lock().placeholder_for(chat_id);
                let Some(placeholder) = placeholder else {
                    self.book.lock().release_title(chat_id);
                    return report;
                };
                placeholder
            }
            Err(e) => {
                tracing::warn!(error = %e, "Title generation failed");
                self.book.lock().release_title(chat_id);
                return report;
            }
        };

        {
            let mut book = self.book.lock();
            book.rename(chat_id, title.clone());
            book.mark_titled(chat_id);
        }
        tracing::info!(title = %title, "Chat titled");
        self.events.emit_title_changed(chat_id, title.clone());

        if let Err(e) = self.backend.update_chat_title(chat_id, &title).await {
            tracing::warn!(error = %e, "Failed to persist chat title");
        }

        report.title = Some(title);
        report
    }
}
