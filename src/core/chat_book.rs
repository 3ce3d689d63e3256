use chrono::Utc;
use std::collections::HashMap;

use super::types::{ChatId, ChatSession};

/// Where a chat stands with respect to automatic titling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TitleState {
    #[default]
    Untitled,
    /// A finalizer holds the claim and is waiting on the summarizer.
    Requesting,
    /// Terminal: never cleared.
    Generated,
}

#[derive(Debug, Clone)]
struct Entry {
    session: ChatSession,
    number: u32,
    title_state: TitleState,
}

/// Sidebar state: known chats, their placeholder numbers and title state.
///
/// Sessions are kept newest first. `next_number` feeds placeholder titles
/// and only advances when a chat enters the book for the first time.
#[derive(Debug, Clone)]
pub struct ChatBook {
    entries: Vec<Entry>,
    next_number: u32,
}

impl Default for ChatBook {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatBook {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_number: 1,
        }
    }

    #[must_use]
    pub fn sessions(&self) -> Vec<ChatSession> {
        self.entries.iter().map(|e| e.session.clone()).collect()
    }

    #[must_use]
    pub fn session(&self, id: &ChatId) -> Option<&ChatSession> {
        self.entry(id).map(|e| &e.session)
    }

    #[must_use]
    pub fn contains(&self, id: &ChatId) -> bool {
        self.entry(id).is_some()
    }

    #[must_use]
    pub const fn next_number(&self) -> u32 {
        self.next_number
    }

    /// Adds `id` at the top of the sidebar with a placeholder title unless it
    /// is already known. Returns `true` when the chat was added.
    pub fn ensure_session(&mut self, id: &ChatId) -> bool {
        if self.contains(id) {
            return false;
        }
        let entry = self.new_entry(id.clone());
        tracing::debug!(chat_id = %id, title = %entry.session.title, "Chat added to sidebar");
        self.entries.insert(0, entry);
        true
    }

    /// Merges the backend's chat list.
    ///
    /// A stored title that is non-empty and differs from the chat id counts
    /// as already generated. Local chats missing from the list are kept: they
    /// may not have reached the backend yet.
    pub fn merge_remote(&mut self, remote: Vec<ChatSession>) {
        for session in remote {
            let stored_title = session.title.trim();
            let has_title = !stored_title.is_empty() && stored_title != session.id.as_str();
            let title = has_title.then(|| stored_title.to_string());

            let index = match self.index_of(&session.id) {
                Some(index) => index,
                None => {
                    let entry = self.new_entry(session.id.clone());
                    self.entries.push(entry);
                    self.entries.len() - 1
                }
            };

            let entry = &mut self.entries[index];
            entry.session.timestamp = session.timestamp;
            if let Some(title) = title {
                entry.session.title = title;
                entry.title_state = TitleState::Generated;
            }
        }

        self.entries
            .sort_by(|a, b| b.session.timestamp.cmp(&a.session.timestamp));
    }

    /// Sets the display title. Returns `false` for an unknown chat.
    pub fn rename(&mut self, id: &ChatId, title: impl Into<String>) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.session.title = title.into();
                true
            }
            None => false,
        }
    }

    /// `Chat #N` for a known chat.
    #[must_use]
    pub fn placeholder_for(&self, id: &ChatId) -> Option<String> {
        self.entry(id).map(|e| placeholder(e.number))
    }

    /// Moves `Untitled -> Requesting`. Only the caller that gets `true` may
    /// ask for a title.
    pub fn claim_title(&mut self, id: &ChatId) -> bool {
        match self.entry_mut(id) {
            Some(entry) if entry.title_state == TitleState::Untitled => {
                entry.title_state = TitleState::Requesting;
                true
            }
            _ => false,
        }
    }

    /// Gives a claim back after a failed title request.
    pub fn release_title(&mut self, id: &ChatId) {
        if let Some(entry) = self.entry_mut(id) {
            if entry.title_state == TitleState::Requesting {
                entry.title_state = TitleState::Untitled;
            }
        }
    }

    pub fn mark_titled(&mut self, id: &ChatId) {
        if let Some(entry) = self.entry_mut(id) {
            entry.title_state = TitleState::Generated;
        }
    }

    #[must_use]
    pub fn title_state(&self, id: &ChatId) -> TitleState {
        self.entry(id).map(|e| e.title_state).unwrap_or_default()
    }

    fn new_entry(&mut self, id: ChatId) -> Entry {
        let number = self.next_number;
        self.next_number += 1;
        Entry {
            session: ChatSession {
                id,
                title: placeholder(number),
                timestamp: Utc::now(),
            },
            number,
            title_state: TitleState::Untitled,
        }
    }

    fn index_of(&self, id: &ChatId) -> Option<usize> {
        self.entries.iter().position(|e| e.session.id == *id)
    }

    fn entry(&self, id: &ChatId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.session.id == *id)
    }

    fn entry_mut(&mut self, id: &ChatId) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.session.id == *id)
    }
}

fn placeholder(number: u32) -> String {
    format!("Chat #{number}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn remote(id: &str, title: &str, minutes_ago: i64) -> ChatSession {
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        ChatSession {
            id: ChatId::new(id),
            title: title.to_string(),
            timestamp: base - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn new_chats_get_increasing_placeholders_newest_first() {
        let mut book = ChatBook::new();
        let a = ChatId::new("chat_a");
        let b = ChatId::new("chat_b");

        assert!(book.ensure_session(&a));
        assert!(book.ensure_session(&b));
        assert!(!book.ensure_session(&a));

        let titles: Vec<String> = book.sessions().into_iter().map(|s| s.title).collect();
        assert_eq!(titles, vec!["Chat #2", "Chat #1"]);
        assert_eq!(book.placeholder_for(&a).as_deref(), Some("Chat #1"));
        assert_eq!(book.next_number(), 3);
    }

    #[test]
    fn claim_is_exclusive_until_released() {
        let mut book = ChatBook::new();
        let id = ChatId::new("chat_a");
        book.ensure_session(&id);

        assert!(book.claim_title(&id));
        assert!(!book.claim_title(&id));
        assert_eq!(book.title_state(&id), TitleState::Requesting);

        book.release_title(&id);
        assert_eq!(book.title_state(&id), TitleState::Untitled);
        assert!(book.claim_title(&id));
    }

    #[test]
    fn generated_is_never_reclaimed_or_released() {
        let mut book = ChatBook::new();
        let id = ChatId::new("chat_a");
        book.ensure_session(&id);

        assert!(book.claim_title(&id));
        book.mark_titled(&id);
        book.release_title(&id);

        assert_eq!(book.title_state(&id), TitleState::Generated);
        assert!(!book.claim_title(&id));
    }

    #[test]
    fn unknown_chat_cannot_be_claimed_or_renamed() {
        let mut book = ChatBook::new();
        let id = ChatId::new("ghost");
        assert!(!book.claim_title(&id));
        assert!(!book.rename(&id, "title"));
        assert_eq!(book.title_state(&id), TitleState::Untitled);
        assert!(book.placeholder_for(&id).is_none());
    }

    #[test]
    fn merge_remote_marks_stored_titles_as_generated() {
        let mut book = ChatBook::new();
        book.merge_remote(vec![
            remote("chat_old", "Migraine triggers", 60),
            remote("chat_new", "chat_new", 5),
            remote("chat_blank", "", 30),
        ]);

        let ids: Vec<String> = book
            .sessions()
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(ids, vec!["chat_new", "chat_blank", "chat_old"]);

        let old = ChatId::new("chat_old");
        let new = ChatId::new("chat_new");
        assert_eq!(book.title_state(&old), TitleState::Generated);
        assert_eq!(
            book.session(&old).map(|s| s.title.as_str()),
            Some("Migraine triggers")
        );
        assert_eq!(book.title_state(&new), TitleState::Untitled);
        assert!(
            book.session(&new)
                .is_some_and(|s| s.title.starts_with("Chat #"))
        );
    }

    #[test]
    fn merge_remote_keeps_local_only_chats_and_numbers() {
        let mut book = ChatBook::new();
        let local = ChatId::new("chat_local");
        book.ensure_session(&local);

        book.merge_remote(vec![remote("chat_local", "", 0), remote("chat_x", "Rash", 10)]);
        book.merge_remote(vec![remote("chat_x", "Rash", 10)]);

        assert!(book.contains(&local));
        assert_eq!(book.placeholder_for(&local).as_deref(), Some("Chat #1"));
        assert_eq!(book.sessions().len(), 2);
        assert_eq!(book.next_number(), 3);
    }
}
