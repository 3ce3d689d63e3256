use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use super::wire::{AskRequest, ChatEntry, HistoryEntry, SaveMessageRequest, StoredMessage};
use crate::core::types::{ChatId, ChatSession, HistoryTurn, Message, Sender};

pub fn to_ask_request<'a>(
    chat_id: &'a ChatId,
    query: &'a str,
    history: &'a [HistoryTurn],
) -> AskRequest<'a> {
    let history = (!history.is_empty()).then(|| {
        history
            .iter()
            .map(|turn| HistoryEntry {
                role: &turn.role,
                parts: &turn.parts,
            })
            .collect()
    });

    AskRequest {
        query: query.trim(),
        chat_id: chat_id.as_str(),
        history,
    }
}

pub fn to_save_request<'a>(chat_id: &'a ChatId, message: &'a Message) -> SaveMessageRequest<'a> {
    SaveMessageRequest {
        chat_id: chat_id.as_str(),
        sender: message.sender.as_str(),
        text: &message.text,
        media: message.media.as_deref(),
        timestamp: message
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

pub fn from_chat_entry(entry: ChatEntry) -> ChatSession {
    let timestamp = entry
        .last_activity
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now);

    ChatSession {
        id: ChatId::new(entry.id),
        title: entry.title.unwrap_or_default(),
        timestamp,
    }
}

/// Messages with an unknown sender are skipped.
pub fn from_stored_message(stored: StoredMessage) -> Option<Message> {
    let sender = match stored.sender.as_str() {
        "user" => Sender::User,
        "bot" => Sender::Bot,
        other => {
            tracing::debug!(sender = other, "Skipping stored message with unknown sender");
            return None;
        }
    };

    let mut message = Message::new(sender, stored.text.unwrap_or_default()).with_media(stored.media);
    if let Some(timestamp) = stored.timestamp.as_deref().and_then(parse_timestamp) {
        message = message.with_timestamp(timestamp);
    }
    Some(message)
}

/// Accepts RFC 3339 and naive ISO 8601 (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
