use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Shown in place of a text reply whose transport failed.
pub const TEXT_REPLY_FAILURE: &str =
    "Error generating a response, check your internet connection.";

/// Shown in place of an image reply whose transport failed.
pub const IMAGE_REPLY_FAILURE: &str = "Sorry, there was an error processing the image.";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    /// Client-side id, assigned before the backend has seen the chat.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("chat_{}", Uuid::new_v4().simple()))
    }

    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
        }
    }

    /// Role name the backend's model expects in conversation history.
    #[must_use]
    pub const fn history_role(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    pub media: Option<String>,
}

impl Message {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    /// Empty bot message that a reply stream will fill in.
    #[must_use]
    pub fn pending_reply() -> Self {
        Self::new(Sender::Bot, String::new())
    }

    #[must_use]
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            text: text.into(),
            sender,
            timestamp: Utc::now(),
            media: None,
        }
    }

    #[must_use]
    pub fn with_media(mut self, media: Option<String>) -> Self {
        self.media = media;
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn is_failure_notice(&self) -> bool {
        self.sender == Sender::Bot
            && (self.text == TEXT_REPLY_FAILURE || self.text == IMAGE_REPLY_FAILURE)
    }
}

/// Sidebar entry for a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    pub id: ChatId,
    pub title: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub parts: Vec<String>,
}

impl HistoryTurn {
    #[must_use]
    pub fn from_message(message: &Message) -> Self {
        Self {
            role: message.sender.history_role().to_string(),
            parts: vec![message.text.clone()],
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Bytes,
    pub mime_type: Option<String>,
}

impl Attachment {
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let file_name = file_name.into();
        let mime_type = guess_mime(&file_name).map(str::to_string);
        Self {
            file_name,
            bytes: bytes.into(),
            mime_type,
        }
    }

    /// The backend accepts PDFs and PNG or JPEG images.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        matches!(
            self.mime_type.as_deref(),
            Some("application/pdf" | "image/png" | "image/jpeg")
        )
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

fn guess_mime(file_name: &str) -> Option<&'static str> {
    let ext = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "pdf" => Some("application/pdf"),
        "txt" => Some("text/plain"),
        _ => None,
    }
}

/// The two endpoint shapes that produce a streamed reply.
#[derive(Debug, Clone)]
pub enum ReplyRequest {
    Text {
        chat_id: ChatId,
        query: String,
        history: Vec<HistoryTurn>,
    },
    Image {
        chat_id: ChatId,
        prompt: String,
        attachment: Attachment,
    },
}

impl ReplyRequest {
    #[must_use]
    pub const fn chat_id(&self) -> &ChatId {
        match self {
            Self::Text { chat_id, .. } | Self::Image { chat_id, .. } => chat_id,
        }
    }

    #[must_use]
    pub const fn failure_text(&self) -> &'static str {
        match self {
            Self::Text { .. } => TEXT_REPLY_FAILURE,
            Self::Image { .. } => IMAGE_REPLY_FAILURE,
        }
    }

    #[must_use]
    pub fn media(&self) -> Option<&str> {
        match self {
            Self::Text { .. } => None,
            Self::Image { attachment, .. } => Some(&attachment.file_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_chat_ids_are_unique() {
        let a = ChatId::generate();
        let b = ChatId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("chat_"));
    }

    #[test]
    fn test_sender_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Sender::Bot).unwrap(), "\"bot\"");
        let parsed: Sender = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(parsed, Sender::User);
    }

    #[test]
    fn test_history_turn_uses_model_role_for_bot() {
        let turn = HistoryTurn::from_message(&Message::new(Sender::Bot, "Rest well."));
        assert_eq!(turn.role, "model");
        assert_eq!(turn.parts, vec!["Rest well.".to_string()]);
    }

    #[test]
    fn test_failure_notice_detection() {
        assert!(Message::new(Sender::Bot, TEXT_REPLY_FAILURE).is_failure_notice());
        assert!(Message::new(Sender::Bot, IMAGE_REPLY_FAILURE).is_failure_notice());
        assert!(!Message::new(Sender::User, TEXT_REPLY_FAILURE).is_failure_notice());
        assert!(!Message::new(Sender::Bot, "fine").is_failure_notice());
    }

    #[test]
    fn test_reply_request_sentinel_per_shape() {
        let chat_id = ChatId::new("chat_1");
        let text = ReplyRequest::Text {
            chat_id: chat_id.clone(),
            query: "fever".into(),
            history: Vec::new(),
        };
        let image = ReplyRequest::Image {
            chat_id,
            prompt: "what is this rash".into(),
            attachment: Attachment::new("rash.JPG", vec![1, 2, 3]),
        };

        assert_eq!(text.failure_text(), TEXT_REPLY_FAILURE);
        assert_eq!(image.failure_text(), IMAGE_REPLY_FAILURE);
        assert_eq!(text.media(), None);
        assert_eq!(image.media(), Some("rash.JPG"));
    }

    #[test]
    fn test_attachment_mime_guess_and_debug() {
        let attachment = Attachment::new("scan.pdf", vec![0u8; 2048]);
        assert_eq!(attachment.mime_type.as_deref(), Some("application/pdf"));
        let debug = format!("{attachment:?}");
        assert!(debug.contains("len: 2048"));

        assert!(Attachment::new("notes", Vec::new()).mime_type.is_none());
    }

    #[test]
    fn test_supported_attachments() {
        assert!(Attachment::new("xray.JPEG", vec![1]).is_supported());
        assert!(Attachment::new("labs.pdf", vec![1]).is_supported());
        assert!(!Attachment::new("clip.gif", vec![1]).is_supported());
        assert!(!Attachment::new("notes", vec![1]).is_supported());
    }
}
