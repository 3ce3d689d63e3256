//! JSON bodies exchanged with the Digital Doctor backend.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct AskRequest<'a> {
    pub query: &'a str,
    pub chat_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryEntry<'a>>>,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry<'a> {
    pub role: &'a str,
    pub parts: &'a [String],
}

#[derive(Debug, Serialize)]
pub struct SaveMessageRequest<'a> {
    pub chat_id: &'a str,
    pub sender: &'a str,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<&'a str>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateTitleRequest<'a> {
    pub response: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct GenerateTitleResponse {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateTitleRequest<'a> {
    pub chat_id: &'a str,
    pub title: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatListResponse {
    #[serde(default)]
    pub chats: Vec<ChatEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ChatEntry {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub last_activity: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatDataResponse {
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}

#[derive(Debug, Deserialize)]
pub struct StoredMessage {
    pub sender: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub media: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// `GET /me`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MediaListResponse {
    #[serde(default)]
    pub media_files: Vec<MediaFile>,
}

/// One uploaded file, as listed by `GET /user/media`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MediaFile {
    pub name: String,
    pub chat_id: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ask_request_omits_missing_history() {
        let body = AskRequest {
            query: "fever",
            chat_id: "chat_1",
            history: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"query": "fever", "chat_id": "chat_1"}));
    }

    #[test]
    fn test_chat_list_tolerates_null_title() {
        let body = r#"{"chats": [{"id": "chat_1", "title": null, "last_activity": "2025-01-02T03:04:05Z"}]}"#;
        let parsed: ChatListResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.chats.len(), 1);
        assert!(parsed.chats[0].title.is_none());
    }

    #[test]
    fn test_profile_with_missing_fields() {
        let parsed: Profile = serde_json::from_str(r#"{"id": "u1", "name": "Asha"}"#).unwrap();
        assert_eq!(parsed.name.as_deref(), Some("Asha"));
        assert!(parsed.email.is_none());
    }
}
