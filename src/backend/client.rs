use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::convert;
use super::error::BackendError;
use super::http::{AuthStrategy, HttpClient, HttpConfig};
use super::types::{BaseUrl, SessionToken};
use super::wire::{
    ChatDataResponse, ChatListResponse, GenerateTitleRequest, GenerateTitleResponse, LoginRequest,
    MediaFile, MediaListResponse, Profile, TokenResponse, UpdateTitleRequest,
};
use crate::core::backend::{ByteStream, ChatBackend};
use crate::core::types::{Attachment, ChatId, ChatSession, HistoryTurn, Message, ReplyRequest};

/// HTTP client for the Digital Doctor FastAPI backend.
#[derive(Clone)]
pub struct DigidocClient {
    http: HttpClient,
    base_url: BaseUrl,
    auth: AuthStrategy,
}

impl std::fmt::Debug for DigidocClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigidocClient")
            .field("base_url", &self.base_url)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl DigidocClient {
    pub fn new(base_url: impl Into<BaseUrl>, token: Option<SessionToken>) -> Result<Self, BackendError> {
        Self::with_http_config(base_url, token, HttpConfig::default())
    }

    pub fn with_http_config(
        base_url: impl Into<BaseUrl>,
        token: Option<SessionToken>,
        http_config: HttpConfig,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            http: HttpClient::with_config(http_config)?,
            base_url: base_url.into(),
            auth: AuthStrategy::from_token(token),
        })
    }

    #[must_use]
    pub const fn base_url(&self) -> &BaseUrl {
        &self.base_url
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.auth.is_configured()
    }

    /// Exchanges credentials for a session token.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionToken, BackendError> {
        let body = to_body(&LoginRequest { email, password })?;
        let response = self
            .http
            .post_json(&self.url("/login"), &AuthStrategy::None)
            .body(body)
            .send()
            .await?;
        let token: TokenResponse = read_json(response).await?;
        SessionToken::from_optional(Some(&token.access_token))
            .ok_or_else(|| BackendError::ParseError("Login returned an empty token".to_string()))
    }

    /// The backend keeps no session state; this only validates the token.
    pub async fn logout(&self) -> Result<(), BackendError> {
        let response = self
            .http
            .post_json(&self.url("/logout"), &self.auth)
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }

    pub async fn profile(&self) -> Result<Profile, BackendError> {
        let response = self.http.get(&self.url("/me"), &self.auth).send().await?;
        read_json(response).await
    }

    /// Files uploaded across all chats, newest first.
    pub async fn media(&self) -> Result<Vec<MediaFile>, BackendError> {
        let response = self
            .http
            .get(&self.url("/user/media"), &self.auth)
            .send()
            .await?;
        let list: MediaListResponse = read_json(response).await?;
        Ok(list.media_files)
    }

    fn url(&self, path: &str) -> String {
        self.base_url.join(path)
    }

    async fn open_text_reply(
        &self,
        chat_id: &ChatId,
        query: &str,
        history: &[HistoryTurn],
    ) -> Result<reqwest::Response, BackendError> {
        let body = to_body(&convert::to_ask_request(chat_id, query, history))?;
        let response = self
            .http
            .post_streaming(&self.url("/ask_a"), &self.auth)
            .body(body)
            .send()
            .await?;
        check_status(response).await
    }

    async fn open_image_reply(
        &self,
        chat_id: &ChatId,
        prompt: String,
        attachment: Attachment,
    ) -> Result<reqwest::Response, BackendError> {
        let mut file = Part::bytes(attachment.bytes.to_vec()).file_name(attachment.file_name);
        if let Some(mime) = attachment.mime_type.as_deref() {
            file = file
                .mime_str(mime)
                .map_err(|e| BackendError::InvalidRequest(e.to_string()))?;
        }
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("prompt", prompt)
            .part("file", file);

        let response = self
            .http
            .post_multipart(&self.url("/process-image"), &self.auth)
            .multipart(form)
            .send()
            .await?;
        check_status(response).await
    }
}

#[async_trait]
impl ChatBackend for DigidocClient {
    fn name(&self) -> &'static str {
        "digidoc"
    }

    async fn open_reply(&self, request: ReplyRequest) -> Result<ByteStream, BackendError> {
        let response = match request {
            ReplyRequest::Text {
                chat_id,
                query,
                history,
            } => self.open_text_reply(&chat_id, &query, &history).await?,
            ReplyRequest::Image {
                chat_id,
                prompt,
                attachment,
            } => self.open_image_reply(&chat_id, prompt, attachment).await?,
        };

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| BackendError::StreamError(e.to_string())));
        Ok(Box::pin(body))
    }

    async fn save_message(&self, chat_id: &ChatId, message: &Message) -> Result<(), BackendError> {
        let body = to_body(&convert::to_save_request(chat_id, message))?;
        let response = self
            .http
            .post_json(&self.url("/save-message"), &self.auth)
            .body(body)
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }

    async fn generate_title(&self, response: &str) -> Result<Option<String>, BackendError> {
        let body = to_body(&GenerateTitleRequest { response })?;
        let reply = self
            .http
            .post_json(&self.url("/generate-title"), &self.auth)
            .body(body)
            .send()
            .await?;
        let parsed: GenerateTitleResponse = read_json(reply).await?;
        Ok(parsed
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()))
    }

    async fn update_chat_title(&self, chat_id: &ChatId, title: &str) -> Result<(), BackendError> {
        let body = to_body(&UpdateTitleRequest {
            chat_id: chat_id.as_str(),
            title,
        })?;
        let response = self
            .http
            .post_json(&self.url("/update-chat-title"), &self.auth)
            .body(body)
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }

    async fn list_chats(&self) -> Result<Vec<ChatSession>, BackendError> {
        let response = self.http.get(&self.url("/chats"), &self.auth).send().await?;
        let list: ChatListResponse = read_json(response).await?;
        Ok(list.chats.into_iter().map(convert::from_chat_entry).collect())
    }

    async fn chat_data(&self, chat_id: &ChatId) -> Result<Vec<Message>, BackendError> {
        let url = self.url(&format!("/chat-data/{chat_id}"));
        let response = self.http.get(&url, &self.auth).send().await?;
        let data: ChatDataResponse = read_json(response).await?;
        Ok(data
            .messages
            .into_iter()
            .filter_map(convert::from_stored_message)
            .collect())
    }
}

fn to_body<T: Serialize>(value: &T) -> Result<String, BackendError> {
    serde_json::to_string(value).map_err(|e| BackendError::InvalidRequest(e.to_string()))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::debug!(status = status.as_u16(), body = %body, "Backend returned an error");
    Err(BackendError::from_status(status.as_u16(), &body))
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
    let response = check_status(response).await?;
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| BackendError::ParseError(e.to_string()))
}
