use crate::backend::types::SessionToken;

#[derive(Clone)]
pub enum AuthStrategy {
    Bearer(SessionToken),
    None,
}

impl AuthStrategy {
    #[must_use]
    pub const fn bearer(token: SessionToken) -> Self {
        Self::Bearer(token)
    }

    #[must_use]
    pub fn from_token(token: Option<SessionToken>) -> Self {
        token.map_or(Self::None, Self::Bearer)
    }

    #[must_use]
    pub fn apply(
        &self,
        request: reqwest_middleware::RequestBuilder,
    ) -> reqwest_middleware::RequestBuilder {
        match self.header_value() {
            Some(value) => request.header("Authorization", value),
            None => request,
        }
    }

    /// Same as [`apply`](Self::apply) for requests that bypass the retry
    /// middleware (multipart uploads).
    #[must_use]
    pub fn apply_plain(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.header_value() {
            Some(value) => request.header("Authorization", value),
            None => request,
        }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        match self {
            Self::Bearer(token) => !token.is_empty(),
            Self::None => false,
        }
    }

    fn header_value(&self) -> Option<String> {
        match self {
            Self::Bearer(token) => Some(format!("Bearer {}", token.as_str())),
            Self::None => None,
        }
    }
}

impl std::fmt::Debug for AuthStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(token) => f.debug_tuple("Bearer").field(token).finish(),
            Self::None => write!(f, "None"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_auth() {
        let auth = AuthStrategy::bearer(SessionToken::new("test-session-token"));
        assert!(auth.is_configured());
        let debug = format!("{auth:?}");
        assert!(debug.contains("Bearer"));
        assert!(!debug.contains("test-session-token"));
    }

    #[test]
    fn test_no_auth() {
        let auth = AuthStrategy::from_token(None);
        assert!(!auth.is_configured());
        assert_eq!(format!("{auth:?}"), "None");
    }

    #[test]
    fn test_empty_token_not_configured() {
        let auth = AuthStrategy::bearer(SessionToken::new(""));
        assert!(!auth.is_configured());
    }

    #[test]
    fn test_plain_request_gets_header() {
        let auth = AuthStrategy::bearer(SessionToken::new("abc"));
        let request = auth
            .apply_plain(reqwest::Client::new().post("http://localhost/x"))
            .build()
            .expect("request");
        assert_eq!(
            request.headers().get("Authorization").and_then(|v| v.to_str().ok()),
            Some("Bearer abc")
        );
    }
}
