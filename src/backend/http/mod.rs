pub mod auth;

pub use auth::AuthStrategy;

use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::RetryTransientMiddleware;
use reqwest_retry::policies::ExponentialBackoff;
use std::time::Duration;

use crate::backend::error::BackendError;

#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Whole-request timeout for JSON calls. Streaming calls are bounded by
    /// the reply idle timeout instead.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_retries: u32,
    pub retry_min_delay: Duration,
    pub retry_max_delay: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_min_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(30),
            user_agent: Some(concat!("digidoc/", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

impl HttpConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub const fn without_retries(mut self) -> Self {
        self.max_retries = 0;
        self
    }
}

#[derive(Clone)]
pub struct HttpClient {
    inner: ClientWithMiddleware,
    plain: Client,
    config: HttpConfig,
}

impl HttpClient {
    pub fn with_config(config: HttpConfig) -> Result<Self, BackendError> {
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(config.retry_min_delay, config.retry_max_delay)
            .build_with_max_retries(config.max_retries);

        let mut builder = Client::builder().connect_timeout(config.connect_timeout);

        if let Some(ref ua) = config.user_agent {
            builder = builder.user_agent(ua);
        }

        let client = builder.build().map_err(|e| {
            BackendError::Configuration(format!("Failed to build HTTP client: {e}"))
        })?;

        let client_with_middleware = ClientBuilder::new(client.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client_with_middleware,
            plain: client,
            config,
        })
    }

    /// JSON request with the configured whole-request timeout.
    #[must_use]
    pub fn post_json(&self, url: &str, auth: &AuthStrategy) -> reqwest_middleware::RequestBuilder {
        auth.apply(self.inner.post(url))
            .timeout(self.config.timeout)
            .header("content-type", "application/json")
    }

    #[must_use]
    pub fn get(&self, url: &str, auth: &AuthStrategy) -> reqwest_middleware::RequestBuilder {
        auth.apply(self.inner.get(url)).timeout(self.config.timeout)
    }

    /// POST whose response body is consumed as a stream; no total timeout.
    #[must_use]
    pub fn post_streaming(
        &self,
        url: &str,
        auth: &AuthStrategy,
    ) -> reqwest_middleware::RequestBuilder {
        auth.apply(self.inner.post(url))
            .header("content-type", "application/json")
    }

    /// Multipart bodies cannot be cloned, so they skip the retry middleware.
    #[must_use]
    pub fn post_multipart(&self, url: &str, auth: &AuthStrategy) -> reqwest::RequestBuilder {
        auth.apply_plain(self.plain.post(url))
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
