pub mod persistence;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

use crate::backend::http::HttpConfig;
use crate::backend::types::{BaseUrl, SessionToken};
use crate::core::controller::ReplyConfig;

pub use persistence::{ConfigError, ConfigPatch, ConfigPersister, ConfigResult};

pub fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .map(|h| h.join("Library/Application Support/digidoc"))
    }

    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
            .map(|c| c.join("digidoc"))
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .map(|a| a.join("digidoc"))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .map(|h| h.join(".config/digidoc"))
    }
}

/// Settings read from `config.toml` and `DIGIDOC_*` environment variables.
///
/// Every key is optional; accessors fill in defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// `0` disables the idle timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_idle_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_on_switch: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_history: Option<bool>,
}

impl AppConfig {
    #[must_use]
    pub fn load() -> Self {
        Self::load_from(Self::get_config_path().as_deref())
    }

    /// Loads `path` (if it exists) with environment overrides on top.
    #[must_use]
    pub fn load_from(path: Option<&Path>) -> Self {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder = builder.add_source(Environment::with_prefix("DIGIDOC").try_parsing(true));

        builder
            .build()
            .and_then(Config::try_deserialize)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to load config, using defaults");
                Self::default()
            })
    }

    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        get_config_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn init_default() -> Result<PathBuf, io::Error> {
        let path = Self::get_config_path().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine config directory",
            )
        })?;
        Self::init_at(&path)?;
        Ok(path)
    }

    /// Writes the commented template to `path`, refusing to overwrite.
    pub fn init_at(path: &Path) -> Result<(), io::Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        if path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("Config file already exists at {}", path.display()),
            ));
        }

        fs::write(path, include_str!("config.template.toml"))
    }

    /// Applies command-line overrides.
    #[must_use]
    pub fn with_overrides(mut self, base_url: Option<String>, token: Option<String>) -> Self {
        if base_url.is_some() {
            self.base_url = base_url;
        }
        if token.is_some() {
            self.token = token;
        }
        self
    }

    #[must_use]
    pub fn base_url(&self) -> BaseUrl {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map_or_else(BaseUrl::default, BaseUrl::from)
    }

    #[must_use]
    pub fn token(&self) -> Option<SessionToken> {
        SessionToken::from_optional(self.token.as_deref())
    }

    #[must_use]
    pub fn http_config(&self) -> HttpConfig {
        let mut config = HttpConfig::default();
        if let Some(secs) = self.request_timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.connect_timeout_secs {
            config = config.with_connect_timeout(Duration::from_secs(secs));
        }
        if let Some(retries) = self.max_retries {
            config = config.with_max_retries(retries);
        }
        config
    }

    #[must_use]
    pub fn reply_config(&self) -> ReplyConfig {
        let defaults = ReplyConfig::default();
        let idle_timeout = match self.stream_idle_timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.idle_timeout,
        };

        ReplyConfig {
            idle_timeout,
            cancel_on_switch: self.cancel_on_switch.unwrap_or(defaults.cancel_on_switch),
            send_history: self.send_history.unwrap_or(defaults.send_history),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.base_url().as_str(), "http://localhost:8000");
        assert!(config.token().is_none());

        let http = config.http_config();
        assert_eq!(http.timeout, Duration::from_secs(120));
        assert_eq!(http.max_retries, 3);

        assert_eq!(config.reply_config(), ReplyConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "base_url = \"https://doc.example.com/\"\n\
             request_timeout_secs = 30\n\
             stream_idle_timeout_secs = 0\n\
             cancel_on_switch = true\n",
        )
        .expect("Failed to write config");

        let config = AppConfig::load_from(Some(&path));

        assert_eq!(config.base_url().as_str(), "https://doc.example.com");
        assert_eq!(config.http_config().timeout, Duration::from_secs(30));
        let reply = config.reply_config();
        assert_eq!(reply.idle_timeout, None);
        assert!(reply.cancel_on_switch);
        assert!(reply.send_history);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = AppConfig::load_from(Some(&temp_dir.path().join("absent.toml")));
        assert_eq!(config.base_url().as_str(), "http://localhost:8000");
    }

    #[test]
    fn test_overrides_and_blank_token() {
        let config = AppConfig {
            token: Some("   ".into()),
            ..AppConfig::default()
        };
        assert!(config.token().is_none());

        let config = config.with_overrides(Some("http://10.0.0.2:8000".into()), Some("abc".into()));
        assert_eq!(config.base_url().as_str(), "http://10.0.0.2:8000");
        assert_eq!(config.token().map(|t| t.as_str().to_string()), Some("abc".into()));
    }

    #[test]
    fn test_init_at_writes_template_once() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("nested").join("config.toml");

        AppConfig::init_at(&path).expect("Failed to init config");
        let content = fs::read_to_string(&path).expect("Failed to read config");
        assert!(content.contains("stream_idle_timeout_secs"));

        let parsed: AppConfig = toml::from_str(&content).expect("Template must parse");
        assert!(parsed.token.is_none());

        let err = AppConfig::init_at(&path).expect_err("Second init must fail");
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }
}
