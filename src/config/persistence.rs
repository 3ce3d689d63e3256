use crate::config::{AppConfig, get_config_dir};
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Config directory not found")]
    NoConfigDir,
}

/// A change to the stored configuration. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigPatch {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub clear_token: bool,
}

impl ConfigPatch {
    #[must_use]
    pub fn login(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn logout() -> Self {
        Self {
            clear_token: true,
            ..Default::default()
        }
    }

    /// Remembers the server a login was made against.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        if base_url.is_some() {
            self.base_url = base_url;
        }
        self
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.base_url.is_none() && self.token.is_none() && !self.clear_token
    }
}

/// Writes [`ConfigPatch`]es to `config.toml` with a temp-file rename.
pub struct ConfigPersister {
    config_path: PathBuf,
    write_lock: Mutex<()>,
}

impl ConfigPersister {
    #[must_use]
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_default_path() -> Option<Self> {
        get_config_dir().map(|dir| Self::new(dir.join("config.toml")))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn apply_patch(&self, patch: &ConfigPatch) -> ConfigResult<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let _lock = self.write_lock.lock();

        let existing = self.read_existing_config()?;

        let merged = Self::merge_config(existing, patch);

        self.atomic_write(&merged)
    }

    fn read_existing_config(&self) -> ConfigResult<AppConfig> {
        if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(AppConfig::default())
        }
    }

    fn merge_config(mut existing: AppConfig, patch: &ConfigPatch) -> AppConfig {
        if let Some(ref base_url) = patch.base_url {
            existing.base_url = Some(base_url.clone());
        }
        if patch.clear_token {
            existing.token = None;
        }
        if let Some(ref token) = patch.token {
            existing.token = Some(token.clone());
        }
        existing
    }

    fn atomic_write(&self, config: &AppConfig) -> ConfigResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml_content = toml::to_string_pretty(config)?;
        let content = format!(
            "# Digidoc configuration\n\
             # This file is rewritten by `digidoc login` and `digidoc logout`.\n\n\
             {toml_content}"
        );

        let temp_path = self.config_path.with_extension("toml.tmp");
        fs::write(&temp_path, &content)?;
        restrict_permissions(&temp_path)?;

        fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

// the file may hold a session token
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_patch_constructors() {
        assert_eq!(ConfigPatch::login("tok").token.as_deref(), Some("tok"));
        assert!(ConfigPatch::logout().clear_token);
        assert!(ConfigPatch::default().is_empty());
        assert!(!ConfigPatch::logout().is_empty());
        let login = ConfigPatch::login("tok").with_base_url(Some("http://x".into()));
        assert_eq!(login.base_url.as_deref(), Some("http://x"));
        assert_eq!(ConfigPatch::logout().with_base_url(None).base_url, None);
    }

    #[test]
    fn test_login_then_logout() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "base_url = \"http://10.0.0.5:8000\"\nmax_retries = 1\n")
            .expect("Failed to seed config");

        let persister = ConfigPersister::new(config_path.clone());

        persister
            .apply_patch(&ConfigPatch::login("eyJ.token"))
            .expect("Failed to apply login");

        let content = fs::read_to_string(&config_path).expect("Failed to read config");
        assert!(content.contains("token = \"eyJ.token\""));
        assert!(content.contains("base_url = \"http://10.0.0.5:8000\""));
        assert!(content.contains("max_retries = 1"));

        persister
            .apply_patch(&ConfigPatch::logout())
            .expect("Failed to apply logout");

        let content = fs::read_to_string(&config_path).expect("Failed to read config");
        assert!(!content.contains("token"));
        assert!(content.contains("base_url"));
    }

    #[cfg(unix)]
    #[test]
    fn test_written_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.toml");
        let persister = ConfigPersister::new(config_path.clone());

        persister
            .apply_patch(&ConfigPatch::login("secret"))
            .expect("Failed to apply login");

        let mode = fs::metadata(&config_path)
            .expect("Failed to stat config")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_persister_empty_patch_noop() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.toml");

        let persister = ConfigPersister::new(config_path.clone());

        let empty = ConfigPatch::default();
        persister
            .apply_patch(&empty)
            .expect("Failed to apply empty patch");

        assert!(!config_path.exists());
    }
}
