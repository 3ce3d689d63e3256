use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use super::args::{Cli, Commands};
use super::render::{
    TerminalPrinter, format_media, format_messages, format_profile, format_sessions,
};
use super::repl::run_repl;
use crate::backend::DigidocClient;
use crate::config::{AppConfig, ConfigPatch, ConfigPersister};
use crate::core::types::{Attachment, ChatId};
use crate::core::{ChatBackend, ChatController, ChatError, ReplyOutcome, Result};

/// Config file and environment, then command-line flags on top.
#[must_use]
pub fn load_config(cli: &Cli) -> AppConfig {
    AppConfig::load().with_overrides(cli.base_url.clone(), cli.token.clone())
}

pub fn create_client(config: &AppConfig) -> Result<DigidocClient> {
    let client =
        DigidocClient::with_http_config(config.base_url(), config.token(), config.http_config())?;
    tracing::debug!(
        base_url = %client.base_url(),
        authenticated = client.is_authenticated(),
        "Backend client ready"
    );
    Ok(client)
}

#[must_use]
pub fn create_controller(client: DigidocClient, config: &AppConfig) -> Arc<ChatController> {
    Arc::new(ChatController::new(Arc::new(client), config.reply_config()))
}

pub async fn read_attachment(path: &Path) -> Result<Attachment> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ChatError::Attachment(format!("{}: {e}", path.display())))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| ChatError::Attachment(format!("{}: not a file name", path.display())))?;

    let attachment = Attachment::new(file_name, bytes);
    if !attachment.is_supported() {
        return Err(ChatError::Attachment(format!(
            "{file_name}: only PDF, PNG and JPEG files are accepted"
        )));
    }
    Ok(attachment)
}

/// Runs every command except `config`, which needs no backend.
pub async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli);
    let client = create_client(&config)?;

    match cli.command {
        None | Some(Commands::Chat) => {
            run_repl(create_controller(client, &config)).await?;
        }
        Some(Commands::Ask {
            prompt,
            attach,
            chat,
        }) => {
            let controller = create_controller(client, &config);
            return ask(&controller, prompt, attach.as_deref(), chat).await;
        }
        Some(Commands::Chats) => {
            let sessions = client.list_chats().await?;
            print!("{}", format_sessions(&sessions, None));
        }
        Some(Commands::History { chat_id }) => {
            let messages = client.chat_data(&ChatId::new(chat_id)).await?;
            print!("{}", format_messages(&messages));
        }
        Some(Commands::Login { email, password }) => {
            let token = client.login(&email, &password).await?;
            let persister = persister()?;
            let patch = ConfigPatch::login(token.as_str()).with_base_url(cli.base_url);
            persister
                .apply_patch(&patch)
                .map_err(|e| ChatError::Config(e.to_string()))?;
            println!("Logged in. Token saved to {}", persister.path().display());
        }
        Some(Commands::Logout) => {
            if client.is_authenticated() {
                if let Err(e) = client.logout().await {
                    tracing::warn!(error = %e, "Remote logout failed");
                }
            }
            persister()?
                .apply_patch(&ConfigPatch::logout())
                .map_err(|e| ChatError::Config(e.to_string()))?;
            println!("Logged out.");
        }
        Some(Commands::Profile) => {
            let profile = client.profile().await?;
            print!("{}", format_profile(&profile));
        }
        Some(Commands::Media) => {
            let files = client.media().await?;
            print!("{}", format_media(&files));
        }
        Some(Commands::Config { .. }) => {
            return Err(ChatError::InvalidState(
                "config commands are handled before connecting".to_string(),
            ));
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn ask(
    controller: &ChatController,
    prompt: String,
    attach: Option<&Path>,
    chat: Option<String>,
) -> Result<ExitCode> {
    controller.register_event_handler(Arc::new(TerminalPrinter::stdout()));

    if let Some(chat_id) = chat {
        controller.select_chat(&ChatId::new(chat_id)).await;
    }

    let attachment = match attach {
        Some(path) => Some(read_attachment(path).await?),
        None => None,
    };

    let sent = controller.send_message(prompt, attachment).await?;
    match &sent.outcome {
        ReplyOutcome::Completed { .. } => Ok(ExitCode::SUCCESS),
        ReplyOutcome::Failed { error, .. } => {
            eprintln!("Reply failed: {error}");
            Ok(ExitCode::FAILURE)
        }
        ReplyOutcome::Cancelled { .. } => Ok(ExitCode::FAILURE),
    }
}

fn persister() -> Result<ConfigPersister> {
    ConfigPersister::with_default_path()
        .ok_or_else(|| ChatError::Config("Could not determine config directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_attachment() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("xray.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).expect("Failed to write file");

        let attachment = read_attachment(&path).await.expect("read attachment");

        assert_eq!(attachment.file_name, "xray.png");
        assert_eq!(attachment.mime_type.as_deref(), Some("image/png"));
        assert_eq!(attachment.bytes.len(), 4);
    }

    #[tokio::test]
    async fn test_read_attachment_rejects_missing_and_unsupported() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let missing = read_attachment(&temp_dir.path().join("absent.pdf")).await;
        assert!(matches!(missing, Err(ChatError::Attachment(_))));

        let path = temp_dir.path().join("notes.txt");
        std::fs::write(&path, "hello").expect("Failed to write file");
        let unsupported = read_attachment(&path).await;
        assert!(matches!(unsupported, Err(ChatError::Attachment(m)) if m.contains("notes.txt")));
    }

    #[test]
    fn test_create_client_from_config() {
        let config = AppConfig {
            base_url: Some("http://10.1.1.1:8000/".into()),
            token: Some("tok".into()),
            ..AppConfig::default()
        };

        let client = create_client(&config).expect("create client");

        assert_eq!(client.base_url().as_str(), "http://10.1.1.1:8000");
        assert!(client.is_authenticated());
    }
}
