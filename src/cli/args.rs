//! CLI argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "digidoc")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Backend address (overrides the config file)
    #[arg(long, global = true, env = "DIGIDOC_BASE_URL")]
    pub base_url: Option<String>,

    /// Session token (overrides the stored login)
    #[arg(long, global = true, env = "DIGIDOC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive chat (default)
    Chat,

    /// Ask one question and stream the answer
    Ask {
        /// The question, or the prompt for an attached file
        prompt: String,

        /// PDF, PNG or JPEG file to send with the prompt
        #[arg(long, short)]
        attach: Option<PathBuf>,

        /// Continue an existing chat instead of starting a new one
        #[arg(long)]
        chat: Option<String>,
    },

    /// List stored chats
    Chats,

    /// Print the messages of a chat
    History {
        chat_id: String,
    },

    /// Log in and store the session token
    Login {
        #[arg(long)]
        email: String,

        /// Read from DIGIDOC_PASSWORD when omitted
        #[arg(long, env = "DIGIDOC_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the stored session token
    Logout,

    /// Show the logged-in user's profile
    Profile,

    /// List uploaded files
    Media,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigSubcommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigSubcommands {
    /// Initialize a new config file
    Init,
    /// Print config file location
    Where,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask_with_attachment() {
        let cli = Cli::try_parse_from([
            "digidoc",
            "ask",
            "what does this show",
            "--attach",
            "xray.png",
            "--chat",
            "chat_1",
        ])
        .expect("parse");

        match cli.command {
            Some(Commands::Ask {
                prompt,
                attach,
                chat,
            }) => {
                assert_eq!(prompt, "what does this show");
                assert_eq!(attach, Some(PathBuf::from("xray.png")));
                assert_eq!(chat.as_deref(), Some("chat_1"));
            }
            other => panic!("Expected Ask, got {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["digidoc", "chats", "--base-url", "http://10.0.0.2:8000"])
            .expect("parse");
        assert_eq!(cli.base_url.as_deref(), Some("http://10.0.0.2:8000"));
        assert!(matches!(cli.command, Some(Commands::Chats)));
    }

    #[test]
    fn test_no_subcommand_means_chat() {
        let cli = Cli::try_parse_from(["digidoc"]).expect("parse");
        assert!(cli.command.is_none());
    }
}
