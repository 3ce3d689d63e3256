use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

use super::commands::read_attachment;
use super::render::{TerminalPrinter, format_messages, format_sessions};
use crate::core::types::ChatId;
use crate::core::{ChatController, Result};

/// How long `/quit` waits for replies that are still streaming.
const QUIT_GRACE: Duration = Duration::from_secs(10);

const HELP: &str = "\
Type a question and press Enter. Replies stream in the background.

  /new                    start a new chat
  /chats                  list chats
  /open <chat_id>         switch to a stored chat
  /attach <path> [prompt] send a PDF, PNG or JPEG with an optional prompt
  /history                show the current chat
  /cancel                 stop the reply streaming in the current chat
  /help                   show this help
  /quit                   exit
";

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Empty,
    Message(String),
    New,
    Chats,
    Open(String),
    Attach { path: PathBuf, prompt: String },
    History,
    Cancel,
    Help,
    Quit,
    Invalid(String),
}

#[must_use]
pub fn parse_line(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line.to_string());
    };

    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(name, rest)| (name, rest.trim()));

    match name {
        "new" => Input::New,
        "chats" => Input::Chats,
        "open" if !rest.is_empty() => Input::Open(rest.to_string()),
        "open" => Input::Invalid("Usage: /open <chat_id>".to_string()),
        "attach" if !rest.is_empty() => {
            let (path, prompt) = rest
                .split_once(char::is_whitespace)
                .map_or((rest, ""), |(path, prompt)| (path, prompt.trim()));
            Input::Attach {
                path: PathBuf::from(path),
                prompt: prompt.to_string(),
            }
        }
        "attach" => Input::Invalid("Usage: /attach <path> [prompt]".to_string()),
        "history" => Input::History,
        "cancel" => Input::Cancel,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        other => Input::Invalid(format!("Unknown command: /{other}. Try /help")),
    }
}

/// Interactive loop over stdin.
pub async fn run_repl(controller: Arc<ChatController>) -> Result<()> {
    controller.register_event_handler(Arc::new(TerminalPrinter::stdout()));

    if let Err(e) = controller.refresh_chats().await {
        tracing::warn!(error = %e, "Could not load chat list");
        eprintln!("Could not load chats: {e}");
    }

    println!("Digital Doctor. /help for commands.");

    let mut replies = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        // reap finished replies so the set does not grow
        while replies.try_join_next().is_some() {}

        match parse_line(&line) {
            Input::Empty => {}
            Input::Message(text) => spawn_send(&mut replies, &controller, text, None),
            Input::Attach { path, prompt } => match read_attachment(&path).await {
                Ok(attachment) => {
                    spawn_send(&mut replies, &controller, prompt, Some(attachment));
                }
                Err(e) => eprintln!("{e}"),
            },
            Input::New => {
                let id = controller.new_chat();
                println!("Started chat {id}");
            }
            Input::Chats => match controller.refresh_chats().await {
                Ok(sessions) => {
                    print!("{}", format_sessions(&sessions, Some(&controller.current_chat())));
                }
                Err(e) => {
                    eprintln!("Could not load chats: {e}");
                    let sessions = controller.sessions();
                    print!("{}", format_sessions(&sessions, Some(&controller.current_chat())));
                }
            },
            Input::Open(id) => {
                let ledger = controller.select_chat(&ChatId::new(id)).await;
                println!("Opened chat {}", ledger.chat_id());
                print!("{}", format_messages(ledger.messages()));
            }
            Input::History => print!("{}", format_messages(controller.ledger().messages())),
            Input::Cancel => {
                if !controller.cancel(&controller.current_chat()) {
                    println!("Nothing to cancel.");
                }
            }
            Input::Help => print!("{HELP}"),
            Input::Quit => break,
            Input::Invalid(message) => eprintln!("{message}"),
        }
    }

    if !replies.is_empty() {
        println!("Waiting for {} reply(s) to finish...", replies.len());
    }
    let dropped = finish_replies(&mut replies, QUIT_GRACE).await;
    if dropped > 0 {
        eprintln!("{dropped} reply(s) were still streaming and were not saved.");
    }
    Ok(())
}

/// Lets running replies finish within `grace`, then aborts the rest.
/// Returns how many were aborted.
async fn finish_replies(replies: &mut JoinSet<()>, grace: Duration) -> usize {
    let drain = async {
        while replies.join_next().await.is_some() {}
    };
    if tokio::time::timeout(grace, drain).await.is_ok() {
        return 0;
    }

    let dropped = replies.len();
    tracing::warn!(dropped, "Aborting replies still streaming at exit");
    replies.shutdown().await;
    dropped
}

fn spawn_send(
    replies: &mut JoinSet<()>,
    controller: &Arc<ChatController>,
    text: String,
    attachment: Option<crate::core::types::Attachment>,
) {
    let controller = Arc::clone(controller);
    replies.spawn(async move {
        if let Err(e) = controller.send_message(text, attachment).await {
            eprintln!("{e}");
        }
    });
}
