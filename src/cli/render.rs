use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write;

use crate::backend::wire::{MediaFile, Profile};
use crate::core::events::{ChatEvent, ChatEventHandler};
use crate::core::reply::ReplyPhase;
use crate::core::types::{ChatId, ChatSession, Message, MessageId, Sender};

/// Prints reply snapshots as they arrive.
///
/// Snapshots are cumulative, so only the part not yet printed is written.
/// A snapshot that does not extend the printed text (the failure notice
/// replacing a partial reply) is printed in full on a new line.
pub struct TerminalPrinter<W: Write + Send> {
    state: Mutex<PrinterState<W>>,
}

struct PrinterState<W> {
    out: W,
    printed: HashMap<MessageId, String>,
}

impl TerminalPrinter<std::io::Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TerminalPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            state: Mutex::new(PrinterState {
                out,
                printed: HashMap::new(),
            }),
        }
    }

    pub fn into_inner(self) -> W {
        self.state.into_inner().out
    }
}

impl<W: Write + Send> PrinterState<W> {
    fn reply_updated(&mut self, message_id: MessageId, text: &str) -> std::io::Result<()> {
        let previous = self.printed.entry(message_id).or_default();
        if let Some(suffix) = text.strip_prefix(previous.as_str()) {
            self.out.write_all(suffix.as_bytes())?;
        } else {
            writeln!(self.out)?;
            self.out.write_all(text.as_bytes())?;
        }
        previous.clear();
        previous.push_str(text);
        self.out.flush()
    }

    fn reply_finished(&mut self, message_id: MessageId, phase: ReplyPhase) -> std::io::Result<()> {
        let had_output = self.printed.remove(&message_id).is_some();
        if phase == ReplyPhase::Cancelled {
            if had_output {
                writeln!(self.out)?;
            }
            writeln!(self.out, "[reply cancelled]")?;
        } else if had_output {
            writeln!(self.out)?;
        }
        self.out.flush()
    }
}

impl<W: Write + Send> ChatEventHandler for TerminalPrinter<W> {
    fn handle(&self, event: &ChatEvent) {
        let mut state = self.state.lock();
        let result = match event {
            ChatEvent::ReplyUpdated {
                message_id, text, ..
            } => state.reply_updated(*message_id, text),
            ChatEvent::ReplyFinished {
                message_id, phase, ..
            } => state.reply_finished(*message_id, *phase),
            ChatEvent::TitleChanged { chat_id, title } => {
                writeln!(state.out, "[{chat_id} is now \"{title}\"]")
            }
            ChatEvent::ChatSwitched { .. } => Ok(()),
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, "Failed to write to terminal");
        }
    }
}

#[must_use]
pub fn format_sessions(sessions: &[ChatSession], current: Option<&ChatId>) -> String {
    if sessions.is_empty() {
        return "No chats yet.\n".to_string();
    }
    let mut out = String::new();
    for session in sessions {
        let marker = if current == Some(&session.id) { '*' } else { ' ' };
        let _ = writeln!(
            out,
            "{marker} {}  {}  {}",
            session.id,
            session.timestamp.format("%Y-%m-%d %H:%M"),
            session.title
        );
    }
    out
}

#[must_use]
pub fn format_messages(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        let who = match message.sender {
            Sender::User => "you",
            Sender::Bot => "doctor",
        };
        let _ = write!(out, "{who}: {}", message.text);
        if let Some(media) = &message.media {
            let _ = write!(out, " [{media}]");
        }
        out.push('\n');
    }
    out
}

#[must_use]
pub fn format_profile(profile: &Profile) -> String {
    let mut out = String::new();
    let fields = [
        ("Name", &profile.name),
        ("Email", &profile.email),
        ("Phone", &profile.phone_number),
        ("Date of birth", &profile.date_of_birth),
        ("About", &profile.about),
    ];
    for (label, value) in fields {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            let _ = writeln!(out, "{label}: {value}");
        }
    }
    out
}

#[must_use]
pub fn format_media(files: &[MediaFile]) -> String {
    if files.is_empty() {
        return "No uploaded files.\n".to_string();
    }
    let mut out = String::new();
    for file in files {
        let _ = writeln!(out, "{}  ({})", file.name, file.chat_id);
    }
    out
}
