pub mod accumulator;
pub mod backend;
pub mod chat_book;
pub mod controller;
pub mod error;
pub mod events;
pub mod finalizer;
pub mod ledger;
pub mod reply;
pub mod types;

pub use backend::{ByteStream, ChatBackend};
pub use controller::{ChatController, ReplyConfig, SentMessage};
pub use error::{ChatError, Result};
pub use events::{ChatEvent, ChatEventEmitter, ChatEventHandler};
pub use reply::{ReplyOutcome, ReplyPhase};
