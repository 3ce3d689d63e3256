pub mod client;
pub mod convert;
pub mod error;
pub mod http;
pub mod mock;
pub mod types;
pub mod wire;

pub use client::DigidocClient;
pub use error::BackendError;
pub use mock::{MockBackend, MockReply, MockTitle};
pub use types::{BaseUrl, SessionToken};
