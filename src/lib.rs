//! Terminal client for the Digital Doctor medical assistant.
//!
//! [`core`] holds the streaming reply pipeline and chat state and talks to
//! the outside world only through [`core::ChatBackend`]. [`backend`]
//! implements that trait over HTTP and provides a scripted mock.

pub mod backend;
pub mod cli;
pub mod config;
pub mod core;
pub mod logging;
