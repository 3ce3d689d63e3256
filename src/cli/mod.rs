mod args;
mod commands;
pub mod render;
pub mod repl;

pub use args::{Cli, Commands, ConfigSubcommands};
pub use commands::{create_client, create_controller, load_config, read_attachment, run};
