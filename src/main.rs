use std::process::ExitCode;

use clap::Parser;

use digidoc::backend::BackendError;
use digidoc::cli::{self, Cli, Commands, ConfigSubcommands};
use digidoc::config::AppConfig;
use digidoc::core::ChatError;
use digidoc::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = logging::init(cli.verbose);

    if let Some(Commands::Config { command }) = &cli.command {
        return match command {
            ConfigSubcommands::Init => match AppConfig::init_default() {
                Ok(path) => {
                    println!("✓ Created config file at {}", path.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("✗ Failed to create config: {e}");
                    ExitCode::FAILURE
                }
            },
            ConfigSubcommands::Where => match AppConfig::get_config_path() {
                Some(path) => {
                    println!("{}", path.display());
                    ExitCode::SUCCESS
                }
                None => {
                    eprintln!("✗ Could not determine config path");
                    ExitCode::FAILURE
                }
            },
        };
    }

    match cli::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn report(error: &ChatError) {
    eprintln!("✗ {error}");
    if let ChatError::Backend(BackendError::Authentication {
        hint: Some(hint), ..
    }) = error
    {
        eprintln!("  {hint}");
    }
}
