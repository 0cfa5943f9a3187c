//! sheetlink CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

use sheetlink_client::cli::{AuthProvider, Cli, Command, ConfigAction};
use sheetlink_client::commands;
use sheetlink_client::config::ClientConfig;
use sheetlink_client::error::{ClientError, ClientResult};
use sheetlink_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = match cli.command {
        Command::Server { .. } if cli.debug => TracingConfig::server().with_level(Level::DEBUG),
        Command::Server { .. } => TracingConfig::server(),
        _ => TracingConfig::cli(cli.debug),
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config_path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path),
        None => ClientConfig::load(),
    }
    .map_err(ClientError::Config)?;

    match cli.command {
        Command::Auth { provider } => match provider {
            AuthProvider::Google {
                client_id,
                client_secret,
                credentials_file,
                force,
            } => {
                commands::auth::google(
                    client_id,
                    client_secret,
                    credentials_file,
                    force,
                    &config,
                    &config_path,
                )
                .await
            }
        },
        Command::Export {
            file,
            title,
            fields,
            batch_size,
        } => commands::export::run(file, title, fields, batch_size, &config).await,
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &config_path),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&config_path),
        },
        Command::Server { listen } => commands::server::run(listen, &config).await,
    }
}
