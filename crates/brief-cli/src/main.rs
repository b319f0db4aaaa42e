//! Brief CLI - keep page summary history in sync from the command line
//!
//! Saves summaries to a local replica, queues them for upload and
//! reconciles with the Brief API when online.

mod cli;
mod commands;
mod config;
mod context;
mod error;
mod session;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::auth_cmd::run_auth;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::history::run_history;
use crate::commands::sync::run_sync;
use crate::context::AppContext;
use crate::error::CliError;

const DEFAULT_LOG_FILTER: &str = "brief_cli=info,brief_core=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let context = AppContext::load(cli.config, cli.db_path)?;

    match cli.command {
        Commands::History { command } => run_history(command, &context)?,
        Commands::Delete { id } => run_delete(&id, &context).await?,
        Commands::Sync { command } => run_sync(command, &context).await?,
        Commands::Auth { command } => run_auth(command, &context).await?,
        Commands::Config { command } => run_config(command, &context)?,
    }

    Ok(())
}
