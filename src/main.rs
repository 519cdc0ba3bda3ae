mod cli;
mod commands;
mod error;
mod logging;

use crate::cli::Cli;
use crate::error::{ErrorKind, Result};
use clap::Parser;
use dupeguard_config::Config;
use dupeguard_index::Database;
use exn::ResultExt;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    if let Some(path) = cli.database {
        config.database.path = path;
    }
    logging::init(config.log_level.as_ref())?;

    if let Some(parent) = config.database.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Database)?;
    }
    let db = Database::connect_with(&config.database.path, config.database.pool_settings())
        .await
        .or_raise(|| ErrorKind::Database)?;
    tracing::debug!(path = %config.database.path.display(), "index database open");
    let result = commands::run(&db, &config, cli.command).await;
    db.close().await;
    result
}
