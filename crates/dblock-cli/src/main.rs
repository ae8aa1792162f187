//! dblock CLI - run a command while holding a database lock

use anyhow::Context;
use clap::Parser;
use dblock_core::config::LockConfig;
use dblock_core::domain::locking::DatabaseLock;
use std::path::PathBuf;
use std::process::ExitStatus;
use tokio::process::Command;
use tracing::{debug, info};

/// Exit status when dblock itself fails before or around the command
const FAILURE_EXIT_CODE: i32 = 1;

#[derive(Parser)]
#[command(name = "dblock")]
#[command(author, version, about = "Run a command while holding a database-wide lock", long_about = None)]
struct Cli {
    /// Database connection URL (postgres://... or sqlite:...)
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Lock identifier (overrides config and DBLOCK_TASK_LOCK_ID)
    #[arg(long)]
    lock_id: Option<i64>,

    /// Read configuration from this file instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Quiet mode (only warnings and errors)
    #[arg(short, long)]
    quiet: bool,

    /// Command to run while the lock is held
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    command: Vec<String>,
}

fn load_config(cli: &Cli) -> anyhow::Result<LockConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = LockConfig::load_from(path)?;
            config.apply_env_overrides(|name| std::env::var(name).ok())?;
            config
        }
        None => LockConfig::load()?,
    };

    if let Some(id) = cli.lock_id {
        config = config.with_task_lock_id(id);
    }
    Ok(config)
}

async fn run_locked(cli: &Cli, config: &LockConfig) -> anyhow::Result<ExitStatus> {
    let mut lock = DatabaseLock::connect(&cli.database_url, config).await?;
    debug!(lock = ?lock, "Lock bound");

    let program = cli.command[0].clone();
    let args = cli.command[1..].to_vec();

    lock.run(move || async move {
        info!(program = %program, "Running command under lock");
        Command::new(&program)
            .args(&args)
            .status()
            .await
            .with_context(|| format!("Failed to run {}", program))
    })
    .await
}

fn report(err: &anyhow::Error) {
    match err.downcast_ref::<dblock_core::Error>() {
        Some(lock_err) => {
            eprintln!("Error [{}]: {}", lock_err.code(), lock_err);
            if let Some(suggestion) = lock_err.suggestion() {
                eprintln!("Hint: {}", suggestion);
            }
        }
        None => eprintln!("Error: {:#}", err),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Pick up DATABASE_URL from .env before parsing arguments
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let directive = if cli.quiet { "dblock=warn" } else { "dblock=info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .init();

    let outcome = match load_config(&cli) {
        Ok(config) => run_locked(&cli, &config).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(status) => std::process::exit(status.code().unwrap_or(FAILURE_EXIT_CODE)),
        Err(e) => {
            report(&e);
            std::process::exit(FAILURE_EXIT_CODE);
        }
    }
}
