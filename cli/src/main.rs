//! Ferry CLI - manage tasks offline and sync them when the server is reachable.
//!
//! Usage:
//!   ferry add "Write report" --description "Quarterly numbers"
//!   ferry list
//!   ferry status <id> done
//!   ferry sync
//!
//! Every invocation opens the local tables under the data directory, checks
//! the server once, and either talks to it directly or queues the change.

mod commands;
mod config;
mod error;

use crate::commands::Command;
use crate::config::{Config, Overrides};
use crate::error::Result;
use clap::Parser;
use ferry_engine::{HttpRemote, LocalStore, Reconciler, StaticConnectivity, TaskClient};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Offline-first task client.
#[derive(Parser, Debug)]
#[command(name = "ferry")]
#[command(about = "Queue task edits offline, sync when the server is reachable")]
struct Args {
    /// Task server URL [env: FERRY_SERVER_URL]
    #[arg(long, global = true)]
    server_url: Option<String>,

    /// Local data directory [env: FERRY_DATA_DIR]
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Bearer token [env: FERRY_TOKEN]
    #[arg(long, global = true)]
    token: Option<String>,

    /// Request timeout in seconds [env: FERRY_TIMEOUT_SECS]
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Skip the server entirely and queue everything
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferry=info,ferry_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?.with_overrides(Overrides {
        server_url: args.server_url,
        data_dir: args.data_dir,
        token: args.token,
        timeout_secs: args.timeout_secs,
    })?;

    let store = LocalStore::open(&config.data_dir)?;

    let mut remote = HttpRemote::new(&config.server_url, config.timeout)?;
    if let Some(token) = &config.token {
        remote = remote.with_token(token);
    }

    let online = !args.offline && remote.is_reachable().await;
    if !online && !args.offline {
        tracing::info!(server = %config.server_url, "server unreachable, working offline");
    }

    let reconciler = Reconciler::new(Arc::new(remote), Arc::new(StaticConnectivity(online)));
    let client = TaskClient::new(store, reconciler);

    let mut stdout = std::io::stdout().lock();
    commands::run(&client, args.command, &mut stdout).await
}
