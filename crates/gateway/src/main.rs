// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `vkd` — the VK gateway daemon.

use clap::{Parser, Subcommand};
use vk_gateway::host_agent::{self, HostAgentConfig};
use vk_gateway::lifecycle::{self, Config, LifecycleError};

#[derive(Parser)]
#[command(name = "vkd", version, about = "Task-oriented AI coding agent gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway (default).
    Serve,
    /// Offer this machine's capacity to a gateway.
    Host {
        /// Gateway base URL, e.g. ws://gateway:3100
        #[arg(long)]
        gateway: String,
    },
}

fn init_tracing() {
    let Some(data_dir) = vk_gateway::env::data_dir() else {
        tracing_subscriber::fmt().with_env_filter(env_filter()).init();
        return;
    };
    let logs_dir = vk_storage::DataLayout::new(data_dir).logs_dir();
    if std::fs::create_dir_all(&logs_dir).is_err() {
        tracing_subscriber::fmt().with_env_filter(env_filter()).init();
        return;
    }
    let appender = tracing_appender::rolling::daily(logs_dir, "vkd.log");
    tracing_subscriber::fmt().with_env_filter(env_filter()).with_writer(appender).init();
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

async fn run(command: Option<Command>) -> Result<(), LifecycleError> {
    match command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let config = Config::from_env()?;
            let gateway = lifecycle::startup(config).await?;
            lifecycle::serve(gateway).await
        }
        Command::Host { gateway } => {
            let config = HostAgentConfig::from_env(gateway)?;
            host_agent::run(config).await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();
    if let Err(e) = run(cli.command).await {
        tracing::error!(error = %e, "fatal");
        eprintln!("vkd: {e}");
        std::process::exit(e.exit_code());
    }
}
