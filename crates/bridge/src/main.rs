use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use mb_bridge::cli::{self, Cli, Command};
use mb_bridge::{MemoryConfigStore, ServerManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = cli::load_config(cli.config.as_deref())?;

    if let Command::Validate = cli.command {
        if !cli::validate(&config, &config_path) {
            std::process::exit(1);
        }
        return Ok(());
    }

    init_tracing();

    let manager = ServerManager::from_config(&config, Arc::new(MemoryConfigStore::new())).await?;
    let outcome = match cli.command {
        Command::Status => cli::status(&manager).await.map(|()| true),
        Command::Tools => cli::tools(&manager).map(|()| true),
        Command::Call { tool_id, args, user } => cli::call(&manager, &tool_id, &args, user).await,
        Command::Test { provider_ids } => cli::test(&manager, provider_ids).await,
        Command::Validate => Ok(true),
    };
    manager.shutdown().await;

    if !outcome? {
        std::process::exit(1);
    }
    Ok(())
}

/// Structured JSON logs on stderr; stdout carries command output.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mb_bridge=debug"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
