//! `mcp-bridge` command line.

use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;

use mb_domain::config::{BridgeConfig, ConfigSeverity};

use crate::manager::ServerManager;
use crate::tool_registry::CallContext;

/// mcp-bridge: expose MCP server tools through one dispatch surface.
#[derive(Debug, Parser)]
#[command(name = "mcp-bridge", version, about)]
pub struct Cli {
    /// Config file (defaults to `MB_CONFIG`, then `mcp-bridge.toml`).
    #[arg(long, short)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect every enabled server and print its status.
    Status,
    /// Print the caller-facing tools of every connected server.
    Tools,
    /// Invoke one tool and print the result envelope.
    Call {
        /// Caller-facing tool id, e.g. `mcp_bridge.files.read_file`.
        tool_id: String,
        /// Arguments as a JSON object.
        #[arg(default_value = "{}")]
        args: String,
        /// User id passed in the call context.
        #[arg(long)]
        user: Option<String>,
    },
    /// Probe servers, reconnecting each once if needed.
    Test {
        /// Provider ids (all configured servers when empty).
        provider_ids: Vec<String>,
    },
    /// Validate the config file without connecting.
    Validate,
}

/// Resolve the config path and load it. A missing file yields defaults.
pub fn load_config(path: Option<&str>) -> anyhow::Result<(BridgeConfig, String)> {
    let config_path = path
        .map(str::to_owned)
        .or_else(|| std::env::var("MB_CONFIG").ok())
        .unwrap_or_else(|| "mcp-bridge.toml".into());

    let config = if Path::new(&config_path).exists() {
        BridgeConfig::load(Path::new(&config_path)).with_context(|| format!("loading {config_path}"))?
    } else {
        BridgeConfig::default()
    };
    Ok((config, config_path))
}

/// Print config issues. Returns `false` when any is an error.
pub fn validate(config: &BridgeConfig, config_path: &str) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("Config OK ({config_path})");
        return true;
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    for issue in &issues {
        println!("{issue}");
    }
    println!(
        "\n{} error(s), {} warning(s) in {config_path}",
        error_count,
        issues.len() - error_count,
    );
    error_count == 0
}

pub async fn status(manager: &ServerManager) -> anyhow::Result<()> {
    let servers = manager.list_servers().await?;
    let stats = manager.stats().await?;
    print_json(&serde_json::json!({ "servers": servers, "stats": stats }))
}

pub fn tools(manager: &ServerManager) -> anyhow::Result<()> {
    print_json(&manager.tools().summaries())
}

/// Returns whether the call succeeded.
pub async fn call(manager: &ServerManager, tool_id: &str, args: &str, user: Option<String>) -> anyhow::Result<bool> {
    let args: Value = serde_json::from_str(args).context("arguments must be JSON")?;
    let ctx = CallContext {
        user_id: user,
        channel_id: Some("cli".into()),
        metadata: None,
    };
    let result = manager.call(tool_id, args, &ctx).await;
    print_json(&result)?;
    Ok(result.success)
}

/// Returns whether every tested server ended up connected.
pub async fn test(manager: &ServerManager, provider_ids: Vec<String>) -> anyhow::Result<bool> {
    let ids = if provider_ids.is_empty() {
        manager
            .list_servers()
            .await?
            .into_iter()
            .map(|s| s.provider_id)
            .collect()
    } else {
        provider_ids
    };
    let reports = manager.batch_test_connections(&ids).await;
    print_json(&reports)?;
    Ok(reports.iter().all(|r| r.connected))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
