mod mcp;

pub use mcp::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Provider definitions (key = provider id).
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, ProviderConfig>,

    /// Fixed wait between transport establishment and the first `tools/list`.
    /// Some providers are not ready to answer immediately after the handshake.
    #[serde(default = "d_1000")]
    pub settle_delay_ms: u64,

    /// Per-request timeout on a provider transport.
    #[serde(default = "d_30000")]
    pub request_timeout_ms: u64,

    /// Upper bound for a single status probe.
    #[serde(default = "d_5000")]
    pub probe_timeout_ms: u64,

    /// Tool calls slower than this are logged at WARN.
    #[serde(default = "d_500")]
    pub slow_call_threshold_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mcp_servers: BTreeMap::new(),
            settle_delay_ms: d_1000(),
            request_timeout_ms: d_30000(),
            probe_timeout_ms: d_5000(),
            slow_call_threshold_ms: d_500(),
        }
    }
}

fn d_500() -> u64 {
    500
}

fn d_1000() -> u64 {
    1000
}

fn d_5000() -> u64 {
    5000
}

fn d_30000() -> u64 {
    30_000
}

impl BridgeConfig {
    /// Load a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn slow_call_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_call_threshold_ms)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl BridgeConfig {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.mcp_servers.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "mcp_servers".into(),
                message: "no MCP servers configured".into(),
            });
        }

        for (id, server) in &self.mcp_servers {
            errors.extend(server.validate(id));
        }

        if self.request_timeout_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "request_timeout_ms".into(),
                message: "request timeout must be greater than 0".into(),
            });
        }

        if self.settle_delay_ms > 10_000 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "settle_delay_ms".into(),
                message: "settle delay above 10s stalls every connect".into(),
            });
        }

        errors
    }
}
