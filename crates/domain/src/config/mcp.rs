//! Provider (MCP server) configuration types.
//!
//! A provider config is keyed by its provider id everywhere it is stored,
//! so the struct itself carries no id.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{ConfigError, ConfigSeverity};

/// Separator used by caller-facing tool ids. Provider ids must not contain it.
pub const ID_SEPARATOR: char = '.';

/// Configuration for a single provider connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// Transport type (`"stdio"` or `"http"`).
    #[serde(rename = "type")]
    pub transport: TransportKind,

    /// The command to spawn (stdio only, e.g. `"npx"`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,

    /// Arguments to pass to the command.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Extra environment variables for the spawned process.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Endpoint URL (http only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Extra request headers (http only).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    /// Servers must be switched on explicitly.
    #[serde(default)]
    pub enabled: bool,
}

/// Transport kind for connecting to a provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Stdio,
    Http,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Stdio => f.write_str("stdio"),
            TransportKind::Http => f.write_str("http"),
        }
    }
}

impl ProviderConfig {
    /// Convenience constructor for a stdio provider.
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            transport: TransportKind::Stdio,
            command: command.into(),
            args,
            env: HashMap::new(),
            url: None,
            headers: HashMap::new(),
            enabled: true,
        }
    }

    /// Convenience constructor for an HTTP provider.
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::Http,
            command: String::new(),
            args: Vec::new(),
            env: HashMap::new(),
            url: Some(url.into()),
            headers: HashMap::new(),
            enabled: true,
        }
    }

    /// Check this config as the entry for `provider_id`.
    ///
    /// Returns an empty vec when the config can be connected.
    pub fn validate(&self, provider_id: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let field = format!("mcp_servers.{provider_id}");

        if provider_id.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: field.clone(),
                message: "provider id must not be empty".into(),
            });
        }
        if provider_id.contains(ID_SEPARATOR) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: field.clone(),
                message: format!("provider id must not contain '{ID_SEPARATOR}'"),
            });
        }

        match self.transport {
            TransportKind::Stdio if self.command.trim().is_empty() => {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("{field}.command"),
                    message: "stdio server requires a command".into(),
                });
            }
            TransportKind::Http if self.url.as_deref().map_or(true, |u| u.trim().is_empty()) => {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("{field}.url"),
                    message: "http server requires a url".into(),
                });
            }
            _ => {}
        }

        if !self.enabled {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: format!("{field}.enabled"),
                message: "server must be explicitly enabled".into(),
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_stdio_config() {
        let raw = r#"{
            "type": "stdio",
            "command": "npx",
            "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"],
            "env": { "NODE_ENV": "production" },
            "enabled": true
        }"#;
        let cfg: ProviderConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.transport, TransportKind::Stdio);
        assert_eq!(cfg.command, "npx");
        assert_eq!(cfg.args.len(), 3);
        assert_eq!(cfg.env.get("NODE_ENV").unwrap(), "production");
        assert!(cfg.validate("files").is_empty());
    }

    #[test]
    fn deserialize_http_config() {
        let raw = r#"{
            "type": "http",
            "url": "http://localhost:8080/mcp",
            "headers": { "Authorization": "Bearer abc" },
            "enabled": true
        }"#;
        let cfg: ProviderConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.transport, TransportKind::Http);
        assert_eq!(cfg.url.as_deref(), Some("http://localhost:8080/mcp"));
        assert_eq!(cfg.headers.len(), 1);
        assert!(cfg.validate("remote").is_empty());
    }

    #[test]
    fn unknown_transport_is_rejected() {
        let raw = r#"{ "type": "websocket", "url": "ws://x", "enabled": true }"#;
        assert!(serde_json::from_str::<ProviderConfig>(raw).is_err());
    }

    #[test]
    fn enabled_defaults_to_false_and_fails_validation() {
        let raw = r#"{ "type": "stdio", "command": "echo" }"#;
        let cfg: ProviderConfig = serde_json::from_str(raw).unwrap();
        assert!(!cfg.enabled);
        let errors = cfg.validate("echo");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("explicitly enabled"));
    }

    #[test]
    fn stdio_without_command_fails_validation() {
        let mut cfg = ProviderConfig::stdio("", Vec::new());
        cfg.command = "   ".into();
        let errors = cfg.validate("broken");
        assert!(errors.iter().any(|e| e.field == "mcp_servers.broken.command"));
    }

    #[test]
    fn http_without_url_fails_validation() {
        let mut cfg = ProviderConfig::http("http://x");
        cfg.url = None;
        let errors = cfg.validate("remote");
        assert!(errors.iter().any(|e| e.field == "mcp_servers.remote.url"));
    }

    #[test]
    fn provider_id_with_separator_fails_validation() {
        let cfg = ProviderConfig::stdio("echo", Vec::new());
        let errors = cfg.validate("my.server");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("must not contain"));
        assert!(!cfg.validate("").is_empty());
    }

    #[test]
    fn serialize_skips_empty_fields() {
        let cfg = ProviderConfig::http("http://localhost:9000");
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["type"], "http");
        assert!(json.get("command").is_none());
        assert!(json.get("env").is_none());
    }
}
