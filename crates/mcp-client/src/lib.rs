//! `mb-mcp-client`: provider connections for mcp-bridge.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types for talking to MCP servers.
//! - Stdio (child process) and HTTP transports.
//! - The [`McpSession`] / [`Connector`] seam that keeps connection
//!   management independent of the wire protocol.
//! - [`ProviderConnection`]: one live session plus its cached catalog.
//! - [`ConnectionRegistry`]: every connection keyed by provider id, with
//!   add/remove/status/test-connection orchestration.
//!
//! # Usage
//!
//! ```rust,ignore
//! use mb_mcp_client::ConnectionRegistry;
//!
//! let registry = ConnectionRegistry::from_config(&config);
//! registry.add_provider("files", &config.mcp_servers["files"]).await?;
//!
//! for status in registry.list_all_statuses().await {
//!     println!("{} {}", status.provider_id, status.status);
//! }
//!
//! let raw = registry.call_tool("files", "read_file", json!({"path": "/tmp/a"})).await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod session;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod transport;

// Re-exports for convenience.
pub use config::{BridgeConfig, ProviderConfig, TransportKind};
pub use connection::{ConnectionStatus, ProviderConnection};
pub use error::McpError;
pub use protocol::McpToolDef;
pub use registry::{BatchCall, ConnectionRegistry, ConnectionTestReport, ProviderStatus, RegistryOptions};
pub use session::{Connector, McpClient, McpSession, TransportConnector};
pub use transport::TransportError;
