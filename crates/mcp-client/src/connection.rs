//! A single provider connection: one session plus its cached tool catalog.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use mb_domain::config::ProviderConfig;
use mb_domain::trace::TraceEvent;
use crate::error::McpError;
use crate::protocol::McpToolDef;
use crate::session::{Connector, McpSession};

/// Liveness of a provider, derived on demand from a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => f.write_str("disconnected"),
            ConnectionStatus::Connected => f.write_str("connected"),
            ConnectionStatus::Error => f.write_str("error"),
        }
    }
}

/// The parts guarded by the connection lock.
struct Live {
    session: Box<dyn McpSession>,
    catalog: Vec<McpToolDef>,
}

/// A live connection to one provider.
///
/// Only a successful [`ProviderConnection::connect`] produces one, so a
/// half-initialized connection never exists. Calls and probes share the
/// lock; [`disconnect`](Self::disconnect) takes it exclusively, so it waits
/// for in-flight calls and nothing runs against a closing session.
pub struct ProviderConnection {
    provider_id: String,
    config: ProviderConfig,
    connected_at: DateTime<Utc>,
    live: RwLock<Option<Live>>,
}

impl ProviderConnection {
    /// Open a session, wait `settle_delay`, then fetch and cache the catalog.
    ///
    /// On any failure the session is closed and the error returned; there
    /// is no retry here.
    pub async fn connect(
        provider_id: &str,
        config: &ProviderConfig,
        connector: &dyn Connector,
        settle_delay: Duration,
    ) -> Result<Self, McpError> {
        let start = Instant::now();
        tracing::info!(
            provider_id,
            transport = %config.transport,
            "connecting to MCP server"
        );

        let result = Self::open(provider_id, config, connector, settle_delay).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok((session, catalog)) => {
                TraceEvent::ProviderConnected {
                    provider_id: provider_id.to_owned(),
                    transport: config.transport.to_string(),
                    tool_count: catalog.len(),
                    duration_ms,
                }
                .emit();
                Ok(Self {
                    provider_id: provider_id.to_owned(),
                    config: config.clone(),
                    connected_at: Utc::now(),
                    live: RwLock::new(Some(Live { session, catalog })),
                })
            }
            Err(e) => {
                TraceEvent::ProviderConnectFailed {
                    provider_id: provider_id.to_owned(),
                    transport: config.transport.to_string(),
                    error: e.to_string(),
                    duration_ms,
                }
                .emit();
                Err(e)
            }
        }
    }

    async fn open(
        provider_id: &str,
        config: &ProviderConfig,
        connector: &dyn Connector,
        settle_delay: Duration,
    ) -> Result<(Box<dyn McpSession>, Vec<McpToolDef>), McpError> {
        let session = connector.connect(provider_id, config).await?;

        if !settle_delay.is_zero() {
            tokio::time::sleep(settle_delay).await;
        }

        match session.list_tools().await {
            Ok(tools) => Ok((session, dedupe_catalog(provider_id, tools))),
            Err(e) => {
                session.close().await;
                Err(e)
            }
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// The config this connection was opened with.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// `true` until [`disconnect`](Self::disconnect) has run.
    pub async fn is_connected(&self) -> bool {
        self.live.read().await.is_some()
    }

    /// The cached catalog. Does not contact the provider.
    pub async fn list_tools(&self) -> Vec<McpToolDef> {
        self.live
            .read()
            .await
            .as_ref()
            .map(|live| live.catalog.clone())
            .unwrap_or_default()
    }

    /// Look up one tool in the cached catalog.
    pub async fn tool(&self, name: &str) -> Option<McpToolDef> {
        self.live
            .read()
            .await
            .as_ref()
            .and_then(|live| live.catalog.iter().find(|t| t.name == name).cloned())
    }

    /// Call a tool and return the provider's raw payload.
    ///
    /// Unknown tool names fail with [`McpError::ToolNotFound`] without a
    /// round-trip to the provider.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, McpError> {
        let guard = self.live.read().await;
        let live = guard
            .as_ref()
            .ok_or_else(|| McpError::NotConnected(self.provider_id.clone()))?;

        if !live.catalog.iter().any(|t| t.name == name) {
            return Err(McpError::ToolNotFound {
                provider_id: self.provider_id.clone(),
                tool: name.to_owned(),
            });
        }

        live.session.call_tool(name, arguments).await
    }

    /// Close the session. Idempotent.
    pub async fn disconnect(&self) {
        let mut guard = self.live.write().await;
        if let Some(live) = guard.take() {
            live.session.close().await;
            TraceEvent::ProviderDisconnected {
                provider_id: self.provider_id.clone(),
            }
            .emit();
        }
    }

    /// Re-list tools against the provider as a liveness probe.
    ///
    /// Returns the status together with the size of the cached catalog,
    /// both read under one lock acquisition. Never fails: a probe error is
    /// reported as [`ConnectionStatus::Error`].
    pub async fn probe_status(&self) -> (ConnectionStatus, usize) {
        let guard = self.live.read().await;
        let Some(live) = guard.as_ref() else {
            return (ConnectionStatus::Disconnected, 0);
        };
        let tool_count = live.catalog.len();
        match live.session.list_tools().await {
            Ok(_) => (ConnectionStatus::Connected, tool_count),
            Err(e) => {
                tracing::warn!(provider_id = %self.provider_id, error = %e, "status probe failed");
                (ConnectionStatus::Error, tool_count)
            }
        }
    }
}

impl std::fmt::Debug for ProviderConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConnection")
            .field("provider_id", &self.provider_id)
            .field("config", &self.config)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

/// Keep the first definition of each tool name.
fn dedupe_catalog(provider_id: &str, tools: Vec<McpToolDef>) -> Vec<McpToolDef> {
    let mut catalog: Vec<McpToolDef> = Vec::with_capacity(tools.len());
    for tool in tools {
        if catalog.iter().any(|t| t.name == tool.name) {
            tracing::warn!(provider_id, tool = %tool.name, "duplicate tool name in catalog, ignoring");
            continue;
        }
        catalog.push(tool);
    }
    catalog
}
