//! Server manager: one process-wide instance tying together the
//! connection registry, the config store, the dispatcher and the
//! caller-facing tool registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use mb_domain::config::{BridgeConfig, ConfigSeverity, ProviderConfig};
use mb_mcp_client::{
    ConnectionRegistry, ConnectionStatus, ConnectionTestReport, McpToolDef, ProviderStatus,
};

use crate::dispatcher::{bridge_tool, Dispatcher};
use crate::error::BridgeError;
use crate::store::{self, ConfigStore};
use crate::tool_registry::{CallContext, ToolRegistry};
use crate::transformer::CallResult;

/// One configured server as reported by [`ServerManager::list_servers`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub provider_id: String,
    pub config: ProviderConfig,
    pub status: ConnectionStatus,
    pub tool_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerStats {
    pub total_servers: usize,
    pub connected_servers: usize,
    pub disconnected_servers: usize,
    pub error_servers: usize,
    pub total_tools: usize,
    pub servers: Vec<ProviderStatus>,
}

pub struct ServerManager {
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<Dispatcher>,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn ConfigStore>,
}

impl ServerManager {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn ConfigStore>,
        slow_call_threshold: Duration,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry), slow_call_threshold));
        Self {
            registry,
            dispatcher,
            tools: Arc::new(ToolRegistry::new()),
            store,
        }
    }

    /// Build a manager over real transports and connect every enabled
    /// server in `config`.
    pub async fn from_config(config: &BridgeConfig, store: Arc<dyn ConfigStore>) -> Result<Self, BridgeError> {
        let registry = Arc::new(ConnectionRegistry::from_config(config));
        let manager = Self::new(registry, store, config.slow_call_threshold());
        manager.start(&config.mcp_servers).await?;
        Ok(manager)
    }

    /// Persist every server config and connect the enabled ones.
    ///
    /// A server that fails to connect is logged and skipped. Returns how
    /// many connected.
    pub async fn start(&self, servers: &BTreeMap<String, ProviderConfig>) -> Result<usize, BridgeError> {
        let mut connected = 0;
        for (provider_id, config) in servers {
            store::save_server(self.store.as_ref(), provider_id, config).await?;
            if !config.enabled {
                tracing::info!(provider_id = %provider_id, "MCP server disabled, not connecting");
                continue;
            }
            match self.connect(provider_id, config).await {
                Ok(tool_count) => {
                    connected += 1;
                    tracing::info!(provider_id = %provider_id, tool_count, "MCP server ready");
                }
                Err(e) => {
                    tracing::warn!(provider_id = %provider_id, error = %e, "failed to start MCP server");
                }
            }
        }
        tracing::info!(configured = servers.len(), connected, "MCP servers started");
        Ok(connected)
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    // ── servers ──────────────────────────────────────────────────────

    /// Validate, connect, persist and expose the server's tools. Returns
    /// the number of caller-facing tools registered.
    pub async fn add_server(&self, provider_id: &str, config: ProviderConfig) -> Result<usize, BridgeError> {
        let problems: Vec<String> = config
            .validate(provider_id)
            .into_iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .map(|e| e.message)
            .collect();
        if !problems.is_empty() {
            return Err(BridgeError::InvalidConfig(format!(
                "{provider_id}: {}",
                problems.join("; ")
            )));
        }

        let count = self.connect(provider_id, &config).await?;
        if let Err(e) = store::save_server(self.store.as_ref(), provider_id, &config).await {
            tracing::warn!(provider_id, error = %e, "failed to persist MCP server config, disconnecting");
            self.registry.remove_provider(provider_id).await;
            self.tools.unregister_provider(provider_id);
            return Err(e.into());
        }
        Ok(count)
    }

    /// Disconnect, forget the config and drop the server's tools. Returns
    /// whether there was anything to remove.
    pub async fn remove_server(&self, provider_id: &str) -> Result<bool, BridgeError> {
        let disconnected = self.registry.remove_provider(provider_id).await;
        let deleted = store::delete_server(self.store.as_ref(), provider_id).await?;
        let dropped = self.tools.unregister_provider(provider_id);
        tracing::info!(provider_id, disconnected, deleted, dropped_tools = dropped, "MCP server removed");
        Ok(disconnected || deleted)
    }

    /// Every stored server with its current status, enumerated from the
    /// store keys.
    pub async fn list_servers(&self) -> Result<Vec<ServerEntry>, BridgeError> {
        let configs = store::list_servers(self.store.as_ref()).await?;
        let statuses: HashMap<String, ProviderStatus> = self
            .registry
            .list_all_statuses()
            .await
            .into_iter()
            .map(|s| (s.provider_id.clone(), s))
            .collect();

        Ok(configs
            .into_iter()
            .map(|(provider_id, config)| {
                let (status, tool_count) = statuses
                    .get(&provider_id)
                    .map_or((ConnectionStatus::Disconnected, 0), |s| (s.status, s.tool_count));
                ServerEntry {
                    provider_id,
                    config,
                    status,
                    tool_count,
                }
            })
            .collect())
    }

    /// Probe a server and reconnect it once from its stored config if it
    /// is not connected. Caller-facing tools follow the outcome.
    pub async fn test_connection(&self, provider_id: &str) -> Result<ConnectionTestReport, BridgeError> {
        let config = store::load_server(self.store.as_ref(), provider_id).await?;
        let report = self.registry.test_connection(provider_id, config.as_ref()).await;
        if report.reconnected {
            if report.connected {
                self.register_tools(provider_id).await;
            } else {
                self.tools.unregister_provider(provider_id);
            }
        }
        Ok(report)
    }

    /// Test servers one after another; a failure is recorded in its report.
    pub async fn batch_test_connections(&self, provider_ids: &[String]) -> Vec<ConnectionTestReport> {
        let mut reports = Vec::with_capacity(provider_ids.len());
        for provider_id in provider_ids {
            let report = match self.test_connection(provider_id).await {
                Ok(r) => r,
                Err(e) => ConnectionTestReport {
                    provider_id: provider_id.clone(),
                    previous_status: ConnectionStatus::Error,
                    current_status: ConnectionStatus::Error,
                    connected: false,
                    reconnected: false,
                    tool_count: 0,
                    error: Some(e.to_string()),
                },
            };
            reports.push(report);
        }
        reports
    }

    /// Cached catalog of one server.
    pub async fn server_tools(&self, provider_id: &str) -> Vec<McpToolDef> {
        self.registry.list_tools(provider_id).await
    }

    pub async fn stats(&self) -> Result<ServerStats, BridgeError> {
        let servers = self.list_servers().await?;
        let mut stats = ServerStats {
            total_servers: servers.len(),
            ..ServerStats::default()
        };
        for s in servers {
            match s.status {
                ConnectionStatus::Connected => stats.connected_servers += 1,
                ConnectionStatus::Disconnected => stats.disconnected_servers += 1,
                ConnectionStatus::Error => stats.error_servers += 1,
            }
            stats.total_tools += s.tool_count;
            stats.servers.push(ProviderStatus {
                provider_id: s.provider_id,
                status: s.status,
                tool_count: s.tool_count,
            });
        }
        Ok(stats)
    }

    // ── calls ────────────────────────────────────────────────────────

    pub async fn call(&self, tool_id: &str, args: Value, ctx: &CallContext) -> CallResult {
        match self.tools.get(tool_id) {
            Some(tool) => tool.invoke(args, ctx).await,
            None => self.dispatcher.invoke(tool_id, args, ctx).await,
        }
    }

    /// Disconnect every server and drop all tools.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
        self.tools.clear();
    }

    // ── internals ────────────────────────────────────────────────────

    async fn connect(&self, provider_id: &str, config: &ProviderConfig) -> Result<usize, BridgeError> {
        self.registry.add_provider(provider_id, config).await?;
        Ok(self.register_tools(provider_id).await)
    }

    /// Replace the caller-facing tools of `provider_id` with its current
    /// catalog. Tools whose names cannot be encoded are skipped.
    async fn register_tools(&self, provider_id: &str) -> usize {
        self.tools.unregister_provider(provider_id);
        let mut tools = Vec::new();
        for def in self.registry.list_tools(provider_id).await {
            match bridge_tool(&self.dispatcher, provider_id, &def) {
                Ok(tool) => tools.push(tool),
                Err(e) => tracing::warn!(provider_id, tool = %def.name, error = %e, "skipping MCP tool"),
            }
        }
        self.tools.batch_register(tools)
    }
}
