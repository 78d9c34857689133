//! Connection registry: owns every provider connection, keyed by
//! provider id, and orchestrates lifecycle and status across them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use mb_domain::config::{BridgeConfig, ConfigSeverity, ProviderConfig};
use mb_domain::trace::TraceEvent;
use crate::connection::{ConnectionStatus, ProviderConnection};
use crate::error::McpError;
use crate::protocol::McpToolDef;
use crate::session::{Connector, TransportConnector};

/// Timing knobs for the registry.
#[derive(Debug, Clone, Copy)]
pub struct RegistryOptions {
    /// Fixed wait between session establishment and catalog listing.
    pub settle_delay: Duration,
    /// Upper bound for a single status probe.
    pub probe_timeout: Duration,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        let cfg = BridgeConfig::default();
        Self {
            settle_delay: cfg.settle_delay(),
            probe_timeout: cfg.probe_timeout(),
        }
    }
}

/// Status of one provider as reported by [`ConnectionRegistry::list_all_statuses`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub provider_id: String,
    pub status: ConnectionStatus,
    pub tool_count: usize,
}

/// Outcome of [`ConnectionRegistry::test_connection`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTestReport {
    pub provider_id: String,
    pub previous_status: ConnectionStatus,
    pub current_status: ConnectionStatus,
    pub connected: bool,
    /// `true` when a reconnect was attempted.
    pub reconnected: bool,
    pub tool_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One entry of a [`ConnectionRegistry::batch_call_tool`] batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCall {
    pub provider_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// Registry of live provider connections.
///
/// At most one connection exists per provider id. Lifecycle operations on
/// the same id are serialized by a per-id slot lock; lookups never block
/// on a connect in progress.
pub struct ConnectionRegistry {
    connector: Arc<dyn Connector>,
    options: RegistryOptions,
    connections: parking_lot::RwLock<BTreeMap<String, Arc<ProviderConnection>>>,
    slots: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConnectionRegistry {
    pub fn new(connector: Arc<dyn Connector>, options: RegistryOptions) -> Self {
        Self {
            connector,
            options,
            connections: parking_lot::RwLock::new(BTreeMap::new()),
            slots: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Registry speaking MCP over real transports, timed from `config`.
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(
            Arc::new(TransportConnector::new(config.request_timeout())),
            RegistryOptions {
                settle_delay: config.settle_delay(),
                probe_timeout: config.probe_timeout(),
            },
        )
    }

    fn slot(&self, provider_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.slots.lock().entry(provider_id.to_owned()).or_default())
    }

    // ── lifecycle ────────────────────────────────────────────────────

    /// Connect `provider_id`, replacing any existing connection.
    ///
    /// The old connection is removed and closed before the new one is
    /// opened. If the new connect fails the slot stays empty.
    pub async fn add_provider(
        &self,
        provider_id: &str,
        config: &ProviderConfig,
    ) -> Result<Arc<ProviderConnection>, McpError> {
        if let Some(problem) = config
            .validate(provider_id)
            .into_iter()
            .find(|e| e.severity == ConfigSeverity::Error)
        {
            return Err(McpError::InvalidConfig {
                provider_id: provider_id.to_owned(),
                message: problem.message,
            });
        }

        let slot = self.slot(provider_id);
        let guard = slot.lock().await;

        let previous = self.connections.write().remove(provider_id);
        if let Some(old) = previous {
            tracing::info!(provider_id, "replacing existing MCP server connection");
            old.disconnect().await;
        }

        let connected = ProviderConnection::connect(
            provider_id,
            config,
            self.connector.as_ref(),
            self.options.settle_delay,
        )
        .await;
        let conn = match connected {
            Ok(conn) => Arc::new(conn),
            Err(e) => {
                drop(guard);
                self.release_slot(provider_id, slot);
                return Err(e);
            }
        };
        self.connections
            .write()
            .insert(provider_id.to_owned(), Arc::clone(&conn));

        let tool_count = conn.list_tools().await.len();
        tracing::info!(provider_id, tool_count, "MCP server connected");
        Ok(conn)
    }

    /// Disconnect and forget `provider_id`. Returns whether it was present.
    pub async fn remove_provider(&self, provider_id: &str) -> bool {
        let slot = self.slot(provider_id);
        let guard = slot.lock().await;

        let removed = self.connections.write().remove(provider_id);
        let present = match removed {
            Some(conn) => {
                conn.disconnect().await;
                tracing::info!(provider_id, "MCP server removed");
                true
            }
            None => false,
        };

        drop(guard);
        self.release_slot(provider_id, slot);
        present
    }

    /// Forget the slot of `provider_id` unless another lifecycle operation
    /// still holds or waits on it.
    fn release_slot(&self, provider_id: &str, slot: Arc<tokio::sync::Mutex<()>>) {
        drop(slot);
        let mut slots = self.slots.lock();
        if slots.get(provider_id).is_some_and(|s| Arc::strong_count(s) == 1) {
            slots.remove(provider_id);
        }
    }

    /// Disconnect everything. Used on process teardown.
    pub async fn shutdown(&self) {
        let all: Vec<Arc<ProviderConnection>> = {
            let mut map = self.connections.write();
            std::mem::take(&mut *map).into_values().collect()
        };
        if all.is_empty() {
            return;
        }
        tracing::info!(count = all.len(), "shutting down MCP server connections");
        let futs: Vec<_> = all.iter().map(|c| c.disconnect()).collect();
        futures_util::future::join_all(futs).await;
    }

    // ── lookup ───────────────────────────────────────────────────────

    pub fn get_connection(&self, provider_id: &str) -> Option<Arc<ProviderConnection>> {
        self.connections.read().get(provider_id).cloned()
    }

    /// Connected provider ids, sorted.
    pub fn provider_ids(&self) -> Vec<String> {
        self.connections.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<ProviderConnection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Cached catalog of one provider; empty when it is not connected.
    pub async fn list_tools(&self, provider_id: &str) -> Vec<McpToolDef> {
        match self.get_connection(provider_id) {
            Some(conn) => conn.list_tools().await,
            None => Vec::new(),
        }
    }

    /// Cached catalogs of every provider as `(provider_id, tool)` pairs.
    pub async fn list_all_tools(&self) -> Vec<(String, McpToolDef)> {
        let mut out = Vec::new();
        for conn in self.snapshot() {
            let id = conn.provider_id().to_owned();
            out.extend(conn.list_tools().await.into_iter().map(|t| (id.clone(), t)));
        }
        out
    }

    // ── status ───────────────────────────────────────────────────────

    /// Probe one provider. Absent providers are `Disconnected`; a probe
    /// that errors or exceeds the probe timeout is `Error`.
    pub async fn status(&self, provider_id: &str) -> ConnectionStatus {
        match self.get_connection(provider_id) {
            Some(conn) => self.probe(&conn).await.0,
            None => ConnectionStatus::Disconnected,
        }
    }

    /// Status and catalog size, bounded as a whole by the probe timeout.
    /// A timed-out probe reports no tools.
    async fn probe(&self, conn: &ProviderConnection) -> (ConnectionStatus, usize) {
        match tokio::time::timeout(self.options.probe_timeout, conn.probe_status()).await {
            Ok(probed) => probed,
            Err(_) => {
                let err = McpError::ProbeTimeout(self.options.probe_timeout.as_millis() as u64);
                tracing::warn!(provider_id = %conn.provider_id(), error = %err, "status probe failed");
                (ConnectionStatus::Error, 0)
            }
        }
    }

    /// Probe every provider concurrently.
    ///
    /// Each probe is isolated: a failing or hanging provider is reported
    /// as `Error` and does not affect the others.
    pub async fn list_all_statuses(&self) -> Vec<ProviderStatus> {
        let conns = self.snapshot();
        let futs = conns.iter().map(|conn| async move {
            let (status, tool_count) = self.probe(conn).await;
            ProviderStatus {
                provider_id: conn.provider_id().to_owned(),
                status,
                tool_count,
            }
        });
        futures_util::future::join_all(futs).await
    }

    /// Probe `provider_id` and, if it is not connected, rebuild the
    /// connection exactly once.
    ///
    /// `config` overrides the config of the existing connection; one of
    /// the two must be available for a reconnect.
    pub async fn test_connection(
        &self,
        provider_id: &str,
        config: Option<&ProviderConfig>,
    ) -> ConnectionTestReport {
        let previous_status = self.status(provider_id).await;

        if previous_status == ConnectionStatus::Connected {
            return ConnectionTestReport {
                provider_id: provider_id.to_owned(),
                previous_status,
                current_status: previous_status,
                connected: true,
                reconnected: false,
                tool_count: self.list_tools(provider_id).await.len(),
                error: None,
            };
        }

        let config = config
            .cloned()
            .or_else(|| self.get_connection(provider_id).map(|c| c.config().clone()));
        let Some(config) = config else {
            return ConnectionTestReport {
                provider_id: provider_id.to_owned(),
                previous_status,
                current_status: previous_status,
                connected: false,
                reconnected: false,
                tool_count: 0,
                error: Some(format!("no configuration for MCP server {provider_id}")),
            };
        };

        tracing::info!(provider_id, %previous_status, "reconnecting MCP server");
        self.remove_provider(provider_id).await;

        let (current_status, error) = match self.add_provider(provider_id, &config).await {
            Ok(_) => (self.status(provider_id).await, None),
            Err(e) => {
                tracing::warn!(provider_id, error = %e, "reconnect failed");
                (ConnectionStatus::Error, Some(e.to_string()))
            }
        };

        TraceEvent::ProviderReconnected {
            provider_id: provider_id.to_owned(),
            previous_status: previous_status.to_string(),
            current_status: current_status.to_string(),
        }
        .emit();

        ConnectionTestReport {
            provider_id: provider_id.to_owned(),
            previous_status,
            current_status,
            connected: current_status == ConnectionStatus::Connected,
            reconnected: true,
            tool_count: self.list_tools(provider_id).await.len(),
            error,
        }
    }

    // ── calls ────────────────────────────────────────────────────────

    /// Call a tool on a specific provider and return the raw payload.
    pub async fn call_tool(
        &self,
        provider_id: &str,
        tool_name: &str,
        arguments: Value,
    ) -> Result<Value, McpError> {
        let conn = self
            .get_connection(provider_id)
            .ok_or_else(|| McpError::NotConnected(provider_id.to_owned()))?;
        conn.call_tool(tool_name, arguments).await
    }

    /// Run calls one after another; each failure is recorded in place.
    pub async fn batch_call_tool(&self, calls: Vec<BatchCall>) -> Vec<Result<Value, McpError>> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = self
                .call_tool(&call.provider_id, &call.tool_name, call.arguments)
                .await;
            if let Err(ref e) = result {
                tracing::warn!(
                    provider_id = %call.provider_id,
                    tool = %call.tool_name,
                    error = %e,
                    "batch tool call failed"
                );
            }
            results.push(result);
        }
        results
    }
}
