//! Provider sessions: the seam between connection management and the
//! wire protocol.
//!
//! [`McpSession`] is one live, exclusively owned session with a provider.
//! [`Connector`] opens sessions from a [`ProviderConfig`]. The default
//! [`TransportConnector`] speaks MCP over stdio or HTTP; tests plug in
//! their own connector.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use mb_domain::config::{ProviderConfig, TransportKind};
use crate::error::McpError;
use crate::protocol::{self, method, McpToolDef, ToolCallParams, ToolsListResult};
use crate::transport::{HttpTransport, McpTransport, StdioTransport};

/// Upper bound on `tools/list` pages fetched in one listing.
const MAX_TOOL_PAGES: usize = 64;

/// One live session with a provider.
#[async_trait]
pub trait McpSession: Send + Sync {
    /// Ask the provider for its current tool catalog.
    async fn list_tools(&self) -> Result<Vec<McpToolDef>, McpError>;

    /// Invoke a tool and return the provider's raw result payload.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, McpError>;

    /// Close the session. Must be idempotent.
    async fn close(&self);
}

/// Opens sessions to providers.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, provider_id: &str, config: &ProviderConfig) -> Result<Box<dyn McpSession>, McpError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpClient
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// MCP client over any [`McpTransport`].
pub struct McpClient {
    provider_id: String,
    transport: Box<dyn McpTransport>,
}

impl McpClient {
    /// Run the MCP handshake (`initialize` + `notifications/initialized`).
    ///
    /// The transport is shut down if the handshake fails, so a failed
    /// client never leaves a process or session behind.
    pub async fn initialize(provider_id: &str, transport: Box<dyn McpTransport>) -> Result<Self, McpError> {
        let client = Self {
            provider_id: provider_id.to_owned(),
            transport,
        };
        if let Err(e) = client.handshake().await {
            client.transport.shutdown().await;
            return Err(e);
        }
        Ok(client)
    }

    async fn handshake(&self) -> Result<(), McpError> {
        let params = serde_json::to_value(protocol::initialize_params())
            .map_err(|e| McpError::Protocol(format!("failed to serialize initialize params: {e}")))?;
        self.request(method::INITIALIZE, Some(params)).await?;
        tracing::debug!(provider_id = %self.provider_id, "initialize response received");

        self.transport.send_notification(method::INITIALIZED).await?;
        tracing::debug!(provider_id = %self.provider_id, "sent notifications/initialized");
        Ok(())
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let resp = self.transport.send_request(method, params).await?;
        resp.into_result()
            .map_err(|err| McpError::Protocol(format!("{method} failed: {err}")))
    }
}

#[async_trait]
impl McpSession for McpClient {
    async fn list_tools(&self) -> Result<Vec<McpToolDef>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let value = self.request(method::TOOLS_LIST, params).await?;
            let page: ToolsListResult = serde_json::from_value(value)
                .map_err(|e| McpError::Protocol(format!("failed to parse tools/list result: {e}")))?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        tracing::warn!(
            provider_id = %self.provider_id,
            pages = MAX_TOOL_PAGES,
            "tools/list pagination limit reached, catalog truncated"
        );
        Ok(tools)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, McpError> {
        if !self.transport.is_alive() {
            return Err(McpError::NotConnected(self.provider_id.clone()));
        }
        let params = serde_json::to_value(ToolCallParams {
            name: name.to_owned(),
            arguments,
        })
        .map_err(|e| McpError::Protocol(format!("failed to serialize tools/call params: {e}")))?;
        self.request(method::TOOLS_CALL, Some(params)).await
    }

    async fn close(&self) {
        tracing::debug!(provider_id = %self.provider_id, "closing MCP session");
        self.transport.shutdown().await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TransportConnector
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Default connector: stdio subprocesses and HTTP endpoints.
#[derive(Debug, Clone)]
pub struct TransportConnector {
    request_timeout: Duration,
}

impl TransportConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl Connector for TransportConnector {
    async fn connect(&self, provider_id: &str, config: &ProviderConfig) -> Result<Box<dyn McpSession>, McpError> {
        let transport: Box<dyn McpTransport> = match config.transport {
            TransportKind::Stdio => Box::new(StdioTransport::spawn(config, self.request_timeout)?),
            TransportKind::Http => Box::new(HttpTransport::connect(config, self.request_timeout)?),
        };
        let client = McpClient::initialize(provider_id, transport).await?;
        Ok(Box::new(client))
    }
}
