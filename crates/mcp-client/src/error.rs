use crate::transport::TransportError;

/// Errors specific to provider operations.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP server {0} not connected")]
    NotConnected(String),

    #[error("tool {tool} not found on server {provider_id}")]
    ToolNotFound { provider_id: String, tool: String },

    #[error("invalid configuration for server {provider_id}: {message}")]
    InvalidConfig { provider_id: String, message: String },

    #[error("probe timed out after {0}ms")]
    ProbeTimeout(u64),
}

impl From<McpError> for mb_domain::error::Error {
    fn from(e: McpError) -> Self {
        mb_domain::error::Error::Other(e.to_string())
    }
}
