use mb_mcp_client::McpError;

/// Errors surfaced by the bridge.
///
/// The first five variants are the call-path taxonomy; the dispatcher turns
/// every one of them into a failed [`CallResult`](crate::CallResult).
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("malformed tool id: {0}")]
    Malformed(String),

    #[error("MCP server {0} not connected")]
    NotConnected(String),

    #[error("tool {tool} not found on server {provider_id}")]
    NotFound { provider_id: String, tool: String },

    #[error("{0}")]
    Transport(String),

    #[error("cannot coerce argument {key} to {expected}: {message}")]
    Coercion {
        key: String,
        expected: String,
        message: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Store(#[from] mb_domain::error::Error),
}

impl BridgeError {
    /// Stable class label, used as the prefix of failed call messages.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Malformed(_) => "malformed",
            BridgeError::NotConnected(_) => "not_connected",
            BridgeError::NotFound { .. } => "not_found",
            BridgeError::Transport(_) => "transport_error",
            BridgeError::Coercion { .. } => "coercion_error",
            BridgeError::InvalidConfig(_) => "invalid_config",
            BridgeError::Store(_) => "store_error",
        }
    }
}

impl From<McpError> for BridgeError {
    fn from(e: McpError) -> Self {
        match e {
            McpError::NotConnected(id) => BridgeError::NotConnected(id),
            McpError::ToolNotFound { provider_id, tool } => BridgeError::NotFound { provider_id, tool },
            McpError::InvalidConfig { provider_id, message } => {
                BridgeError::InvalidConfig(format!("{provider_id}: {message}"))
            }
            other => BridgeError::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mb_mcp_client::TransportError;

    #[test]
    fn client_errors_map_onto_taxonomy() {
        let e: BridgeError = McpError::NotConnected("files".into()).into();
        assert_eq!(e.kind(), "not_connected");

        let e: BridgeError = McpError::ToolNotFound {
            provider_id: "files".into(),
            tool: "read".into(),
        }
        .into();
        assert_eq!(e.kind(), "not_found");
        assert_eq!(e.to_string(), "tool read not found on server files");

        let e: BridgeError = McpError::Transport(TransportError::ProcessExited).into();
        assert_eq!(e.kind(), "transport_error");
        assert!(e.to_string().contains("process has exited"));

        let e: BridgeError = McpError::Protocol("tools/call failed: nope".into()).into();
        assert_eq!(e.kind(), "transport_error");
    }
}
