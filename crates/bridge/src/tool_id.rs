//! Caller-facing tool ids: `mcp_bridge.<provider_id>.<tool_name>`.

use std::fmt;

use mb_domain::config::ID_SEPARATOR;

use crate::error::BridgeError;

/// Namespace prefix of every id minted by the bridge.
pub const NAMESPACE: &str = "mcp_bridge";

/// A decoded caller-facing tool id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolId {
    pub provider_id: String,
    pub tool_name: String,
}

impl ToolId {
    /// Build an id, rejecting components that would not decode back.
    pub fn new(provider_id: &str, tool_name: &str) -> Result<Self, BridgeError> {
        for (what, part) in [("provider id", provider_id), ("tool name", tool_name)] {
            if part.is_empty() {
                return Err(BridgeError::Malformed(format!("{what} must not be empty")));
            }
            if part.contains(ID_SEPARATOR) {
                return Err(BridgeError::Malformed(format!(
                    "{what} {part:?} contains '{ID_SEPARATOR}'"
                )));
            }
        }
        Ok(Self {
            provider_id: provider_id.to_owned(),
            tool_name: tool_name.to_owned(),
        })
    }

    /// Parse an id. Returns `None` for anything that is not exactly
    /// `NAMESPACE.provider.tool` with non-empty parts.
    pub fn decode(id: &str) -> Option<Self> {
        let rest = id.strip_prefix(NAMESPACE)?.strip_prefix(ID_SEPARATOR)?;
        let mut parts = rest.split(ID_SEPARATOR);
        let provider_id = parts.next().filter(|p| !p.is_empty())?;
        let tool_name = parts.next().filter(|t| !t.is_empty())?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            provider_id: provider_id.to_owned(),
            tool_name: tool_name.to_owned(),
        })
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{NAMESPACE}{ID_SEPARATOR}{}{ID_SEPARATOR}{}",
            self.provider_id, self.tool_name
        )
    }
}

/// Encode `(provider_id, tool_name)` as a caller-facing id.
pub fn encode(provider_id: &str, tool_name: &str) -> Result<String, BridgeError> {
    ToolId::new(provider_id, tool_name).map(|id| id.encode())
}

/// Decode a caller-facing id into `(provider_id, tool_name)`.
pub fn decode(id: &str) -> Option<(String, String)> {
    ToolId::decode(id).map(|t| (t.provider_id, t.tool_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_uses_namespace_and_separator() {
        assert_eq!(encode("files", "read").unwrap(), "mcp_bridge.files.read");
    }

    #[test]
    fn decode_inverts_encode() {
        let pairs = [
            ("files", "read"),
            ("zai-vision", "analyze_image"),
            ("a", "b"),
            ("srv_1", "tool-with-dashes"),
            ("ünïcode", "工具"),
            ("mcp_bridge", "mcp_bridge"),
        ];
        for (p, t) in pairs {
            let id = encode(p, t).unwrap();
            assert_eq!(decode(&id), Some((p.to_string(), t.to_string())), "{id}");
        }
    }

    #[test]
    fn decode_rejects_foreign_and_malformed_ids() {
        let bad = [
            "",
            "mcp_bridge",
            "mcp_bridge.",
            "mcp_bridge.files",
            "mcp_bridge.files.",
            "mcp_bridge..read",
            "mcp_bridge.files.read.extra",
            "mcp_bridgeX.files.read",
            "other.files.read",
            "files.read",
            ".mcp_bridge.files.read",
        ];
        for id in bad {
            assert_eq!(decode(id), None, "{id:?}");
        }
    }

    #[test]
    fn encode_rejects_separator_and_empty_components() {
        assert!(matches!(encode("my.server", "read"), Err(BridgeError::Malformed(_))));
        assert!(matches!(encode("files", "read.all"), Err(BridgeError::Malformed(_))));
        assert!(matches!(encode("", "read"), Err(BridgeError::Malformed(_))));
        assert!(matches!(encode("files", ""), Err(BridgeError::Malformed(_))));
    }

    #[test]
    fn distinct_pairs_never_collide() {
        let a = encode("ab", "c").unwrap();
        let b = encode("a", "bc").unwrap();
        assert_ne!(a, b);
    }
}
