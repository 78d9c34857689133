//! Caller-facing tool registry.
//!
//! Holds the descriptors the host framework sees. Listing order is
//! registration order; re-registering an id replaces the descriptor in
//! place.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tool_id::ToolId;
use crate::transformer::CallResult;

/// Who is calling. Passed through to handlers untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Executes a caller-facing tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value, ctx: &CallContext) -> CallResult;
}

/// A caller-facing tool descriptor.
#[derive(Clone)]
pub struct BridgeTool {
    pub id: String,
    pub name: String,
    pub description: String,
    /// JSON-Schema of the arguments.
    pub parameters: Value,
    pub handler: Arc<dyn ToolHandler>,
}

impl BridgeTool {
    pub async fn invoke(&self, args: Value, ctx: &CallContext) -> CallResult {
        self.handler.call(args, ctx).await
    }

    /// Provider this tool routes to, when the id is one the bridge minted.
    pub fn provider_id(&self) -> Option<String> {
        ToolId::decode(&self.id).map(|id| id.provider_id)
    }
}

impl fmt::Debug for BridgeTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeTool")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Serializable view of a [`BridgeTool`] without its handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl From<&BridgeTool> for ToolSummary {
    fn from(t: &BridgeTool) -> Self {
        Self {
            id: t.id.clone(),
            name: t.name.clone(),
            description: t.description.clone(),
            parameters: t.parameters.clone(),
        }
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<IndexMap<String, BridgeTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, returning the descriptor it replaced.
    pub fn register(&self, tool: BridgeTool) -> Option<BridgeTool> {
        tracing::debug!(tool_id = %tool.id, "registering bridge tool");
        self.tools.write().insert(tool.id.clone(), tool)
    }

    pub fn batch_register(&self, tools: impl IntoIterator<Item = BridgeTool>) -> usize {
        let mut map = self.tools.write();
        let mut count = 0;
        for tool in tools {
            map.insert(tool.id.clone(), tool);
            count += 1;
        }
        count
    }

    pub fn unregister(&self, id: &str) -> Option<BridgeTool> {
        self.tools.write().shift_remove(id)
    }

    /// Drop every tool routed to `provider_id`. Returns how many were removed.
    pub fn unregister_provider(&self, provider_id: &str) -> usize {
        let mut map = self.tools.write();
        let before = map.len();
        map.retain(|_, t| t.provider_id().as_deref() != Some(provider_id));
        before - map.len()
    }

    pub fn get(&self, id: &str) -> Option<BridgeTool> {
        self.tools.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<BridgeTool> {
        self.tools.read().values().cloned().collect()
    }

    pub fn summaries(&self) -> Vec<ToolSummary> {
        self.tools.read().values().map(ToolSummary::from).collect()
    }

    pub fn clear(&self) {
        self.tools.write().clear();
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::from_provider_result;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, args: Value, _ctx: &CallContext) -> CallResult {
            from_provider_result(args, "echo")
        }
    }

    fn tool(id: &str, description: &str) -> BridgeTool {
        BridgeTool {
            id: id.into(),
            name: id.replace('.', "_"),
            description: description.into(),
            parameters: json!({ "type": "object" }),
            handler: Arc::new(Echo),
        }
    }

    #[test]
    fn lists_in_registration_order() {
        let reg = ToolRegistry::new();
        reg.register(tool("mcp_bridge.b.one", "1"));
        reg.register(tool("mcp_bridge.a.two", "2"));
        reg.register(tool("mcp_bridge.c.three", "3"));
        let ids: Vec<String> = reg.list().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, ["mcp_bridge.b.one", "mcp_bridge.a.two", "mcp_bridge.c.three"]);
    }

    #[test]
    fn reregister_replaces_in_place() {
        let reg = ToolRegistry::new();
        reg.register(tool("mcp_bridge.a.x", "old"));
        reg.register(tool("mcp_bridge.a.y", "y"));
        let prev = reg.register(tool("mcp_bridge.a.x", "new"));
        assert_eq!(prev.unwrap().description, "old");
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.list()[0].description, "new");
    }

    #[test]
    fn unregister_and_clear() {
        let reg = ToolRegistry::new();
        reg.batch_register([tool("mcp_bridge.a.x", ""), tool("mcp_bridge.a.y", "")]);
        assert!(reg.unregister("mcp_bridge.a.x").is_some());
        assert!(reg.unregister("mcp_bridge.a.x").is_none());
        assert!(reg.get("mcp_bridge.a.y").is_some());
        reg.clear();
        assert!(reg.is_empty());
    }

    #[test]
    fn unregister_provider_only_touches_that_provider() {
        let reg = ToolRegistry::new();
        let n = reg.batch_register([
            tool("mcp_bridge.files.read", ""),
            tool("mcp_bridge.web.fetch", ""),
            tool("mcp_bridge.files.write", ""),
        ]);
        assert_eq!(n, 3);
        assert_eq!(reg.unregister_provider("files"), 2);
        let ids: Vec<String> = reg.list().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, ["mcp_bridge.web.fetch"]);
    }

    #[tokio::test]
    async fn invoke_goes_through_handler() {
        let t = tool("mcp_bridge.a.echo", "");
        let r = t.invoke(json!({ "x": 1 }), &CallContext::default()).await;
        assert!(r.success);
        assert_eq!(r.data, Some(json!({ "x": 1 })));
    }

    #[test]
    fn summary_omits_handler() {
        let reg = ToolRegistry::new();
        reg.register(tool("mcp_bridge.a.x", "desc"));
        let v = serde_json::to_value(reg.summaries()).unwrap();
        assert_eq!(v[0]["id"], "mcp_bridge.a.x");
        assert_eq!(v[0]["description"], "desc");
        assert!(v[0].get("handler").is_none());
    }
}
