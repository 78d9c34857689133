//! `mb-bridge` exposes tools discovered on MCP servers to a host
//! tool-calling framework.
//!
//! - [`tool_id`]: stable caller-facing ids (`mcp_bridge.<provider>.<tool>`).
//! - [`tool_registry`]: caller-facing tool descriptors and handlers.
//! - [`transformer`]: schema-typed argument coercion and the normalized
//!   [`CallResult`] envelope.
//! - [`dispatcher`]: resolves an id, coerces arguments, calls the provider
//!   and times the call.
//! - [`store`]: the configuration-store interface plus an in-memory store.
//! - [`manager`]: process-wide facade tying the pieces together.
//! - [`cli`]: the `mcp-bridge` command line.

pub mod cli;
pub mod dispatcher;
pub mod error;
pub mod manager;
pub mod store;
pub mod tool_id;
pub mod tool_registry;
pub mod transformer;

pub use dispatcher::{DispatchHandler, Dispatcher};
pub use error::BridgeError;
pub use manager::{ServerEntry, ServerManager, ServerStats};
pub use store::{ConfigStore, MemoryConfigStore};
pub use tool_id::ToolId;
pub use tool_registry::{BridgeTool, CallContext, ToolHandler, ToolRegistry, ToolSummary};
pub use transformer::{CallMetadata, CallResult, SchemaType};
