//! Call dispatcher: caller tool id in, [`CallResult`] out.
//!
//! Every failure along the way (bad id, missing connection, unknown tool,
//! coercion, transport) becomes a failed result. Nothing escapes as an
//! error or a panic.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

use mb_domain::trace::{summarize, TraceEvent};
use mb_mcp_client::{ConnectionRegistry, McpToolDef};

use crate::error::BridgeError;
use crate::tool_id::ToolId;
use crate::tool_registry::{BridgeTool, CallContext, ToolHandler};
use crate::transformer::{from_error, from_provider_result, to_provider_args, CallResult, UNKNOWN_PROVIDER};

/// Longest argument/result summary written to the call log.
const SUMMARY_MAX_CHARS: usize = 200;

/// Hex chars of the SHA-256 argument digest kept in the call log.
const DIGEST_HEX_CHARS: usize = 16;

pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    slow_call_threshold: Duration,
}

/// What happened on one dispatch attempt.
struct Attempt {
    /// Arguments as sent to the provider, or as received if the call never
    /// got that far.
    args: Value,
    /// Time spent in the remote call only.
    remote: Duration,
    outcome: Result<Value, BridgeError>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>, slow_call_threshold: Duration) -> Self {
        Self {
            registry,
            slow_call_threshold,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Invoke a caller-facing tool.
    pub async fn invoke(&self, tool_id: &str, args: Value, ctx: &CallContext) -> CallResult {
        let started = Instant::now();

        let Some(id) = ToolId::decode(tool_id) else {
            let err = BridgeError::Malformed(tool_id.to_owned());
            tracing::warn!(tool_id, user_id = ?ctx.user_id, "rejecting malformed tool id");
            self.record(UNKNOWN_PROVIDER, tool_id, &args, Duration::ZERO, Err(&err));
            return from_error(&err, tool_id);
        };

        let attempt = self.dispatch(&id, args).await;
        let duration_ms = attempt.remote.as_millis() as u64;

        let result = match &attempt.outcome {
            Ok(raw) => from_provider_result(raw.clone(), &id.tool_name),
            Err(e) => {
                tracing::warn!(
                    provider_id = %id.provider_id,
                    tool = %id.tool_name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    user_id = ?ctx.user_id,
                    channel_id = ?ctx.channel_id,
                    kind = e.kind(),
                    error = %e,
                    "tool call failed"
                );
                from_error(e, &id.tool_name)
            }
        }
        .with_provider(&id.provider_id)
        .with_duration_ms(duration_ms);

        self.record(
            &id.provider_id,
            &id.tool_name,
            &attempt.args,
            attempt.remote,
            attempt.outcome.as_ref(),
        );
        result
    }

    /// Invoke `(tool_id, args)` pairs one after another. A failing call is
    /// reported in place and does not stop the rest.
    pub async fn invoke_batch(&self, calls: Vec<(String, Value)>, ctx: &CallContext) -> Vec<CallResult> {
        let mut out = Vec::with_capacity(calls.len());
        for (tool_id, args) in calls {
            out.push(self.invoke(&tool_id, args, ctx).await);
        }
        out
    }

    async fn dispatch(&self, id: &ToolId, args: Value) -> Attempt {
        let failed = |args: Value, e: BridgeError| Attempt {
            args,
            remote: Duration::ZERO,
            outcome: Err(e),
        };

        let Some(conn) = self.registry.get_connection(&id.provider_id) else {
            return failed(args, BridgeError::NotConnected(id.provider_id.clone()));
        };
        let Some(tool) = conn.tool(&id.tool_name).await else {
            let e = if conn.is_connected().await {
                BridgeError::NotFound {
                    provider_id: id.provider_id.clone(),
                    tool: id.tool_name.clone(),
                }
            } else {
                BridgeError::NotConnected(id.provider_id.clone())
            };
            return failed(args, e);
        };
        let provider_args = match to_provider_args(&args, &tool.input_schema) {
            Ok(map) => Value::Object(map),
            Err(e) => return failed(args, e),
        };

        let start = Instant::now();
        let outcome = conn
            .call_tool(&id.tool_name, provider_args.clone())
            .await
            .map_err(BridgeError::from);
        Attempt {
            args: provider_args,
            remote: start.elapsed(),
            outcome,
        }
    }

    /// Emit the call-completion event and, past the threshold, a slow-call
    /// warning.
    fn record(
        &self,
        server: &str,
        tool: &str,
        args: &Value,
        remote: Duration,
        outcome: Result<&Value, &BridgeError>,
    ) {
        let duration_ms = remote.as_millis() as u64;
        TraceEvent::ToolCall {
            server: server.to_owned(),
            tool: tool.to_owned(),
            args: summarize(args, SUMMARY_MAX_CHARS),
            args_digest: args_digest(args),
            success: outcome.is_ok(),
            duration_ms,
            result: outcome.ok().map(|v| summarize(v, SUMMARY_MAX_CHARS)),
            error: outcome.err().map(|e| format!("{}: {e}", e.kind())),
        }
        .emit();

        if remote > self.slow_call_threshold {
            TraceEvent::SlowCall {
                operation: format!("tool call {server}.{tool}"),
                duration_ms,
                threshold_ms: self.slow_call_threshold.as_millis() as u64,
            }
            .emit();
        }
    }
}

fn args_digest(args: &Value) -> String {
    let bytes = serde_json::to_vec(args).unwrap_or_default();
    let mut hex = hex::encode(Sha256::digest(&bytes));
    hex.truncate(DIGEST_HEX_CHARS);
    hex
}

// ━━━ Caller-facing handler ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// [`Dispatcher::invoke`] bound to one tool id.
pub struct DispatchHandler {
    dispatcher: Arc<Dispatcher>,
    tool_id: String,
}

impl DispatchHandler {
    pub fn new(dispatcher: Arc<Dispatcher>, tool_id: impl Into<String>) -> Self {
        Self {
            dispatcher,
            tool_id: tool_id.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for DispatchHandler {
    async fn call(&self, args: Value, ctx: &CallContext) -> CallResult {
        self.dispatcher.invoke(&self.tool_id, args, ctx).await
    }
}

/// Build the caller-facing descriptor for a provider tool.
pub fn bridge_tool(
    dispatcher: &Arc<Dispatcher>,
    provider_id: &str,
    def: &McpToolDef,
) -> Result<BridgeTool, BridgeError> {
    let id = ToolId::new(provider_id, &def.name)?.encode();
    let description = if def.description.is_empty() {
        format!("{} (via MCP server {provider_id})", def.name)
    } else {
        def.description.clone()
    };
    let parameters = if def.input_schema.is_null() {
        serde_json::json!({ "type": "object", "properties": {} })
    } else {
        def.input_schema.clone()
    };

    Ok(BridgeTool {
        handler: Arc::new(DispatchHandler::new(Arc::clone(dispatcher), id.clone())),
        id,
        name: format!("{provider_id}_{}", def.name),
        description,
        parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mb_mcp_client::testing::{FakeConnector, FakeProvider};
    use mb_mcp_client::{ProviderConfig, RegistryOptions};
    use serde_json::json;

    async fn setup(provider: FakeProvider) -> (Arc<FakeConnector>, Arc<Dispatcher>) {
        let connector = Arc::new(FakeConnector::new());
        connector.add("files", provider);
        let registry = Arc::new(ConnectionRegistry::new(
            connector.clone(),
            RegistryOptions {
                settle_delay: Duration::ZERO,
                probe_timeout: Duration::from_millis(200),
            },
        ));
        registry
            .add_provider("files", &ProviderConfig::stdio("files-server", Vec::new()))
            .await
            .unwrap();
        let dispatcher = Arc::new(Dispatcher::new(registry, Duration::from_millis(500)));
        (connector, dispatcher)
    }

    fn files() -> FakeProvider {
        FakeProvider::with_tools(&[
            ("read", json!({ "type": "object", "properties": { "path": { "type": "string" } } })),
            ("patch", json!({ "type": "object", "properties": { "ops": { "type": "object" } } })),
        ])
    }

    #[tokio::test]
    async fn coerces_and_reports_success() {
        let (connector, d) = setup(files()).await;
        let r = d
            .invoke("mcp_bridge.files.read", json!({ "path": 123 }), &CallContext::default())
            .await;
        assert!(r.success, "{r:?}");
        assert_eq!(r.metadata.provider_id, "files");
        assert_eq!(r.metadata.provider_tool_name, "read");
        assert_eq!(r.text().as_deref(), Some("read ok"));
        assert_eq!(
            connector.calls(),
            vec![("files".to_string(), "read".to_string(), json!({ "path": "123" }))]
        );
    }

    #[tokio::test]
    async fn malformed_id_fails_without_panicking() {
        let (connector, d) = setup(files()).await;
        for id in ["", "files.read", "mcp_bridge.files.read.x"] {
            let r = d.invoke(id, json!({}), &CallContext::default()).await;
            assert!(!r.success);
            assert!(r.error.as_deref().unwrap().starts_with("malformed"), "{id}");
            assert_eq!(r.metadata.provider_id, UNKNOWN_PROVIDER);
        }
        assert!(connector.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let (connector, d) = setup(files()).await;
        let r = d
            .invoke("mcp_bridge.files.delete", json!({}), &CallContext::default())
            .await;
        assert!(!r.success);
        assert!(r.error.as_deref().unwrap().starts_with("not_found"));
        assert!(r.data.is_none());
        assert!(connector.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_provider_is_not_connected() {
        let (_, d) = setup(files()).await;
        let r = d
            .invoke("mcp_bridge.web.fetch", json!({}), &CallContext::default())
            .await;
        assert!(!r.success);
        assert!(r.error.as_deref().unwrap().starts_with("not_connected"));
        assert_eq!(r.metadata.provider_id, "web");
    }

    #[tokio::test]
    async fn removed_provider_is_not_connected() {
        let (_, d) = setup(files()).await;
        d.registry().remove_provider("files").await;
        let r = d
            .invoke("mcp_bridge.files.read", json!({}), &CallContext::default())
            .await;
        assert!(r.error.as_deref().unwrap().starts_with("not_connected"));
    }

    #[tokio::test]
    async fn coercion_failure_never_reaches_provider() {
        let (connector, d) = setup(files()).await;
        let r = d
            .invoke("mcp_bridge.files.patch", json!({ "ops": "{broken" }), &CallContext::default())
            .await;
        assert!(!r.success);
        assert!(r.error.as_deref().unwrap().starts_with("coercion_error"));
        assert!(connector.calls().is_empty());
    }

    #[tokio::test]
    async fn provider_errors_become_transport_errors() {
        let (connector, d) = setup(files().failing_calls("disk on fire")).await;
        let r = d
            .invoke("mcp_bridge.files.read", json!({ "path": "/a" }), &CallContext::default())
            .await;
        assert!(!r.success);
        let msg = r.error.unwrap();
        assert!(msg.starts_with("transport_error"), "{msg}");
        assert!(msg.contains("disk on fire"));
        assert_eq!(connector.calls().len(), 1);
    }

    #[tokio::test]
    async fn batch_isolates_failures() {
        let (_, d) = setup(files()).await;
        let results = d
            .invoke_batch(
                vec![
                    ("mcp_bridge.files.read".into(), json!({ "path": "a" })),
                    ("bogus".into(), json!({})),
                    ("mcp_bridge.files.read".into(), json!({ "path": "b" })),
                ],
                &CallContext::default(),
            )
            .await;
        let flags: Vec<bool> = results.iter().map(|r| r.success).collect();
        assert_eq!(flags, [true, false, true]);
    }

    #[tokio::test]
    async fn bound_handler_dispatches_its_tool() {
        let (connector, d) = setup(files()).await;
        let def = McpToolDef {
            name: "read".into(),
            description: String::new(),
            input_schema: Value::Null,
        };
        let tool = bridge_tool(&d, "files", &def).unwrap();
        assert_eq!(tool.id, "mcp_bridge.files.read");
        assert_eq!(tool.name, "files_read");
        assert!(tool.description.contains("files"));
        assert_eq!(tool.parameters["type"], "object");

        let ctx = CallContext {
            user_id: Some("u1".into()),
            ..CallContext::default()
        };
        let r = tool.invoke(json!({ "path": "/etc/hosts" }), &ctx).await;
        assert!(r.success);
        assert_eq!(connector.calls()[0].2, json!({ "path": "/etc/hosts" }));
    }

    #[test]
    fn bridge_tool_rejects_unencodable_names() {
        let registry = Arc::new(ConnectionRegistry::new(
            Arc::new(FakeConnector::new()),
            RegistryOptions::default(),
        ));
        let d = Arc::new(Dispatcher::new(registry, Duration::from_millis(500)));
        let def = McpToolDef {
            name: "v1.read".into(),
            description: String::new(),
            input_schema: json!({}),
        };
        assert!(matches!(bridge_tool(&d, "files", &def), Err(BridgeError::Malformed(_))));
    }

    #[test]
    fn digest_is_stable_and_short() {
        let a = args_digest(&json!({ "path": "/a" }));
        assert_eq!(a.len(), DIGEST_HEX_CHARS);
        assert_eq!(a, args_digest(&json!({ "path": "/a" })));
        assert_ne!(a, args_digest(&json!({ "path": "/b" })));
    }
}
