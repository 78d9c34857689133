//! Drives the stdio transport against a tiny shell-script MCP server.

#![cfg(unix)]

use std::time::Duration;

use mb_mcp_client::{
    ConnectionRegistry, ConnectionStatus, Connector, ProviderConfig, RegistryOptions, TransportConnector,
};
use serde_json::json;
use std::sync::Arc;

/// Answers `initialize`, `tools/list` and `tools/call` by echoing the
/// request id back; notifications get no reply. Prints a log line first
/// to exercise the non-JSON skipping, and sends its own `ping` request
/// reusing the id before each `tools/call` result.
const FAKE_SERVER: &str = r#"
echo "fake server starting"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"capabilities":{}}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"echo","description":"Echo","inputSchema":{"type":"object","properties":{"text":{"type":"string"}}}}]}}\n' "$id" ;;
    *'"method":"tools/call"'*)
      printf '{"jsonrpc":"2.0","id":%s,"method":"ping"}\n' "$id"
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"pong"}],"isError":false}}\n' "$id" ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"Method not found"}}\n' "$id" ;;
  esac
done
"#;

fn script_config() -> ProviderConfig {
    ProviderConfig::stdio("sh", vec!["-c".into(), FAKE_SERVER.into()])
}

#[tokio::test]
async fn connector_handshakes_and_lists_tools() {
    let connector = TransportConnector::new(Duration::from_secs(5));
    let session = connector.connect("script", &script_config()).await.unwrap();

    let tools = session.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "echo");
    assert_eq!(tools[0].input_schema["properties"]["text"]["type"], "string");

    let result = session.call_tool("echo", json!({ "text": "ping" })).await.unwrap();
    assert_eq!(result["content"][0]["text"], "pong");

    session.close().await;
    session.close().await;
}

#[tokio::test]
async fn registry_manages_a_real_process() {
    let registry = ConnectionRegistry::new(
        Arc::new(TransportConnector::new(Duration::from_secs(5))),
        RegistryOptions {
            settle_delay: Duration::from_millis(10),
            probe_timeout: Duration::from_secs(5),
        },
    );

    registry.add_provider("script", &script_config()).await.unwrap();
    assert_eq!(registry.status("script").await, ConnectionStatus::Connected);

    let raw = registry.call_tool("script", "echo", json!({ "text": "hi" })).await.unwrap();
    assert_eq!(mb_mcp_client::protocol::text_content(&raw).as_deref(), Some("pong"));

    assert!(registry.remove_provider("script").await);
    assert_eq!(registry.status("script").await, ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn process_that_exits_fails_to_connect() {
    let connector = TransportConnector::new(Duration::from_secs(5));
    let cfg = ProviderConfig::stdio("sh", vec!["-c".into(), "exit 0".into()]);
    assert!(connector.connect("dead", &cfg).await.is_err());
}
