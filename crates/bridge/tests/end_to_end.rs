//! Full call path: manager → tool registry → dispatcher → connection,
//! against in-memory providers.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use mb_bridge::{CallContext, ConfigStore, MemoryConfigStore, ServerManager};
use mb_mcp_client::testing::{FakeConnector, FakeProvider};
use mb_mcp_client::{ConnectionRegistry, ConnectionStatus, ProviderConfig, RegistryOptions};

fn manager(connector: Arc<FakeConnector>, settle_delay: Duration) -> (ServerManager, Arc<MemoryConfigStore>) {
    let registry = Arc::new(ConnectionRegistry::new(
        connector,
        RegistryOptions {
            settle_delay,
            probe_timeout: Duration::from_millis(500),
        },
    ));
    let store = Arc::new(MemoryConfigStore::new());
    (
        ServerManager::new(registry, store.clone(), Duration::from_millis(500)),
        store,
    )
}

#[tokio::test(start_paused = true)]
async fn read_file_through_the_bridge() {
    let connector = Arc::new(FakeConnector::new());
    let payload = json!({ "content": [{ "type": "text", "text": "hello" }], "isError": false });
    connector.add(
        "files",
        FakeProvider::with_tools(&[("read", json!({ "path": { "type": "string" } }))])
            .responding(payload.clone()),
    );
    let (m, store) = manager(connector.clone(), Duration::from_millis(1000));

    let started = tokio::time::Instant::now();
    m.add_server("files", ProviderConfig::stdio("files-server", Vec::new()))
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert!(store.has("mcpServers.files").await.unwrap());

    let tool = m.tools().get("mcp_bridge.files.read").expect("tool registered");
    let result = tool.invoke(json!({ "path": 123 }), &CallContext::default()).await;

    assert_eq!(
        connector.calls(),
        vec![("files".to_string(), "read".to_string(), json!({ "path": "123" }))]
    );
    assert!(result.success);
    assert_eq!(result.data, Some(payload));
    assert!(result.error.is_none());
    assert_eq!(result.metadata.provider_id, "files");
    assert_eq!(result.metadata.provider_tool_name, "read");

    let v = serde_json::to_value(&result).unwrap();
    assert!(v["metadata"]["durationMs"].as_u64().is_some());
}

#[tokio::test]
async fn failures_come_back_as_results() {
    let connector = Arc::new(FakeConnector::new());
    connector.add("files", FakeProvider::with_tools(&[("read", json!({}))]));
    let (m, _) = manager(connector.clone(), Duration::ZERO);
    m.add_server("files", ProviderConfig::stdio("f", Vec::new()))
        .await
        .unwrap();

    let ctx = CallContext::default();
    let cases = [
        ("mcp_bridge.files.nope", "not_found"),
        ("mcp_bridge.web.fetch", "not_connected"),
        ("not-a-bridge-id", "malformed"),
    ];
    for (id, class) in cases {
        let r = m.call(id, json!({ "x": 1 }), &ctx).await;
        assert!(!r.success, "{id}");
        assert!(r.data.is_none());
        assert!(r.error.as_deref().unwrap().starts_with(class), "{id}: {:?}", r.error);
    }
    assert!(connector.calls().is_empty());
}

#[tokio::test]
async fn one_bad_probe_does_not_spoil_the_listing() {
    let connector = Arc::new(FakeConnector::new());
    let flaky = FakeProvider::with_tools(&[("t", json!({}))]);
    connector.add("a", FakeProvider::with_tools(&[("t", json!({}))]));
    connector.add("b", flaky.clone());
    connector.add("c", FakeProvider::with_tools(&[("t", json!({}))]));
    let (m, _) = manager(connector, Duration::ZERO);
    for id in ["a", "b", "c"] {
        m.add_server(id, ProviderConfig::stdio(id, Vec::new()))
            .await
            .unwrap();
    }

    flaky.set_fail_list(true);
    let statuses = m.registry().list_all_statuses().await;
    assert_eq!(statuses.len(), 3);
    let view: Vec<(&str, ConnectionStatus)> =
        statuses.iter().map(|s| (s.provider_id.as_str(), s.status)).collect();
    assert_eq!(
        view,
        [
            ("a", ConnectionStatus::Connected),
            ("b", ConnectionStatus::Error),
            ("c", ConnectionStatus::Connected),
        ]
    );

    let stats = m.stats().await.unwrap();
    assert_eq!(stats.error_servers, 1);
    assert_eq!(stats.connected_servers, 2);
}
