//! Configuration store interface.
//!
//! Keys are dotted paths; provider configs live at `mcpServers.<id>`.
//! The bridge reads and writes through [`ConfigStore`] and never assumes a
//! particular backing store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use mb_domain::config::ProviderConfig;
use mb_domain::error::{Error, Result};

/// Key prefix under which provider configs are stored.
pub const SERVERS_PREFIX: &str = "mcpServers";

pub fn server_key(provider_id: &str) -> String {
    format!("{SERVERS_PREFIX}.{provider_id}")
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;
    async fn has(&self, key: &str) -> Result<bool>;
    async fn clear(&self) -> Result<()>;
    /// Keys starting with `prefix`, sorted.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Ephemeral store. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryConfigStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.write().insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.entries.read().contains_key(key))
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

// ━━━ Typed access to provider configs ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn load_server(store: &dyn ConfigStore, provider_id: &str) -> Result<Option<ProviderConfig>> {
    match store.get(&server_key(provider_id)).await? {
        Some(raw) => serde_json::from_value(raw)
            .map(Some)
            .map_err(|e| Error::Store(format!("{}: {e}", server_key(provider_id)))),
        None => Ok(None),
    }
}

pub async fn save_server(store: &dyn ConfigStore, provider_id: &str, config: &ProviderConfig) -> Result<()> {
    store.set(&server_key(provider_id), serde_json::to_value(config)?).await
}

pub async fn delete_server(store: &dyn ConfigStore, provider_id: &str) -> Result<bool> {
    store.delete(&server_key(provider_id)).await
}

/// Every stored provider config as `(provider_id, config)`, keyed directly
/// by the store key. Entries that do not deserialize are skipped.
pub async fn list_servers(store: &dyn ConfigStore) -> Result<Vec<(String, ProviderConfig)>> {
    let prefix = format!("{SERVERS_PREFIX}.");
    let mut out = Vec::new();
    for key in store.keys(&prefix).await? {
        let Some(provider_id) = key.strip_prefix(&prefix) else {
            continue;
        };
        let Some(raw) = store.get(&key).await? else {
            continue;
        };
        match serde_json::from_value::<ProviderConfig>(raw) {
            Ok(cfg) => out.push((provider_id.to_owned(), cfg)),
            Err(e) => tracing::warn!(key = %key, error = %e, "skipping unreadable MCP server config"),
        }
    }
    Ok(out)
}
