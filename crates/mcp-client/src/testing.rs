//! In-memory [`Connector`] for tests. Enabled by the `test-util` feature.
//!
//! Every session open, close and tool call is appended to a shared event
//! log so tests can assert ordering across reconnects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use mb_domain::config::ProviderConfig;
use crate::error::McpError;
use crate::protocol::McpToolDef;
use crate::session::{Connector, McpSession};
use crate::transport::TransportError;

/// Something that happened against a fake provider.
#[derive(Debug, Clone, PartialEq)]
pub enum FakeEvent {
    Opened {
        provider_id: String,
        session: usize,
        config: ProviderConfig,
    },
    Closed {
        provider_id: String,
        session: usize,
    },
    Called {
        provider_id: String,
        tool: String,
        arguments: Value,
    },
}

/// Behaviour of one fake provider. Clones share their switches.
#[derive(Debug, Clone, Default)]
pub struct FakeProvider {
    tools: Vec<McpToolDef>,
    response: Option<Value>,
    call_error: Option<String>,
    fail_connect: Arc<AtomicBool>,
    fail_list: Arc<AtomicBool>,
    hang_list: Arc<AtomicBool>,
    list_calls: Arc<AtomicUsize>,
}

impl FakeProvider {
    /// A provider advertising `(name, input_schema)` tools.
    pub fn with_tools(tools: &[(&str, Value)]) -> Self {
        Self {
            tools: tools
                .iter()
                .map(|(name, schema)| McpToolDef {
                    name: (*name).to_owned(),
                    description: format!("{name} tool"),
                    input_schema: schema.clone(),
                })
                .collect(),
            ..Self::default()
        }
    }

    /// Answer every call with `response`.
    pub fn responding(mut self, response: Value) -> Self {
        self.response = Some(response);
        self
    }

    /// Fail every call with a protocol error carrying `message`.
    pub fn failing_calls(mut self, message: &str) -> Self {
        self.call_error = Some(message.to_owned());
        self
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make `tools/list` (catalog fetch and probes) fail.
    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Make `tools/list` never answer.
    pub fn set_hang_list(&self, hang: bool) {
        self.hang_list.store(hang, Ordering::SeqCst);
    }
}

/// Connector serving [`FakeProvider`]s by provider id.
#[derive(Default)]
pub struct FakeConnector {
    providers: Mutex<HashMap<String, FakeProvider>>,
    events: Arc<Mutex<Vec<FakeEvent>>>,
    next_session: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, provider_id: &str, provider: FakeProvider) {
        self.providers.lock().insert(provider_id.to_owned(), provider);
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        self.events.lock().clone()
    }

    /// `(provider_id, tool, arguments)` for every call that reached a provider.
    pub fn calls(&self) -> Vec<(String, String, Value)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                FakeEvent::Called { provider_id, tool, arguments } => {
                    Some((provider_id.clone(), tool.clone(), arguments.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// How many times `tools/list` reached the provider.
    pub fn list_calls(&self, provider_id: &str) -> usize {
        self.providers
            .lock()
            .get(provider_id)
            .map_or(0, |p| p.list_calls.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, provider_id: &str, config: &ProviderConfig) -> Result<Box<dyn McpSession>, McpError> {
        let provider = self.providers.lock().get(provider_id).cloned();
        let provider = match provider {
            Some(p) if !p.fail_connect.load(Ordering::SeqCst) => p,
            _ => {
                return Err(McpError::Transport(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no provider process for {provider_id}"),
                ))))
            }
        };

        let session = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        self.events.lock().push(FakeEvent::Opened {
            provider_id: provider_id.to_owned(),
            session,
            config: config.clone(),
        });

        Ok(Box::new(FakeSession {
            provider_id: provider_id.to_owned(),
            session,
            provider,
            closed: AtomicBool::new(false),
            events: Arc::clone(&self.events),
        }))
    }
}

struct FakeSession {
    provider_id: String,
    session: usize,
    provider: FakeProvider,
    closed: AtomicBool,
    events: Arc<Mutex<Vec<FakeEvent>>>,
}

#[async_trait]
impl McpSession for FakeSession {
    async fn list_tools(&self) -> Result<Vec<McpToolDef>, McpError> {
        self.provider.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.provider.hang_list.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.closed.load(Ordering::SeqCst) || self.provider.fail_list.load(Ordering::SeqCst) {
            return Err(McpError::Transport(TransportError::ProcessExited));
        }
        Ok(self.provider.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, McpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::Transport(TransportError::ProcessExited));
        }
        self.events.lock().push(FakeEvent::Called {
            provider_id: self.provider_id.clone(),
            tool: name.to_owned(),
            arguments,
        });
        if let Some(ref msg) = self.provider.call_error {
            return Err(McpError::Protocol(format!("tools/call failed: {msg}")));
        }
        Ok(self.provider.response.clone().unwrap_or_else(|| {
            serde_json::json!({
                "content": [{ "type": "text", "text": format!("{name} ok") }],
                "isError": false
            })
        }))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.events.lock().push(FakeEvent::Closed {
                provider_id: self.provider_id.clone(),
                session: self.session,
            });
        }
    }
}
