use serde::Serialize;

/// Structured trace events emitted across all mcp-bridge crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ProviderConnected {
        provider_id: String,
        transport: String,
        tool_count: usize,
        duration_ms: u64,
    },
    ProviderConnectFailed {
        provider_id: String,
        transport: String,
        error: String,
        duration_ms: u64,
    },
    ProviderDisconnected {
        provider_id: String,
    },
    ProviderReconnected {
        provider_id: String,
        previous_status: String,
        current_status: String,
    },
    ToolCall {
        server: String,
        tool: String,
        args: String,
        args_digest: String,
        success: bool,
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SlowCall {
        operation: String,
        duration_ms: u64,
        threshold_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        match self {
            TraceEvent::SlowCall { .. } | TraceEvent::ProviderConnectFailed { .. } => {
                tracing::warn!(trace_event = %json, "mb_event");
            }
            _ => tracing::info!(trace_event = %json, "mb_event"),
        }
    }
}

/// Truncate a summary to at most `max` chars (on a char boundary).
pub fn summarize(value: &serde_json::Value, max: usize) -> String {
    let raw = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if raw.chars().count() <= max {
        raw
    } else {
        let mut out: String = raw.chars().take(max).collect();
        out.push('…');
        out
    }
}
