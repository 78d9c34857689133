//! Parameter transformer.
//!
//! Coerces caller arguments into the shape a provider tool's input schema
//! declares, and wraps provider payloads and errors into [`CallResult`].
//! Everything here is pure.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::BridgeError;

/// Provider id recorded when the real one is not known.
pub const UNKNOWN_PROVIDER: &str = "unknown";

/// Declared type of one schema property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    /// Absent or unrecognised; the value passes through unchanged.
    Unknown,
}

impl SchemaType {
    /// Read the `type` of a property schema. For a type list such as
    /// `["string", "null"]` the first non-null entry wins.
    pub fn of(property: &Value) -> Self {
        match property.get("type") {
            Some(Value::String(t)) => Self::from_name(t),
            Some(Value::Array(types)) => types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null")
                .map_or(Self::Unknown, Self::from_name),
            _ => Self::Unknown,
        }
    }

    fn from_name(name: &str) -> Self {
        match name {
            "string" => Self::String,
            "number" => Self::Number,
            "integer" => Self::Integer,
            "boolean" => Self::Boolean,
            "array" => Self::Array,
            "object" => Self::Object,
            _ => Self::Unknown,
        }
    }
}

/// Declared type of `key` in `schema`.
///
/// Accepts a JSON-Schema object (`{"type":"object","properties":{..}}`)
/// as well as a flat `{key: {"type": ..}}` map.
pub fn declared_type(schema: &Value, key: &str) -> SchemaType {
    let property = match schema.get("properties") {
        Some(props) => props.get(key),
        None => schema.get(key),
    };
    property.map_or(SchemaType::Unknown, SchemaType::of)
}

/// Coerce caller arguments for a tool with input `schema`.
///
/// Null values are dropped; no key absent from `args` is ever added.
/// Scalar mismatches never fail. An `object` property given as a string
/// that does not parse is a [`BridgeError::Coercion`].
pub fn to_provider_args(args: &Value, schema: &Value) -> Result<Map<String, Value>, BridgeError> {
    let input = match args {
        Value::Null => return Ok(Map::new()),
        Value::Object(map) => map,
        other => {
            return Err(BridgeError::Coercion {
                key: "<arguments>".into(),
                expected: "object".into(),
                message: format!("arguments must be an object, got {}", type_name(other)),
            })
        }
    };

    let mut out = Map::with_capacity(input.len());
    for (key, value) in input {
        if value.is_null() {
            continue;
        }
        let coerced = coerce(key, value, declared_type(schema, key))?;
        out.insert(key.clone(), coerced);
    }
    Ok(out)
}

fn coerce(key: &str, value: &Value, ty: SchemaType) -> Result<Value, BridgeError> {
    let coerced = match ty {
        SchemaType::String => match value {
            Value::String(_) => value.clone(),
            Value::Number(n) => Value::String(n.to_string()),
            Value::Bool(b) => Value::String(b.to_string()),
            other => Value::String(other.to_string()),
        },
        SchemaType::Number | SchemaType::Integer => to_number(value),
        SchemaType::Boolean => Value::Bool(truthy(value)),
        SchemaType::Array => match value {
            Value::Array(_) => value.clone(),
            other => Value::Array(vec![other.clone()]),
        },
        SchemaType::Object => match value {
            Value::String(raw) => serde_json::from_str(raw).map_err(|e| BridgeError::Coercion {
                key: key.to_owned(),
                expected: "object".into(),
                message: e.to_string(),
            })?,
            other => other.clone(),
        },
        SchemaType::Unknown => value.clone(),
    };
    Ok(coerced)
}

/// Numeric coercion. Whole numbers become integers; anything that does
/// not read as a finite number is left as it was.
fn to_number(value: &Value) -> Value {
    match value {
        Value::String(raw) => {
            let raw = raw.trim();
            if let Ok(i) = raw.parse::<i64>() {
                return Value::Number(i.into());
            }
            raw.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map_or_else(|| value.clone(), Value::Number)
        }
        Value::Bool(b) => Value::Number(i64::from(*b).into()),
        other => other.clone(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => {
            let s = s.trim();
            !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false"))
        }
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ━━━ Result envelope ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMetadata {
    pub provider_id: String,
    pub provider_tool_name: String,
    pub duration_ms: u64,
}

/// Normalized outcome of a tool call. `data` is set exactly when
/// `success` is true, `error` exactly when it is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: CallMetadata,
}

impl CallResult {
    pub fn with_provider(mut self, provider_id: &str) -> Self {
        self.metadata.provider_id = provider_id.to_owned();
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.metadata.duration_ms = duration_ms;
        self
    }

    /// Text content of an MCP `tools/call` payload, if any.
    pub fn text(&self) -> Option<String> {
        self.data.as_ref().and_then(mb_mcp_client::protocol::text_content)
    }
}

/// Wrap a raw provider payload. Provider id and duration are read from
/// the payload itself when it carries them.
pub fn from_provider_result(raw: Value, provider_tool_name: &str) -> CallResult {
    let provider_id = ["server", "providerId"]
        .iter()
        .find_map(|k| raw.get(*k).and_then(Value::as_str))
        .unwrap_or(UNKNOWN_PROVIDER)
        .to_owned();
    let duration_ms = ["duration", "durationMs"]
        .iter()
        .find_map(|k| raw.get(*k).and_then(Value::as_u64))
        .unwrap_or(0);

    CallResult {
        success: true,
        data: Some(raw),
        error: None,
        metadata: CallMetadata {
            provider_id,
            provider_tool_name: provider_tool_name.to_owned(),
            duration_ms,
        },
    }
}

/// Wrap an error. The message is prefixed with the error's class.
pub fn from_error(err: &BridgeError, provider_tool_name: &str) -> CallResult {
    CallResult {
        success: false,
        data: None,
        error: Some(format!("{}: {err}", err.kind())),
        metadata: CallMetadata {
            provider_id: UNKNOWN_PROVIDER.to_owned(),
            provider_tool_name: provider_tool_name.to_owned(),
            duration_ms: 0,
        },
    }
}
