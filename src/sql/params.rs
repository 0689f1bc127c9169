//! Convert serde_json::Value into bindable text parameters.
//!
//! Every parameter is sent as text and cast in SQL (`$n::bigint`, `$n::uuid`, ...), so one
//! bind type covers all column kinds.

use serde_json::Value;

/// Text form of a JSON value for binding. `None` binds SQL NULL.
pub fn text_param(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => Some(v.to_string()),
    }
}
