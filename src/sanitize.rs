//! Recursive cleaning of inbound JSON payloads.
//!
//! Every string leaf is capped at [`MAX_STRING_CHARS`] characters and loses
//! its angle brackets before any other module sees it.  Object keys, array
//! order and non-string leaves are left untouched.

use serde_json::Value;

/// Upper bound on the length of any string leaf, counted in `char`s.
pub const MAX_STRING_CHARS: usize = 10_000;

/// Return a cleaned copy of the payload.  Never fails.
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_str(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sanitize_value(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Truncate then strip `<` / `>` from a single string.
pub fn sanitize_str(s: &str) -> String {
    s.chars()
        .take(MAX_STRING_CHARS)
        .filter(|c| *c != '<' && *c != '>')
        .collect()
}
