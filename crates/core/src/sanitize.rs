//! In-place sanitization of accepted events.
//!
//! Runs after validation has accepted a payload. Validation rejects what is
//! structurally out of bounds; sanitization scrubs what is merely unsafe to
//! pass downstream (control characters, oversize strings, extreme numbers).

use serde_json::{Map, Number, Value};

use crate::schema::ValidationConfig;

/// Sanitizes an event payload in place.
///
/// Top-level strings are scrubbed and the `data` subtree is walked
/// recursively. The top-level `timestamp` is left alone since millisecond
/// epochs exceed the numeric clamp.
pub fn sanitize_event(value: &mut Value, config: &ValidationConfig) {
    let Value::Object(fields) = value else {
        return;
    };

    for (key, field) in fields.iter_mut() {
        if key == "data" {
            if field.is_object() {
                sanitize_value(field, config, 1);
            }
        } else if let Value::String(s) = field {
            *s = sanitize_string(s, config.max_string_length);
        }
    }
}

/// Strips NUL and control characters (except tab and newline) and truncates.
pub fn sanitize_string(value: &str, max_chars: usize) -> String {
    value
        .chars()
        .filter(|&c| c == '\n' || c == '\t' || !c.is_control())
        .take(max_chars)
        .collect()
}

/// Clamps a number into the safe range; non-finite values become zero.
pub fn sanitize_number(n: &Number, magnitude: f64) -> Number {
    if let Some(i) = n.as_i64() {
        let bound = magnitude as i64;
        return Number::from(i.clamp(-bound, bound));
    }
    if let Some(u) = n.as_u64() {
        return Number::from(u.min(magnitude as u64));
    }
    let f = n.as_f64().unwrap_or(0.0);
    let clamped = if f.is_finite() {
        f.clamp(-magnitude, magnitude)
    } else {
        0.0
    };
    Number::from_f64(clamped).unwrap_or_else(|| Number::from(0))
}

fn sanitize_value(value: &mut Value, config: &ValidationConfig, depth: usize) {
    match value {
        Value::String(s) => *s = sanitize_string(s, config.max_string_length),
        Value::Number(n) => *n = sanitize_number(n, config.max_numeric_magnitude),
        Value::Object(map) => {
            if depth > config.max_depth {
                *map = Map::new();
                return;
            }
            map.retain(|key, _| key.chars().count() <= config.max_key_length);
            for child in map.values_mut() {
                sanitize_value(child, config, depth + 1);
            }
        }
        Value::Array(items) => {
            if depth > config.max_depth {
                items.clear();
                return;
            }
            items.truncate(config.max_array_length);
            for item in items.iter_mut() {
                sanitize_value(item, config, depth + 1);
            }
        }
        Value::Bool(_) | Value::Null => {}
    }
}
