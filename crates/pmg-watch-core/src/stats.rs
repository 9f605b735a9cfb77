//! Counter extraction for the mail statistics payload.
//!
//! The statistics endpoint answers in more than one shape depending on
//! appliance version: a flat object of counters, an object wrapping a
//! `data` object or list, or a bare list of per-interval objects. A list
//! is summed per key so a multi-day window still yields one counter.

use serde_json::Value;

/// Resolve a numeric counter from a statistics payload.
///
/// Returns `None` when the key is absent in every shape the payload
/// could take, or when its value is not numeric.
#[must_use]
pub fn stat_value(stats: &Value, key: &str) -> Option<f64> {
    match stats {
        Value::Object(map) => {
            if let Some(value) = map.get(key) {
                return value.as_f64();
            }
            match map.get("data") {
                Some(Value::Object(inner)) => inner.get(key).and_then(Value::as_f64),
                Some(Value::Array(items)) => sum_stat_list(items, key),
                _ => None,
            }
        }
        Value::Array(items) => sum_stat_list(items, key),
        _ => None,
    }
}

fn sum_stat_list(items: &[Value], key: &str) -> Option<f64> {
    let mut total = 0.0;
    let mut found = false;
    for item in items {
        if let Some(value) = item.get(key).and_then(Value::as_f64) {
            total += value;
            found = true;
        }
    }
    found.then_some(total)
}
