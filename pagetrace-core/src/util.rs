//! Small helpers shared across the crate

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

/// Current wall clock in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Fresh trace id
pub fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Ten random alphanumerics followed by the epoch millis
pub fn random_mark() -> String {
    let random: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(10)
        .collect();
    format!("{}{}", random, now_millis())
}

/// Deep-merge `patch` into `base`.
///
/// Nulls in the patch are skipped, arrays are concatenated, objects merge
/// recursively and anything else replaces the base value.
pub fn merge_json(base: &mut Value, patch: Value) {
    match (base, patch) {
        (_, Value::Null) => {}
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                let present = base_map.get(&key).is_some_and(|v| !v.is_null());
                if present {
                    if let Some(existing) = base_map.get_mut(&key) {
                        merge_json(existing, value);
                    }
                } else if !value.is_null() {
                    base_map.insert(key, value);
                }
            }
        }
        (Value::Array(base_items), Value::Array(patch_items)) => {
            base_items.extend(patch_items);
        }
        (Value::Array(base_items), value) => base_items.push(value),
        (slot, value) => *slot = value,
    }
}

/// Percent-encode like `encodeURIComponent`
pub fn encode_uri_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_json() {
        let mut base = json!({
            "appId": "shop",
            "collectors": {"api": true, "jsError": {"collect": true, "repeat": true}},
            "tags": ["a"]
        });
        merge_json(
            &mut base,
            json!({
                "appId": null,
                "collectors": {"jsError": {"repeat": false}},
                "tags": ["b"],
                "endpoint": "https://collect.example/r"
            }),
        );

        assert_eq!(base["appId"], "shop");
        assert_eq!(base["collectors"]["api"], true);
        assert_eq!(base["collectors"]["jsError"]["collect"], true);
        assert_eq!(base["collectors"]["jsError"]["repeat"], false);
        assert_eq!(base["tags"], json!(["a", "b"]));
        assert_eq!(base["endpoint"], "https://collect.example/r");
    }

    #[test]
    fn test_encode_uri_component() {
        assert_eq!(encode_uri_component("a b&c=d"), "a%20b%26c%3Dd");
        assert_eq!(encode_uri_component("{\"x\":1}"), "%7B%22x%22%3A1%7D");
        assert_eq!(encode_uri_component("é"), "%C3%A9");
        assert_eq!(encode_uri_component("safe-_.!~*'()"), "safe-_.!~*'()");
    }

    #[test]
    fn test_random_mark_shape() {
        let mark = random_mark();
        assert!(mark.len() > 10);
        assert!(mark[..10].chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(random_mark(), random_mark());
    }
}
