//! Response body handling: lenient JSON parsing and envelope unwrapping.

use serde_json::{Map, Value};

/// Parse a response body. Empty or malformed bodies become `{}`.
pub fn parse_body(bytes: &[u8]) -> Value {
  if bytes.iter().all(u8::is_ascii_whitespace) {
    return Value::Object(Map::new());
  }
  serde_json::from_slice(bytes).unwrap_or_else(|e| {
    tracing::debug!(error = %e, len = bytes.len(), "response body is not JSON, treating as empty");
    Value::Object(Map::new())
  })
}

/// Strip the `{success, message, data}` envelope. Bare payloads pass through.
pub fn unwrap_envelope(body: Value) -> Value {
  match body {
    Value::Object(mut map) if is_envelope(&map) => map.remove("data").unwrap_or(Value::Null),
    other => other,
  }
}

fn is_envelope(map: &Map<String, Value>) -> bool {
  matches!(map.get("success"), Some(Value::Bool(_))) && map.contains_key("data")
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_parse_is_lenient() {
    assert_eq!(parse_body(b""), json!({}));
    assert_eq!(parse_body(b"  \n"), json!({}));
    assert_eq!(parse_body(b"<html>oops</html>"), json!({}));
    assert_eq!(parse_body(br#"{"a":1}"#), json!({ "a": 1 }));
    assert_eq!(parse_body(b"[1,2]"), json!([1, 2]));
  }

  #[test]
  fn test_envelope_is_unwrapped() {
    let body = json!({ "success": true, "message": "ok", "data": { "id": 3 } });
    assert_eq!(unwrap_envelope(body), json!({ "id": 3 }));

    let body = json!({ "success": true, "data": null });
    assert_eq!(unwrap_envelope(body), Value::Null);
  }

  #[test]
  fn test_bare_payload_passes_through() {
    let list = json!([{ "id": 1 }]);
    assert_eq!(unwrap_envelope(list.clone()), list);

    // a `data` field alone is not an envelope
    let bare = json!({ "data": [1], "total": 1 });
    assert_eq!(unwrap_envelope(bare.clone()), bare);

    let message_only = json!({ "success": true, "message": "Deleted" });
    assert_eq!(unwrap_envelope(message_only.clone()), message_only);
  }
}
