//! Closed error taxonomy for the HTTP access layer.
//!
//! Every failure is classified once, at the boundary where the response (or the
//! transport error) is observed. Callers match on [`ErrorKind`] instead of probing
//! the response body.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

/// Result alias used across the library.
pub type Result<T, E = ApiError> = std::result::Result<T, E>;

/// What went wrong with a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  /// 422 - field level validation failed on the server
  Validation,
  /// 400 - malformed or rejected request
  BadRequest,
  /// 401 - access token expired and could not be refreshed
  AuthExpired,
  /// 403
  Forbidden,
  /// 404
  NotFound,
  /// 5xx
  ServerUnavailable,
  /// 429 from the server
  RateLimited,
  /// Rejected locally by the client-side rate limiter, no request was sent
  ClientRateLimited,
  /// The request exceeded its time budget and was cancelled
  Timeout,
  /// Connection refused, DNS failure and similar transport errors
  NetworkUnreachable,
  /// Any other non-success status
  Http,
  /// The payload did not match the expected shape
  Decode,
  /// The session store failed
  Storage,
  /// The request could not be built (bad URL, unserializable body)
  InvalidRequest,
}

/// Error returned by every client call.
///
/// Cloneable so that one failed network call can be handed to every caller that
/// was coalesced onto it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
  kind: ErrorKind,
  status: Option<u16>,
  body: Value,
  message: String,
  field_errors: BTreeMap<String, Vec<String>>,
  retry_after: Option<Duration>,
}

impl ApiError {
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      status: None,
      body: Value::Null,
      message: message.into(),
      field_errors: BTreeMap::new(),
      retry_after: None,
    }
  }

  /// Classify a non-success response.
  pub fn from_status(status: StatusCode, body: Value) -> Self {
    let kind = match status.as_u16() {
      400 => ErrorKind::BadRequest,
      401 => ErrorKind::AuthExpired,
      403 => ErrorKind::Forbidden,
      404 => ErrorKind::NotFound,
      422 => ErrorKind::Validation,
      429 => ErrorKind::RateLimited,
      s if s >= 500 => ErrorKind::ServerUnavailable,
      _ => ErrorKind::Http,
    };

    let field_errors = extract_field_errors(&body);
    let message = body_message(&body).unwrap_or_else(|| default_message(kind, status));

    Self {
      kind,
      status: Some(status.as_u16()),
      body,
      message,
      field_errors,
      retry_after: None,
    }
  }

  /// Local rate limit rejection, `wait` is the time until the window frees up.
  pub fn client_rate_limited(wait: Duration) -> Self {
    let secs = wait_seconds(wait);
    let mut err = Self::new(
      ErrorKind::ClientRateLimited,
      format!(
        "Too many requests. Please try again in {} second{}.",
        secs,
        if secs == 1 { "" } else { "s" }
      ),
    );
    err.retry_after = Some(wait);
    err
  }

  /// Caller-side validation failure, shaped like a 422 from the backend.
  pub fn validation(field_errors: BTreeMap<String, Vec<String>>) -> Self {
    let summary = field_errors
      .iter()
      .map(|(field, msgs)| format!("{}: {}", field, msgs.join(", ")))
      .collect::<Vec<_>>()
      .join("; ");
    let mut err = Self::new(ErrorKind::Validation, summary);
    err.field_errors = field_errors;
    err
  }

  pub fn timeout(budget: Duration) -> Self {
    Self::new(
      ErrorKind::Timeout,
      format!(
        "Request timed out after {} seconds. Please check your connection and try again.",
        budget.as_secs()
      ),
    )
  }

  pub fn network(detail: impl std::fmt::Display) -> Self {
    Self::new(
      ErrorKind::NetworkUnreachable,
      format!("Unable to reach the server: {}", detail),
    )
  }

  pub fn decode(detail: impl std::fmt::Display) -> Self {
    Self::new(
      ErrorKind::Decode,
      format!("Unexpected response from server: {}", detail),
    )
  }

  pub fn storage(detail: impl std::fmt::Display) -> Self {
    Self::new(ErrorKind::Storage, format!("Session storage error: {}", detail))
  }

  pub fn invalid_request(detail: impl std::fmt::Display) -> Self {
    Self::new(ErrorKind::InvalidRequest, format!("Invalid request: {}", detail))
  }

  /// Session could not be restored; keeps status and body of the refresh
  /// failure when there was one.
  pub fn session_expired(cause: Option<&ApiError>) -> Self {
    let mut err = Self::new(
      ErrorKind::AuthExpired,
      "Your session has expired. Please log in again.",
    );
    if let Some(cause) = cause {
      err.status = cause.status;
      err.body = cause.body.clone();
    }
    err
  }

  pub fn kind(&self) -> ErrorKind {
    self.kind
  }

  pub fn status(&self) -> Option<u16> {
    self.status
  }

  pub fn body(&self) -> &Value {
    &self.body
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  pub fn field_errors(&self) -> &BTreeMap<String, Vec<String>> {
    &self.field_errors
  }

  pub fn retry_after(&self) -> Option<Duration> {
    self.retry_after
  }

  /// Text shown to the user, `None` when presentation is left to the caller.
  pub fn notice_text(&self) -> Option<String> {
    match self.kind {
      ErrorKind::Forbidden | ErrorKind::AuthExpired => None,
      ErrorKind::Validation => {
        if self.field_errors.is_empty() {
          Some(format!("Validation failed: {}", self.message))
        } else {
          let fields = self
            .field_errors
            .iter()
            .map(|(field, msgs)| format!("{}: {}", field, msgs.join(", ")))
            .collect::<Vec<_>>()
            .join("; ");
          Some(format!("Validation failed: {}", fields))
        }
      }
      ErrorKind::RateLimited => {
        Some("Too many requests. Please wait a moment and try again later.".to_string())
      }
      ErrorKind::ServerUnavailable => {
        Some("Server is unavailable. Please try again later.".to_string())
      }
      _ => Some(self.message.clone()),
    }
  }
}

fn wait_seconds(wait: Duration) -> u64 {
  let secs = wait.as_secs();
  if wait.subsec_nanos() > 0 {
    secs + 1
  } else {
    secs.max(1)
  }
}

fn body_message(body: &Value) -> Option<String> {
  ["message", "error", "detail"]
    .iter()
    .find_map(|field| body.get(field).and_then(Value::as_str))
    .filter(|m| !m.trim().is_empty())
    .map(String::from)
}

fn default_message(kind: ErrorKind, status: StatusCode) -> String {
  match kind {
    ErrorKind::Validation => "The submitted data is invalid.".to_string(),
    ErrorKind::BadRequest => "The request was rejected by the server.".to_string(),
    ErrorKind::AuthExpired => "Your session has expired. Please log in again.".to_string(),
    ErrorKind::Forbidden => "You do not have permission to perform this action.".to_string(),
    ErrorKind::NotFound => "The requested resource was not found.".to_string(),
    ErrorKind::RateLimited => "Too many requests. Please try again later.".to_string(),
    ErrorKind::ServerUnavailable => "Server is unavailable. Please try again later.".to_string(),
    _ => format!("Request failed with status {}", status.as_u16()),
  }
}

/// `errors` may be `{field: "msg"}`, `{field: ["msg", ...]}` or a list of
/// `{field, message}` objects.
fn extract_field_errors(body: &Value) -> BTreeMap<String, Vec<String>> {
  let mut out = BTreeMap::new();
  match body.get("errors") {
    Some(Value::Object(map)) => {
      for (field, value) in map {
        let msgs = match value {
          Value::String(s) => vec![s.clone()],
          Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
          other => vec![other.to_string()],
        };
        if !msgs.is_empty() {
          out.insert(field.clone(), msgs);
        }
      }
    }
    Some(Value::Array(items)) => {
      for item in items {
        let field = item.get("field").or_else(|| item.get("param"));
        let msg = item.get("message").or_else(|| item.get("msg"));
        if let (Some(Value::String(field)), Some(Value::String(msg))) = (field, msg) {
          out.entry(field.clone()).or_insert_with(Vec::new).push(msg.clone());
        }
      }
    }
    _ => {}
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_status_classification() {
    let cases = [
      (400, ErrorKind::BadRequest),
      (401, ErrorKind::AuthExpired),
      (403, ErrorKind::Forbidden),
      (404, ErrorKind::NotFound),
      (409, ErrorKind::Http),
      (422, ErrorKind::Validation),
      (429, ErrorKind::RateLimited),
      (500, ErrorKind::ServerUnavailable),
      (503, ErrorKind::ServerUnavailable),
    ];
    for (code, kind) in cases {
      let status = StatusCode::from_u16(code).unwrap();
      assert_eq!(ApiError::from_status(status, Value::Null).kind(), kind, "{}", code);
    }
  }

  #[test]
  fn test_validation_notice_lists_fields() {
    let body = json!({
      "message": "Validation failed",
      "errors": { "email": ["is taken"], "first_name": "is required" }
    });
    let err = ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, body);
    assert_eq!(err.field_errors().len(), 2);
    assert_eq!(
      err.notice_text().unwrap(),
      "Validation failed: email: is taken; first_name: is required"
    );
  }

  #[test]
  fn test_validation_errors_as_list() {
    let body = json!({ "errors": [{ "field": "score", "message": "must be <= 100" }] });
    let err = ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, body);
    assert_eq!(err.field_errors()["score"], vec!["must be <= 100".to_string()]);
  }

  #[test]
  fn test_validation_without_fields_is_generic() {
    let err = ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, json!({}));
    assert_eq!(
      err.notice_text().unwrap(),
      "Validation failed: The submitted data is invalid."
    );
  }

  #[test]
  fn test_forbidden_and_auth_defer_to_caller() {
    let forbidden = ApiError::from_status(StatusCode::FORBIDDEN, json!({}));
    let expired = ApiError::session_expired(None);
    assert!(forbidden.notice_text().is_none());
    assert!(expired.notice_text().is_none());
  }

  #[test]
  fn test_server_message_is_kept() {
    let err = ApiError::from_status(StatusCode::NOT_FOUND, json!({ "message": "No such class" }));
    assert_eq!(err.message(), "No such class");
    assert_eq!(err.status(), Some(404));
  }

  #[test]
  fn test_client_rate_limited_rounds_up() {
    let err = ApiError::client_rate_limited(Duration::from_millis(4_200));
    assert_eq!(err.kind(), ErrorKind::ClientRateLimited);
    assert!(err.message().contains("5 seconds"), "{}", err.message());

    let err = ApiError::client_rate_limited(Duration::from_millis(300));
    assert!(err.message().contains("1 second."), "{}", err.message());
  }
}
