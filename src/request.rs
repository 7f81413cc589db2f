//! Request construction: target URLs, standard headers, body sanitation and
//! multipart parts.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::header::{
  HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, EXPIRES, PRAGMA,
};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use url::Url;

use crate::error::{ApiError, Result};

/// Ordered query parameters. Empty values are skipped when the URL is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, key: &str, value: impl ToString) -> Self {
    self.0.push((key.to_string(), value.to_string()));
    self
  }

  pub fn with_opt<V: ToString>(self, key: &str, value: Option<V>) -> Self {
    match value {
      Some(v) => self.with(key, v),
      None => self,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  fn present(&self) -> impl Iterator<Item = (&str, &str)> {
    self
      .0
      .iter()
      .filter(|(_, v)| !v.trim().is_empty())
      .map(|(k, v)| (k.as_str(), v.as_str()))
  }
}

/// Turn a configured base into an absolute URL. Relative bases (`/api/v1`) are
/// resolved against `origin`.
pub fn resolve_base(base: &str, origin: Option<&Url>) -> Result<Url> {
  match Url::parse(base) {
    Ok(url) => Ok(url),
    Err(url::ParseError::RelativeUrlWithoutBase) => {
      let origin = origin.ok_or_else(|| {
        ApiError::invalid_request(format!("relative base URL {} needs an origin", base))
      })?;
      origin
        .join(base)
        .map_err(|e| ApiError::invalid_request(format!("{}: {}", base, e)))
    }
    Err(e) => Err(ApiError::invalid_request(format!("{}: {}", base, e))),
  }
}

/// Join `endpoint` onto `base` and append the non-empty `params`.
pub fn build_url(base: &Url, endpoint: &str, params: &Params) -> Result<Url> {
  let joined = format!(
    "{}/{}",
    base.as_str().trim_end_matches('/'),
    endpoint.trim_start_matches('/')
  );
  let mut url =
    Url::parse(&joined).map_err(|e| ApiError::invalid_request(format!("{}: {}", joined, e)))?;

  let mut present = params.present().peekable();
  if present.peek().is_some() {
    let mut pairs = url.query_pairs_mut();
    for (k, v) in present {
      pairs.append_pair(k, v);
    }
  }
  Ok(url)
}

const X_REQUESTED_WITH: &str = "x-requested-with";

/// Headers sent with every JSON request.
pub fn standard_headers(token: Option<&str>) -> HeaderMap {
  let mut headers = upload_headers(token);
  headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
  headers
}

/// Same as [`standard_headers`] without a content type, so the transport can set
/// the multipart boundary.
pub fn upload_headers(token: Option<&str>) -> HeaderMap {
  let mut headers = HeaderMap::new();
  headers.insert(
    HeaderName::from_static(X_REQUESTED_WITH),
    HeaderValue::from_static("XMLHttpRequest"),
  );
  headers.insert(
    CACHE_CONTROL,
    HeaderValue::from_static("no-cache, no-store, must-revalidate"),
  );
  headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
  headers.insert(EXPIRES, HeaderValue::from_static("0"));

  if let Some(token) = token.filter(|t| !t.is_empty()) {
    match HeaderValue::from_str(&format!("Bearer {}", token)) {
      Ok(mut value) => {
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
      }
      Err(_) => tracing::warn!("stored access token is not a valid header value, sending without it"),
    }
  }
  headers
}

static SCRIPT_BLOCK: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("valid regex"));
static HTML_TAG: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?is)</?[a-z!][^>]*>").expect("valid regex"));
static JS_SCHEME: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)javascript\s*:").expect("valid regex"));
static EVENT_HANDLER: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)(<[^>]*?)\bon[a-z]+\s*=").expect("valid regex"));

/// Strip markup that could be injected into a rendering context.
///
/// Runs to a fixed point: removing one construct can join its neighbours into
/// a new one (`<<b>script>`). Surrounding whitespace is kept.
pub fn sanitize_str(input: &str) -> String {
  let mut current = input.to_string();
  loop {
    let out = EVENT_HANDLER.replace_all(&current, "$1");
    let out = SCRIPT_BLOCK.replace_all(&out, "");
    let out = HTML_TAG.replace_all(&out, "");
    let out = JS_SCHEME.replace_all(&out, "");
    if out == current {
      return current;
    }
    current = out.into_owned();
  }
}

/// Sanitize every string leaf of a JSON value. Object keys are left alone.
pub fn sanitize(value: Value) -> Value {
  match value {
    Value::String(s) => Value::String(sanitize_str(&s)),
    Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
    Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, sanitize(v))).collect()),
    other => other,
  }
}

/// One field of a multipart upload.
///
/// Owned so the form can be rebuilt when a request is replayed after a token
/// refresh.
#[derive(Debug, Clone)]
pub enum UploadPart {
  Text {
    name: String,
    value: String,
  },
  File {
    name: String,
    file_name: String,
    mime: Option<String>,
    bytes: Vec<u8>,
  },
}

impl UploadPart {
  pub fn text(name: &str, value: impl Into<String>) -> Self {
    UploadPart::Text {
      name: name.to_string(),
      value: value.into(),
    }
  }

  pub fn file(name: &str, file_name: &str, mime: Option<&str>, bytes: Vec<u8>) -> Self {
    UploadPart::File {
      name: name.to_string(),
      file_name: file_name.to_string(),
      mime: mime.map(String::from),
      bytes,
    }
  }
}

/// Build a fresh multipart form. Text values are sanitized like JSON bodies.
pub fn build_form(parts: &[UploadPart]) -> Result<Form> {
  let mut form = Form::new();
  for part in parts {
    form = match part {
      UploadPart::Text { name, value } => form.text(name.clone(), sanitize_str(value)),
      UploadPart::File {
        name,
        file_name,
        mime,
        bytes,
      } => {
        let mut file = Part::bytes(bytes.clone()).file_name(file_name.clone());
        if let Some(mime) = mime {
          file = file
            .mime_str(mime)
            .map_err(|e| ApiError::invalid_request(format!("mime type {}: {}", mime, e)))?;
        }
        form.part(name.clone(), file)
      }
    };
  }
  Ok(form)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn base() -> Url {
    Url::parse("https://api.school.test/api/v1").unwrap()
  }

  #[test]
  fn test_build_url_joins_paths() {
    let url = build_url(&base(), "/users", &Params::new()).unwrap();
    assert_eq!(url.as_str(), "https://api.school.test/api/v1/users");

    let trailing = Url::parse("https://api.school.test/api/v1/").unwrap();
    let url = build_url(&trailing, "classes/3", &Params::new()).unwrap();
    assert_eq!(url.as_str(), "https://api.school.test/api/v1/classes/3");
  }

  #[test]
  fn test_build_url_skips_empty_params() {
    let params = Params::new()
      .with("page", 2)
      .with("search", "")
      .with("role", "  ")
      .with_opt::<&str>("class_id", None)
      .with_opt("term", Some("first"));
    let url = build_url(&base(), "/students", &params).unwrap();
    assert_eq!(
      url.as_str(),
      "https://api.school.test/api/v1/students?page=2&term=first"
    );
  }

  #[test]
  fn test_resolve_relative_base_against_origin() {
    let origin = Url::parse("http://localhost:5173").unwrap();
    let url = resolve_base("/api/v1", Some(&origin)).unwrap();
    assert_eq!(url.as_str(), "http://localhost:5173/api/v1");

    assert!(resolve_base("/api/v1", None).is_err());
    assert_eq!(
      resolve_base("https://x.test/api", None).unwrap().as_str(),
      "https://x.test/api"
    );
  }

  #[test]
  fn test_standard_headers() {
    let headers = standard_headers(Some("abc"));
    assert_eq!(headers[CONTENT_TYPE], "application/json");
    assert_eq!(headers["x-requested-with"], "XMLHttpRequest");
    assert_eq!(headers[PRAGMA], "no-cache");
    assert_eq!(headers[AUTHORIZATION], "Bearer abc");

    let anonymous = standard_headers(None);
    assert!(anonymous.get(AUTHORIZATION).is_none());
  }

  #[test]
  fn test_upload_headers_have_no_content_type() {
    let headers = upload_headers(Some("abc"));
    assert!(headers.get(CONTENT_TYPE).is_none());
    assert!(headers.get(AUTHORIZATION).is_some());
  }

  #[test]
  fn test_sanitize_strips_script() {
    assert_eq!(sanitize_str("<script>alert(1)</script>John"), "John");
    assert_eq!(sanitize_str("<b>Ada</b> Lovelace"), "Ada Lovelace");
    assert_eq!(sanitize_str("javascript:alert(1)"), "alert(1)");
    assert_eq!(sanitize_str("<img src=x onerror=alert(1)>"), "");
    assert_eq!(sanitize_str("3 < 4 and 5 > 2"), "3 < 4 and 5 > 2");
  }

  #[test]
  fn test_sanitize_strips_constructs_rebuilt_by_removal() {
    assert_eq!(sanitize_str("<<b>script>alert(1)<</b>/script>"), "");
    assert_eq!(sanitize_str("javajavascript:script:alert(1)"), "alert(1)");
    assert_eq!(sanitize_str("<<i>img src=x onerror=alert(1)>"), "");
    // unterminated tags still lose their handlers
    assert_eq!(sanitize_str("<img src=x onerror=alert(1)"), "<img src=x alert(1)");
  }

  #[test]
  fn test_sanitize_leaves_plain_text_alone() {
    assert_eq!(sanitize_str("  pass word  "), "  pass word  ");
    assert_eq!(sanitize_str("one=1"), "one=1");
    assert_eq!(sanitize_str("Done on=time"), "Done on=time");
  }

  #[test]
  fn test_sanitize_walks_nested_values() {
    let body = json!({
      "firstName": "<script>alert(1)</script>John",
      "age": 12,
      "guardians": [{ "name": "<i>Mary</i>" }],
      "active": true
    });
    assert_eq!(
      sanitize(body),
      json!({
        "firstName": "John",
        "age": 12,
        "guardians": [{ "name": "Mary" }],
        "active": true
      })
    );
  }
}
