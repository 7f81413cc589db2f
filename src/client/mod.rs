//! HTTP access layer.
//!
//! [`HttpClient`] is the single path for every outbound request. A call goes
//! through the client-side rate limiter, has its body sanitized, is served from
//! the response cache or coalesced with an identical in-flight GET when
//! possible, and is otherwise sent with a fixed time budget. Expired access
//! tokens are refreshed once and the request replayed; everything else is
//! classified into an [`ApiError`] and reported through the [`Notifier`].

mod response;


use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tokio::time::Instant;
use url::Url;

use crate::cache::{cache_key, InFlight, ResponseCache, DEFAULT_TTL};
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::notify::{Notice, Notifier, TracingNotifier};
use crate::rate_limit::{RateBucket, RateLimiter, RateLimits};
use crate::request::{build_form, build_url, sanitize, standard_headers, upload_headers, Params, UploadPart};
use crate::session::{MemorySessionStore, SessionKey, SessionStore, SqliteSessionStore};

pub use response::{parse_body, unwrap_envelope};

/// Time budget for a single request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Endpoint that exchanges a refresh token for a new access token.
pub const REFRESH_ENDPOINT: &str = "/auth/refresh";

/// Per-call options.
#[derive(Debug, Clone)]
pub struct RequestOptions {
  pub params: Params,
  pub body: Option<Value>,
  /// Serve GETs from and store them in the response cache
  pub cache: bool,
  /// Attach the bearer token and take part in refresh-and-replay
  pub auth: bool,
  /// Shown after the call succeeds
  pub success_message: Option<String>,
  /// Report failures through the notifier
  pub notify_errors: bool,
}

impl Default for RequestOptions {
  fn default() -> Self {
    Self {
      params: Params::new(),
      body: None,
      cache: true,
      auth: true,
      success_message: None,
      notify_errors: true,
    }
  }
}

impl RequestOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn params(mut self, params: Params) -> Self {
    self.params = params;
    self
  }

  pub fn body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }

  pub fn no_cache(mut self) -> Self {
    self.cache = false;
    self
  }

  pub fn anonymous(mut self) -> Self {
    self.auth = false;
    self
  }

  pub fn success_message(mut self, message: impl Into<String>) -> Self {
    self.success_message = Some(message.into());
    self
  }

  pub fn quiet(mut self) -> Self {
    self.notify_errors = false;
    self
  }
}

/// Request body as it is kept for a possible replay.
#[derive(Debug, Clone)]
enum Payload {
  Json(Option<Value>),
  Multipart(Vec<UploadPart>),
}

/// Where a request is in the refresh-and-replay cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
  /// Sent with the stored access token
  First,
  /// Re-sent once after a successful refresh; a 401 now ends the session
  Replay,
}

pub struct HttpClientBuilder {
  base_url: Url,
  timeout: Duration,
  cache_ttl: Duration,
  limits: RateLimits,
  session: Option<Arc<dyn SessionStore>>,
  notifier: Option<Arc<dyn Notifier>>,
}

impl HttpClientBuilder {
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn cache_ttl(mut self, ttl: Duration) -> Self {
    self.cache_ttl = ttl;
    self
  }

  pub fn rate_limits(mut self, limits: RateLimits) -> Self {
    self.limits = limits;
    self
  }

  pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
    self.session = Some(store);
    self
  }

  pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
    self.notifier = Some(notifier);
    self
  }

  pub fn build(self) -> Result<HttpClient> {
    let http = reqwest::Client::builder()
      .user_agent(concat!("registrar/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| ApiError::invalid_request(format!("failed to create HTTP client: {}", e)))?;

    Ok(HttpClient {
      inner: Arc::new(Inner {
        http,
        base_url: self.base_url,
        timeout: self.timeout,
        cache: ResponseCache::new(self.cache_ttl),
        in_flight: Arc::new(InFlight::new()),
        limiter: RateLimiter::new(),
        limits: self.limits,
        session: self
          .session
          .unwrap_or_else(|| Arc::new(MemorySessionStore::new())),
        notifier: self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier)),
      }),
    })
  }
}

struct Inner {
  http: reqwest::Client,
  base_url: Url,
  timeout: Duration,
  cache: ResponseCache,
  in_flight: Arc<InFlight>,
  limiter: RateLimiter,
  limits: RateLimits,
  session: Arc<dyn SessionStore>,
  notifier: Arc<dyn Notifier>,
}

/// Handle to the access layer. Cheap to clone; clones share cache, registry,
/// limiter and session.
#[derive(Clone)]
pub struct HttpClient {
  inner: Arc<Inner>,
}

impl HttpClient {
  pub fn builder(base_url: Url) -> HttpClientBuilder {
    HttpClientBuilder {
      base_url,
      timeout: DEFAULT_TIMEOUT,
      cache_ttl: DEFAULT_TTL,
      limits: RateLimits::default(),
      session: None,
      notifier: None,
    }
  }

  /// Build a client from configuration, with the durable session store.
  pub fn from_config(config: &Config, notifier: Arc<dyn Notifier>) -> color_eyre::Result<Self> {
    let store = match &config.session.path {
      Some(path) => SqliteSessionStore::open_at(path)?,
      None => SqliteSessionStore::open()?,
    };

    let client = Self::builder(config.base_url()?)
      .timeout(config.timeout())
      .cache_ttl(config.cache_ttl())
      .rate_limits(config.rate_limits()?)
      .session_store(Arc::new(store))
      .notifier(notifier)
      .build()?;
    Ok(client)
  }

  pub fn base_url(&self) -> &Url {
    &self.inner.base_url
  }

  pub fn session(&self) -> &dyn SessionStore {
    self.inner.session.as_ref()
  }

  pub fn notifier(&self) -> &dyn Notifier {
    self.inner.notifier.as_ref()
  }

  pub fn is_authenticated(&self) -> bool {
    matches!(self.inner.session.get(SessionKey::AuthToken), Ok(Some(_)))
  }

  // ==========================================================================
  // Typed helpers
  // ==========================================================================

  pub async fn get<T: DeserializeOwned>(&self, endpoint: &str, params: Params) -> Result<T> {
    self
      .send(Method::GET, endpoint, RequestOptions::new().params(params))
      .await
  }

  /// GET with explicit options (no cache, anonymous, quiet...).
  pub async fn get_with<T: DeserializeOwned>(&self, endpoint: &str, opts: RequestOptions) -> Result<T> {
    self.send(Method::GET, endpoint, opts).await
  }

  pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
    &self,
    endpoint: &str,
    body: &B,
  ) -> Result<T> {
    let opts = RequestOptions::new().body(to_json(body)?);
    self.send(Method::POST, endpoint, opts).await
  }

  pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
    &self,
    endpoint: &str,
    body: &B,
  ) -> Result<T> {
    let opts = RequestOptions::new().body(to_json(body)?);
    self.send(Method::PUT, endpoint, opts).await
  }

  pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
    &self,
    endpoint: &str,
    body: &B,
  ) -> Result<T> {
    let opts = RequestOptions::new().body(to_json(body)?);
    self.send(Method::PATCH, endpoint, opts).await
  }

  pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
    self
      .send(Method::DELETE, endpoint, RequestOptions::new())
      .await
  }

  /// Issue a request and decode the unwrapped payload into `T`. The success
  /// notice, if any, follows a successful decode.
  pub async fn send<T: DeserializeOwned>(
    &self,
    method: Method,
    endpoint: &str,
    mut opts: RequestOptions,
  ) -> Result<T> {
    let success_message = opts.success_message.take();
    let notify_errors = opts.notify_errors;
    let value = self.request(method, endpoint, opts).await?;
    let decoded = serde_json::from_value(value).map_err(|e| {
      let err = ApiError::decode(format!("{}: {}", endpoint, e));
      if notify_errors {
        self.report(&err);
      }
      err
    })?;
    if let Some(message) = success_message {
      self.inner.notifier.notify(&Notice::success(message));
    }
    Ok(decoded)
  }

  /// Multipart upload. Follows the same auth, timeout and refresh rules as JSON
  /// calls but is never cached.
  pub async fn upload<T: DeserializeOwned>(&self, endpoint: &str, parts: Vec<UploadPart>) -> Result<T> {
    let opts = RequestOptions::new();
    let value = self
      .dispatch(Method::POST, endpoint, Payload::Multipart(parts), &opts)
      .await?;
    serde_json::from_value(value).map_err(|e| {
      let err = ApiError::decode(format!("{}: {}", endpoint, e));
      self.report(&err);
      err
    })
  }

  // ==========================================================================
  // Core pipeline
  // ==========================================================================

  /// Issue a request and return the unwrapped JSON payload.
  pub async fn request(&self, method: Method, endpoint: &str, mut opts: RequestOptions) -> Result<Value> {
    let payload = Payload::Json(opts.body.take());
    let value = self.dispatch(method, endpoint, payload, &opts).await?;
    if let Some(message) = &opts.success_message {
      self.inner.notifier.notify(&Notice::success(message.clone()));
    }
    Ok(value)
  }

  async fn dispatch(
    &self,
    method: Method,
    endpoint: &str,
    payload: Payload,
    opts: &RequestOptions,
  ) -> Result<Value> {
    // Failures before anything goes on the wire are reported here, network
    // failures inside `execute`.
    let prepared = self.prepare(endpoint, payload, opts);
    let (url, payload) = match prepared {
      Ok(p) => p,
      Err(e) => {
        if opts.notify_errors {
          self.report(&e);
        }
        return Err(e);
      }
    };

    if method != Method::GET || !opts.cache || !matches!(payload, Payload::Json(_)) {
      return self
        .execute(method, url, payload, opts.auth, opts.notify_errors)
        .await;
    }

    let key = cache_key(&method, url.as_str());
    if let Some(entry) = self.inner.cache.get(&key) {
      tracing::debug!(key = %key, "cache hit");
      return Ok(entry.data);
    }

    let (shared, joined) = self.inner.in_flight.join_or_insert(&key, || {
      let this = self.clone();
      let key = key.clone();
      let (auth, notify_errors) = (opts.auth, opts.notify_errors);
      async move {
        let value = this
          .execute(method, url, payload, auth, notify_errors)
          .await?;
        this.inner.cache.set(&key, value.clone());
        Ok(value)
      }
    });
    if joined {
      tracing::debug!(key = %key, "joined in-flight request");
    }
    shared.await
  }

  /// Rate check, URL construction and body sanitation.
  fn prepare(&self, endpoint: &str, payload: Payload, opts: &RequestOptions) -> Result<(Url, Payload)> {
    let bucket = RateBucket::classify(endpoint);
    let identity = self.inner.session.get(SessionKey::UserId).ok().flatten();
    let limiter_key = bucket.key(identity.as_deref());
    self
      .inner
      .limiter
      .check(&limiter_key, self.inner.limits.policy(bucket))?;

    let url = build_url(&self.inner.base_url, endpoint, &opts.params)?;
    let payload = match payload {
      Payload::Json(body) => Payload::Json(body.map(sanitize)),
      multipart => multipart,
    };
    Ok((url, payload))
  }

  /// Send, refreshing the access token and replaying once on a 401.
  async fn execute(
    &self,
    method: Method,
    url: Url,
    payload: Payload,
    auth: bool,
    notify_errors: bool,
  ) -> Result<Value> {
    let mut attempt = Attempt::First;
    let outcome = loop {
      let token = if auth {
        match self.inner.session.get(SessionKey::AuthToken) {
          Ok(token) => token,
          Err(e) => break Err(e),
        }
      } else {
        None
      };

      match self.send_once(&method, &url, &payload, token.as_deref()).await {
        Err(e) if auth && e.status() == Some(StatusCode::UNAUTHORIZED.as_u16()) => match attempt {
          Attempt::First if self.token_rotated(token.as_deref()) => {
            tracing::debug!(url = %url, "token refreshed while request was in flight, replaying");
            attempt = Attempt::Replay;
          }
          Attempt::First => match self.refresh_session().await {
            Ok(()) => {
              tracing::debug!(url = %url, "replaying request after token refresh");
              attempt = Attempt::Replay;
            }
            Err(refresh_err) => break Err(ApiError::session_expired(Some(&refresh_err))),
          },
          Attempt::Replay => {
            tracing::warn!(url = %url, "request rejected again after refresh");
            self.expire_session();
            break Err(ApiError::session_expired(Some(&e)));
          }
        },
        other => break other,
      }
    };

    if let Err(e) = &outcome {
      if notify_errors {
        self.report(e);
      }
    }
    outcome
  }

  /// One round trip, bounded by the client's timeout.
  async fn send_once(
    &self,
    method: &Method,
    url: &Url,
    payload: &Payload,
    token: Option<&str>,
  ) -> Result<Value> {
    let builder = self.inner.http.request(method.clone(), url.clone());
    let builder = match payload {
      Payload::Json(None) => builder.headers(standard_headers(token)),
      Payload::Json(Some(body)) => builder.headers(standard_headers(token)).json(body),
      Payload::Multipart(parts) => builder
        .headers(upload_headers(token))
        .multipart(build_form(parts)?),
    };

    let budget = self.inner.timeout;
    let started = Instant::now();
    let round_trip = async {
      let response = builder.send().await?;
      let status = response.status();
      let bytes = response.bytes().await?;
      Ok::<_, reqwest::Error>((status, bytes))
    };

    let (status, bytes) = tokio::time::timeout(budget, round_trip)
      .await
      .map_err(|_| ApiError::timeout(budget))?
      .map_err(|e| {
        if e.is_timeout() {
          ApiError::timeout(budget)
        } else {
          ApiError::network(e)
        }
      })?;

    tracing::debug!(
      method = %method,
      url = %url,
      status = status.as_u16(),
      elapsed_ms = started.elapsed().as_millis() as u64,
      "request completed"
    );

    let body = parse_body(&bytes);
    if status.is_success() {
      Ok(unwrap_envelope(body))
    } else {
      Err(ApiError::from_status(status, body))
    }
  }

  // ==========================================================================
  // Session handling
  // ==========================================================================

  /// Whether the stored access token differs from the one a request was sent
  /// with, i.e. someone refreshed it in the meantime.
  fn token_rotated(&self, sent: Option<&str>) -> bool {
    matches!(
      self.inner.session.get(SessionKey::AuthToken),
      Ok(Some(current)) if Some(current.as_str()) != sent
    )
  }

  /// Exchange the refresh token for a new access token. Concurrent callers
  /// share one refresh call.
  async fn refresh_session(&self) -> Result<()> {
    let url = build_url(&self.inner.base_url, REFRESH_ENDPOINT, &Params::new())?;
    let key = cache_key(&Method::POST, url.as_str());
    let (shared, joined) = self.inner.in_flight.join_or_insert(&key, || {
      let this = self.clone();
      async move { this.perform_refresh(url).await.map(|()| Value::Null) }
    });
    if joined {
      tracing::debug!("waiting on refresh already in progress");
    }
    shared.await.map(|_| ())
  }

  async fn perform_refresh(&self, url: Url) -> Result<()> {
    let refresh_token = match self.inner.session.get(SessionKey::RefreshToken) {
      Ok(Some(token)) => token,
      Ok(None) => {
        tracing::info!("no refresh token stored, ending session");
        self.expire_session();
        return Err(ApiError::session_expired(None));
      }
      Err(e) => {
        self.expire_session();
        return Err(e);
      }
    };

    let body = Payload::Json(Some(json!({ "refreshToken": refresh_token })));
    let result = self
      .send_once(&Method::POST, &url, &body, None)
      .await
      .and_then(|data| self.store_tokens(&data));

    match result {
      Ok(()) => {
        tracing::info!("access token refreshed");
        Ok(())
      }
      Err(e) => {
        tracing::warn!(error = %e, "token refresh failed, ending session");
        self.expire_session();
        Err(e)
      }
    }
  }

  /// Persist tokens from a login or refresh payload. The refresh token is only
  /// replaced when the backend rotated it.
  pub(crate) fn store_tokens(&self, data: &Value) -> Result<()> {
    let access = ["accessToken", "access_token", "token"]
      .iter()
      .find_map(|f| data.get(f).and_then(Value::as_str))
      .ok_or_else(|| ApiError::decode("token response carries no access token"))?;
    self.inner.session.set(SessionKey::AuthToken, access)?;

    if let Some(refresh) = ["refreshToken", "refresh_token"]
      .iter()
      .find_map(|f| data.get(f).and_then(Value::as_str))
    {
      self.inner.session.set(SessionKey::RefreshToken, refresh)?;
    }
    Ok(())
  }

  /// Drop all auth state and send the user to login.
  fn expire_session(&self) {
    if let Err(e) = self.inner.session.clear() {
      tracing::warn!(error = %e, "failed to clear session");
    }
    self.inner.notifier.login_required();
  }

  /// Drop all auth state and cached responses (logout).
  pub fn clear_session(&self) -> Result<()> {
    self.inner.cache.clear();
    self.inner.session.clear()
  }

  // ==========================================================================
  // Cache control
  // ==========================================================================

  /// Forget the cached GET for `endpoint` with exactly these params.
  pub fn invalidate(&self, endpoint: &str, params: &Params) -> bool {
    match build_url(&self.inner.base_url, endpoint, params) {
      Ok(url) => self.inner.cache.invalidate(&cache_key(&Method::GET, url.as_str())),
      Err(_) => false,
    }
  }

  /// Forget every cached GET under `endpoint`, whatever the params.
  pub fn invalidate_prefix(&self, endpoint: &str) -> usize {
    match build_url(&self.inner.base_url, endpoint, &Params::new()) {
      Ok(url) => self
        .inner
        .cache
        .invalidate_prefix(&cache_key(&Method::GET, url.as_str())),
      Err(_) => 0,
    }
  }

  pub fn clear_cache(&self) {
    self.inner.cache.clear();
  }

  pub fn cached_entries(&self) -> usize {
    self.inner.cache.len()
  }

  pub(crate) fn report(&self, err: &ApiError) {
    if let Some(text) = err.notice_text() {
      self.inner.notifier.notify(&Notice::error(text));
    }
  }
}

pub(crate) fn to_json<B: Serialize + ?Sized>(body: &B) -> Result<Value> {
  serde_json::to_value(body).map_err(|e| ApiError::invalid_request(format!("body: {}", e)))
}
