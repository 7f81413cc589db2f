//! In-memory response cache and in-flight request registry.
//!
//! Only GET responses are cached. Entries are keyed by `"<METHOD>:<url>"` and
//! expire after a fixed TTL; expired entries are dropped on read. Concurrent
//! requests for the same key share one network call through [`InFlight`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Method;
use serde_json::Value;
use tokio::time::Instant;

use crate::error::ApiError;

/// Default time-to-live for cached responses.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Build the cache key for a request.
pub fn cache_key(method: &Method, url: &str) -> String {
  format!("{}:{}", method.as_str(), url)
}

/// A cached payload and when it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub data: Value,
  pub timestamp: Instant,
}

/// TTL cache for unwrapped response payloads.
#[derive(Debug)]
pub struct ResponseCache {
  entries: Mutex<HashMap<String, CacheEntry>>,
  ttl: Duration,
}

impl Default for ResponseCache {
  fn default() -> Self {
    Self::new(DEFAULT_TTL)
  }
}

impl ResponseCache {
  pub fn new(ttl: Duration) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      ttl,
    }
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  fn is_stale(&self, timestamp: Instant) -> bool {
    Instant::now().duration_since(timestamp) > self.ttl
  }

  /// Fresh entry for `key`, if any. A stale entry is removed.
  pub fn get(&self, key: &str) -> Option<CacheEntry> {
    let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
    match entries.get(key) {
      Some(entry) if !self.is_stale(entry.timestamp) => Some(entry.clone()),
      Some(_) => {
        entries.remove(key);
        None
      }
      None => None,
    }
  }

  pub fn set(&self, key: &str, data: Value) {
    let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
    entries.insert(
      key.to_string(),
      CacheEntry {
        data,
        timestamp: Instant::now(),
      },
    );
  }

  pub fn invalidate(&self, key: &str) -> bool {
    let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
    entries.remove(key).is_some()
  }

  /// Drop every entry whose key starts with `prefix`. Returns how many went.
  pub fn invalidate_prefix(&self, prefix: &str) -> usize {
    let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
    let before = entries.len();
    entries.retain(|key, _| !key.starts_with(prefix));
    before - entries.len()
  }

  pub fn clear(&self) {
    let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
    entries.clear();
  }

  pub fn len(&self) -> usize {
    let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
    entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// A network call whose outcome can be awaited by several callers.
pub type SharedResponse = Shared<BoxFuture<'static, Result<Value, ApiError>>>;

/// Registry of outstanding requests, at most one per key.
#[derive(Default)]
pub struct InFlight {
  pending: Mutex<HashMap<String, SharedResponse>>,
}

impl InFlight {
  pub fn new() -> Self {
    Self::default()
  }

  /// Return the outstanding request for `key`, or register the one produced by
  /// `make`. The bool is `true` when the caller joined an existing request.
  ///
  /// The registered future is wrapped so that the entry is removed as soon as
  /// it settles, whatever the outcome. `make` runs under the registry lock and
  /// must not touch the registry itself.
  pub fn join_or_insert<F, Fut>(self: &Arc<Self>, key: &str, make: F) -> (SharedResponse, bool)
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
  {
    let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(existing) = pending.get(key) {
      return (existing.clone(), true);
    }

    let registry = Arc::clone(self);
    let owned_key = key.to_string();
    let request = make();
    let shared = async move {
      let outcome = request.await;
      registry.remove(&owned_key);
      outcome
    }
    .boxed()
    .shared();

    pending.insert(key.to_string(), shared.clone());
    (shared, false)
  }

  pub fn contains(&self, key: &str) -> bool {
    let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
    pending.contains_key(key)
  }

  pub fn len(&self) -> usize {
    let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
    pending.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn remove(&self, key: &str) {
    let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
    pending.remove(key);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ErrorKind;
  use serde_json::json;
  use std::sync::atomic::{AtomicU32, Ordering};

  #[test]
  fn test_cache_key_format() {
    assert_eq!(
      cache_key(&Method::GET, "https://api.test/api/v1/users?page=1"),
      "GET:https://api.test/api/v1/users?page=1"
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_entry_expires_after_ttl() {
    let cache = ResponseCache::new(Duration::from_secs(300));
    cache.set("GET:/users", json!([1, 2]));

    tokio::time::advance(Duration::from_secs(299)).await;
    assert_eq!(cache.get("GET:/users").unwrap().data, json!([1, 2]));

    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(cache.get("GET:/users").is_none());
    // expired entries are dropped on read
    assert!(cache.is_empty());
  }

  #[test]
  fn test_invalidation() {
    let cache = ResponseCache::default();
    cache.set("GET:https://api.test/users", json!(1));
    cache.set("GET:https://api.test/users?page=2", json!(2));
    cache.set("GET:https://api.test/classes", json!(3));

    assert!(cache.invalidate("GET:https://api.test/classes"));
    assert!(!cache.invalidate("GET:https://api.test/classes"));
    assert_eq!(cache.invalidate_prefix("GET:https://api.test/users"), 2);
    assert!(cache.is_empty());

    cache.set("k", json!(null));
    cache.clear();
    assert_eq!(cache.len(), 0);
  }

  #[tokio::test]
  async fn test_concurrent_joins_share_one_call() {
    let inflight = Arc::new(InFlight::new());
    let calls = Arc::new(AtomicU32::new(0));

    let make = |calls: Arc<AtomicU32>| {
      move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, ApiError>(json!({ "ok": true }))
      }
    };

    let (first, joined_first) = inflight.join_or_insert("GET:/x", make(calls.clone()));
    let (second, joined_second) = inflight.join_or_insert("GET:/x", make(calls.clone()));
    assert!(!joined_first);
    assert!(joined_second);
    assert!(inflight.contains("GET:/x"));

    let (a, b) = tokio::join!(first, second);
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(inflight.is_empty());
  }

  #[tokio::test]
  async fn test_failure_is_shared_and_entry_removed() {
    let inflight = Arc::new(InFlight::new());
    let (first, _) = inflight.join_or_insert("GET:/y", || async {
      Err::<Value, _>(ApiError::network("connection refused"))
    });
    let (second, joined) = inflight.join_or_insert("GET:/y", || async { Ok(json!(1)) });
    assert!(joined);

    let (a, b) = tokio::join!(first, second);
    assert_eq!(a.unwrap_err().kind(), ErrorKind::NetworkUnreachable);
    assert_eq!(b.unwrap_err().kind(), ErrorKind::NetworkUnreachable);
    assert!(!inflight.contains("GET:/y"));
  }
}
