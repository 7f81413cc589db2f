//! Client-side request rate limiting.
//!
//! A best-effort guard against hammering sensitive endpoints (login, password
//! reset, payments, score entry). The backend enforces its own limits; nothing
//! here survives a restart.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;

use crate::error::{ApiError, Result};

/// Quota for one bucket: at most `limit` requests per trailing `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
  pub limit: usize,
  pub window: Duration,
}

impl RateLimitPolicy {
  pub const fn new(limit: usize, window: Duration) -> Self {
    Self { limit, window }
  }
}

/// Named endpoint categories, each with its own quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateBucket {
  Login,
  PasswordReset,
  Payment,
  ScoreEntry,
  Default,
}

impl RateBucket {
  pub const ALL: [RateBucket; 5] = [
    RateBucket::Login,
    RateBucket::PasswordReset,
    RateBucket::Payment,
    RateBucket::ScoreEntry,
    RateBucket::Default,
  ];

  /// Pick the bucket for an endpoint path by substring match.
  pub fn classify(endpoint: &str) -> Self {
    let path = endpoint.to_lowercase();
    if path.contains("login") {
      RateBucket::Login
    } else if path.contains("password") || path.contains("forgot") || path.contains("reset") {
      RateBucket::PasswordReset
    } else if path.contains("payment") {
      RateBucket::Payment
    } else if path.contains("score") || path.contains("result") {
      RateBucket::ScoreEntry
    } else {
      RateBucket::Default
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      RateBucket::Login => "login",
      RateBucket::PasswordReset => "password-reset",
      RateBucket::Payment => "payment",
      RateBucket::ScoreEntry => "score-entry",
      RateBucket::Default => "default",
    }
  }

  pub fn default_policy(self) -> RateLimitPolicy {
    match self {
      RateBucket::Login => RateLimitPolicy::new(5, Duration::from_secs(15 * 60)),
      RateBucket::PasswordReset => RateLimitPolicy::new(3, Duration::from_secs(60 * 60)),
      RateBucket::Payment => RateLimitPolicy::new(10, Duration::from_secs(60)),
      RateBucket::ScoreEntry => RateLimitPolicy::new(30, Duration::from_secs(60)),
      RateBucket::Default => RateLimitPolicy::new(100, Duration::from_secs(60)),
    }
  }

  /// Limiter key, e.g. `login:42` or `default:anonymous`.
  pub fn key(self, identity: Option<&str>) -> String {
    format!("{}:{}", self.name(), identity.unwrap_or("anonymous"))
  }
}

/// Per-bucket overrides as they appear in the config file.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct PolicyOverride {
  pub limit: usize,
  pub window_secs: u64,
}

impl From<PolicyOverride> for RateLimitPolicy {
  fn from(o: PolicyOverride) -> Self {
    RateLimitPolicy::new(o.limit, Duration::from_secs(o.window_secs))
  }
}

/// Policy table, defaults plus overrides.
#[derive(Debug, Clone)]
pub struct RateLimits {
  policies: HashMap<RateBucket, RateLimitPolicy>,
}

impl Default for RateLimits {
  fn default() -> Self {
    Self {
      policies: RateBucket::ALL
        .iter()
        .map(|b| (*b, b.default_policy()))
        .collect(),
    }
  }
}

impl RateLimits {
  pub fn with_policy(mut self, bucket: RateBucket, policy: RateLimitPolicy) -> Self {
    self.policies.insert(bucket, policy);
    self
  }

  pub fn policy(&self, bucket: RateBucket) -> RateLimitPolicy {
    self
      .policies
      .get(&bucket)
      .copied()
      .unwrap_or_else(|| bucket.default_policy())
  }
}

/// Sliding-window limiter keyed by `bucket:identity`.
#[derive(Debug, Default)]
pub struct RateLimiter {
  windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Admit and record the request, or reject it without recording.
  pub fn is_allowed(&self, key: &str, policy: RateLimitPolicy) -> bool {
    let now = Instant::now();
    let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
    let window = windows.entry(key.to_string()).or_default();
    prune(window, now, policy.window);

    if window.len() >= policy.limit {
      return false;
    }
    window.push_back(now);
    true
  }

  /// When the oldest retained request leaves the window.
  pub fn reset_time(&self, key: &str, policy: RateLimitPolicy) -> Option<Instant> {
    let now = Instant::now();
    let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
    let window = windows.get_mut(key)?;
    prune(window, now, policy.window);
    window.front().map(|oldest| *oldest + policy.window)
  }

  /// Like [`is_allowed`](Self::is_allowed) but fails with the wait time.
  pub fn check(&self, key: &str, policy: RateLimitPolicy) -> Result<()> {
    if self.is_allowed(key, policy) {
      return Ok(());
    }
    let wait = self
      .reset_time(key, policy)
      .map(|reset| reset.saturating_duration_since(Instant::now()))
      .unwrap_or(policy.window);
    tracing::warn!(key, wait_secs = wait.as_secs(), "client-side rate limit hit");
    Err(ApiError::client_rate_limited(wait))
  }

  /// Forget every recorded request for `key`.
  pub fn reset(&self, key: &str) {
    let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
    windows.remove(key);
  }
}

fn prune(window: &mut VecDeque<Instant>, now: Instant, length: Duration) {
  while let Some(oldest) = window.front() {
    if now.duration_since(*oldest) >= length {
      window.pop_front();
    } else {
      break;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ErrorKind;

  #[test]
  fn test_classify() {
    assert_eq!(RateBucket::classify("/auth/login"), RateBucket::Login);
    assert_eq!(RateBucket::classify("/auth/forgot-password"), RateBucket::PasswordReset);
    assert_eq!(RateBucket::classify("/auth/reset"), RateBucket::PasswordReset);
    assert_eq!(RateBucket::classify("/payments/12"), RateBucket::Payment);
    assert_eq!(RateBucket::classify("/scores/batch"), RateBucket::ScoreEntry);
    assert_eq!(RateBucket::classify("/results/3/approve"), RateBucket::ScoreEntry);
    assert_eq!(RateBucket::classify("/users"), RateBucket::Default);
  }

  #[test]
  fn test_key_uses_identity() {
    assert_eq!(RateBucket::Login.key(Some("42")), "login:42");
    assert_eq!(RateBucket::Default.key(None), "default:anonymous");
  }

  #[test]
  fn test_overrides() {
    let limits = RateLimits::default()
      .with_policy(RateBucket::Payment, RateLimitPolicy::new(2, Duration::from_secs(5)));
    assert_eq!(limits.policy(RateBucket::Payment).limit, 2);
    assert_eq!(limits.policy(RateBucket::Login).limit, 5);
  }

  #[tokio::test(start_paused = true)]
  async fn test_sixth_login_is_rejected() {
    let limiter = RateLimiter::new();
    let policy = RateLimitPolicy::new(5, Duration::from_millis(900_000));

    for _ in 0..5 {
      assert!(limiter.check("login:anonymous", policy).is_ok());
    }

    let err = limiter.check("login:anonymous", policy).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ClientRateLimited);
    assert!(err.message().contains("900 seconds"), "{}", err.message());
  }

  #[tokio::test(start_paused = true)]
  async fn test_rejection_does_not_record() {
    let limiter = RateLimiter::new();
    let policy = RateLimitPolicy::new(1, Duration::from_secs(10));

    assert!(limiter.is_allowed("k", policy));
    let reset = limiter.reset_time("k", policy).unwrap();

    tokio::time::advance(Duration::from_secs(4)).await;
    assert!(!limiter.is_allowed("k", policy));
    // still anchored on the first request
    assert_eq!(limiter.reset_time("k", policy), Some(reset));

    tokio::time::advance(Duration::from_secs(6)).await;
    assert!(limiter.is_allowed("k", policy));
  }

  #[tokio::test(start_paused = true)]
  async fn test_wait_time_counts_down() {
    let limiter = RateLimiter::new();
    let policy = RateLimitPolicy::new(1, Duration::from_secs(60));

    limiter.check("k", policy).unwrap();
    tokio::time::advance(Duration::from_secs(45)).await;

    let err = limiter.check("k", policy).unwrap_err();
    assert!(err.message().contains("15 seconds"), "{}", err.message());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(15)));
  }

  #[test]
  fn test_keys_are_independent() {
    let limiter = RateLimiter::new();
    let policy = RateLimitPolicy::new(1, Duration::from_secs(60));

    assert!(limiter.is_allowed("login:1", policy));
    assert!(limiter.is_allowed("login:2", policy));
    assert!(!limiter.is_allowed("login:1", policy));

    limiter.reset("login:1");
    assert!(limiter.is_allowed("login:1", policy));
  }
}
