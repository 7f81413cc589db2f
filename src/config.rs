use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::rate_limit::{PolicyOverride, RateBucket, RateLimits};
use crate::request::resolve_base;

/// Production API used when nothing else is configured.
pub const PRODUCTION_BASE_URL: &str = "https://api.registrar.school/api/v1";

/// Same-origin path used when running against a local development host.
pub const DEV_BASE_PATH: &str = "/api/v1";

/// Environment variable that overrides the API base URL.
pub const BASE_URL_ENV: &str = "REGISTRAR_API_URL";

/// Environment variable read by `registrar login`.
pub const PASSWORD_ENV: &str = "REGISTRAR_PASSWORD";

const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "0.0.0.0", "[::1]"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub session: SessionConfig,
  /// Per-bucket overrides keyed by bucket name (`login`, `payment`, ...)
  #[serde(default)]
  pub rate_limits: BTreeMap<String, PolicyOverride>,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Explicit base URL; absolute, or a path resolved against `origin`
  pub base_url: Option<String>,
  /// Origin the client runs under (e.g. "http://localhost:5173")
  pub origin: Option<String>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default = "default_cache_ttl_secs")]
  pub cache_ttl_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: None,
      origin: None,
      timeout_secs: default_timeout_secs(),
      cache_ttl_secs: default_cache_ttl_secs(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  10
}

fn default_cache_ttl_secs() -> u64 {
  300
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
  /// Session database path (defaults to $XDG_DATA_HOME/registrar/session.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
  /// Write logs to this file instead of stderr
  pub file: Option<PathBuf>,
  /// Filter directive used when REGISTRAR_LOG / RUST_LOG are unset
  pub level: Option<String>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./registrar.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/registrar/config.yaml
  ///
  /// Every setting has a default, so finding no file at all is fine.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("registrar.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("registrar").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    // Fail early on misspelled bucket names
    config.rate_limits()?;
    Ok(config)
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.api.timeout_secs)
  }

  pub fn cache_ttl(&self) -> Duration {
    Duration::from_secs(self.api.cache_ttl_secs)
  }

  /// Default quotas with the configured overrides applied.
  pub fn rate_limits(&self) -> Result<RateLimits> {
    let mut limits = RateLimits::default();
    for (name, policy) in &self.rate_limits {
      let bucket = RateBucket::ALL
        .into_iter()
        .find(|b| b.name() == name)
        .ok_or_else(|| eyre!("Unknown rate limit bucket: {}", name))?;
      limits = limits.with_policy(bucket, (*policy).into());
    }
    Ok(limits)
  }

  /// Resolve the API base URL, reading the environment override.
  pub fn base_url(&self) -> Result<Url> {
    self.base_url_with_env(std::env::var(BASE_URL_ENV).ok())
  }

  /// Resolution order: configured override, environment variable, same-origin
  /// path on a local development host, production origin.
  pub fn base_url_with_env(&self, env_override: Option<String>) -> Result<Url> {
    let origin = self
      .api
      .origin
      .as_deref()
      .map(|o| Url::parse(o).map_err(|e| eyre!("Invalid api.origin {}: {}", o, e)))
      .transpose()?;

    let chosen = if let Some(base) = self.api.base_url.as_deref().filter(|b| !b.is_empty()) {
      base.to_string()
    } else if let Some(base) = env_override.filter(|b| !b.is_empty()) {
      base
    } else if origin.as_ref().is_some_and(is_local_host) {
      DEV_BASE_PATH.to_string()
    } else {
      PRODUCTION_BASE_URL.to_string()
    };

    resolve_base(&chosen, origin.as_ref()).map_err(|e| eyre!("{}", e))
  }

  /// Get the login password from the environment.
  pub fn get_password() -> Result<String> {
    std::env::var(PASSWORD_ENV)
      .map_err(|_| eyre!("Password not found. Set {} environment variable.", PASSWORD_ENV))
  }
}

fn is_local_host(origin: &Url) -> bool {
  origin
    .host_str()
    .is_some_and(|host| LOCAL_HOSTS.contains(&host))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_config_uses_defaults() {
    let config = Config::parse("{}").unwrap();
    assert_eq!(config.timeout(), Duration::from_secs(10));
    assert_eq!(config.cache_ttl(), Duration::from_secs(300));
    assert_eq!(
      config.base_url_with_env(None).unwrap().as_str(),
      PRODUCTION_BASE_URL
    );
  }

  #[test]
  fn test_explicit_base_wins() {
    let config = Config::parse("api:\n  base_url: https://staging.test/api/v2\n").unwrap();
    let url = config
      .base_url_with_env(Some("https://env.test/api".to_string()))
      .unwrap();
    assert_eq!(url.as_str(), "https://staging.test/api/v2");
  }

  #[test]
  fn test_env_beats_local_origin() {
    let config = Config::parse("api:\n  origin: http://localhost:5173\n").unwrap();
    let url = config
      .base_url_with_env(Some("https://env.test/api".to_string()))
      .unwrap();
    assert_eq!(url.as_str(), "https://env.test/api");
  }

  #[test]
  fn test_local_origin_uses_same_origin_path() {
    let config = Config::parse("api:\n  origin: http://127.0.0.1:3000\n").unwrap();
    let url = config.base_url_with_env(None).unwrap();
    assert_eq!(url.as_str(), "http://127.0.0.1:3000/api/v1");

    let remote = Config::parse("api:\n  origin: https://portal.school.test\n").unwrap();
    assert_eq!(
      remote.base_url_with_env(None).unwrap().as_str(),
      PRODUCTION_BASE_URL
    );
  }

  #[test]
  fn test_relative_override_resolves_against_origin() {
    let yaml = "api:\n  base_url: /backend\n  origin: https://portal.school.test\n";
    let config = Config::parse(yaml).unwrap();
    assert_eq!(
      config.base_url_with_env(None).unwrap().as_str(),
      "https://portal.school.test/backend"
    );
  }

  #[test]
  fn test_rate_limit_overrides() {
    let yaml = "rate_limits:\n  login:\n    limit: 3\n    window_secs: 60\n";
    let config = Config::parse(yaml).unwrap();
    let limits = config.rate_limits().unwrap();
    assert_eq!(limits.policy(RateBucket::Login).limit, 3);
    assert_eq!(limits.policy(RateBucket::Login).window, Duration::from_secs(60));

    assert!(Config::parse("rate_limits:\n  logn:\n    limit: 3\n    window_secs: 60\n").is_err());
  }
}
