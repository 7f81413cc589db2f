//! Tracing subscriber setup.

use std::fs;

use color_eyre::{eyre::WrapErr, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Environment variable holding a filter directive, checked before `RUST_LOG`.
pub const LOG_ENV: &str = "REGISTRAR_LOG";

/// Pick the filter directive: environment first, then `-v` count, then the
/// config file, then `warn`.
fn directive(verbosity: u8, config: &LoggingConfig) -> String {
  for var in [LOG_ENV, "RUST_LOG"] {
    if let Ok(value) = std::env::var(var) {
      if !value.trim().is_empty() {
        return value;
      }
    }
  }
  match verbosity {
    0 => config.level.clone().unwrap_or_else(|| "warn".to_string()),
    1 => "registrar=info".to_string(),
    2 => "registrar=debug".to_string(),
    _ => "registrar=trace,reqwest=debug".to_string(),
  }
}

/// Install the global subscriber. Logs go to stderr, or to the configured file
/// through a background writer; keep the returned guard alive until exit so
/// buffered lines get flushed.
pub fn init(verbosity: u8, config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_new(directive(verbosity, config))
    .or_else(|_| EnvFilter::try_new("warn"))
    .wrap_err("invalid log filter")?;

  match &config.file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| ".".into());
      fs::create_dir_all(&dir)
        .wrap_err_with(|| format!("failed to create log directory {}", dir.display()))?;
      let file_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "registrar.log".into());

      let appender = tracing_appender::rolling::never(dir, file_name);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| color_eyre::eyre::eyre!("failed to install logger: {}", e))?;
      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| color_eyre::eyre::eyre!("failed to install logger: {}", e))?;
      Ok(None)
    }
  }
}
