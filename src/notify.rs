//! User-facing notifications.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
  Success,
  Info,
  Warning,
  Error,
}

/// A single toast-style message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
  pub level: NoticeLevel,
  pub message: String,
}

impl Notice {
  pub fn success(message: impl Into<String>) -> Self {
    Self {
      level: NoticeLevel::Success,
      message: message.into(),
    }
  }

  pub fn error(message: impl Into<String>) -> Self {
    Self {
      level: NoticeLevel::Error,
      message: message.into(),
    }
  }
}

/// Where the client reports outcomes the user should see.
pub trait Notifier: Send + Sync {
  fn notify(&self, notice: &Notice);

  /// The session is gone for good; send the user back to the login entry point.
  fn login_required(&self);
}

/// Writes notices to the log. Used when nothing else is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
  fn notify(&self, notice: &Notice) {
    match notice.level {
      NoticeLevel::Error => tracing::error!(message = %notice.message, "notice"),
      NoticeLevel::Warning => tracing::warn!(message = %notice.message, "notice"),
      NoticeLevel::Success | NoticeLevel::Info => {
        tracing::info!(message = %notice.message, "notice")
      }
    }
  }

  fn login_required(&self) {
    tracing::info!("session ended, login required");
  }
}

/// Records everything it is told. Handy for assertions.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
  notices: Mutex<Vec<Notice>>,
  login_redirects: Mutex<usize>,
}

impl MemoryNotifier {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn notices(&self) -> Vec<Notice> {
    self.notices.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  pub fn errors(&self) -> Vec<String> {
    self
      .notices()
      .into_iter()
      .filter(|n| n.level == NoticeLevel::Error)
      .map(|n| n.message)
      .collect()
  }

  pub fn login_redirects(&self) -> usize {
    *self.login_redirects.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl Notifier for MemoryNotifier {
  fn notify(&self, notice: &Notice) {
    self
      .notices
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(notice.clone());
  }

  fn login_required(&self) {
    *self.login_redirects.lock().unwrap_or_else(|e| e.into_inner()) += 1;
  }
}
