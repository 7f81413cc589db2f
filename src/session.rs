//! Durable client-side session state: access/refresh tokens and the signed-in
//! user.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{ApiError, Result};

/// Keys persisted for a signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
  AuthToken,
  RefreshToken,
  CurrentUser,
  UserId,
}

impl SessionKey {
  pub const ALL: [SessionKey; 4] = [
    SessionKey::AuthToken,
    SessionKey::RefreshToken,
    SessionKey::CurrentUser,
    SessionKey::UserId,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      SessionKey::AuthToken => "authToken",
      SessionKey::RefreshToken => "refreshToken",
      SessionKey::CurrentUser => "currentUser",
      SessionKey::UserId => "userId",
    }
  }
}

/// Key-value storage for session state.
pub trait SessionStore: Send + Sync {
  fn get(&self, key: SessionKey) -> Result<Option<String>>;

  fn set(&self, key: SessionKey, value: &str) -> Result<()>;

  fn remove(&self, key: SessionKey) -> Result<()>;

  /// Remove every session key.
  fn clear(&self) -> Result<()> {
    for key in SessionKey::ALL {
      self.remove(key)?;
    }
    Ok(())
  }
}

/// Session store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
  values: Mutex<HashMap<SessionKey, String>>,
}

impl MemorySessionStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl SessionStore for MemorySessionStore {
  fn get(&self, key: SessionKey) -> Result<Option<String>> {
    let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
    Ok(values.get(&key).cloned())
  }

  fn set(&self, key: SessionKey, value: &str) -> Result<()> {
    let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
    values.insert(key, value.to_string());
    Ok(())
  }

  fn remove(&self, key: SessionKey) -> Result<()> {
    let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
    values.remove(&key);
    Ok(())
  }
}

/// SQLite-backed session store, shared by every process using the same file.
pub struct SqliteSessionStore {
  conn: Mutex<Connection>,
}

impl SqliteSessionStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open or create the store at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| ApiError::storage(format!("failed to create {}: {}", parent.display(), e)))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| ApiError::storage(format!("failed to open {}: {}", path.display(), e)))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Default database path under the user's data directory.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| ApiError::storage("could not determine data directory"))?;

    Ok(data_dir.join("registrar").join("session.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.conn.lock().map_err(|e| ApiError::storage(e))?;
    conn
      .execute_batch(SESSION_SCHEMA)
      .map_err(|e| ApiError::storage(format!("failed to run migrations: {}", e)))?;
    Ok(())
  }
}

const SESSION_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS session (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SessionStore for SqliteSessionStore {
  fn get(&self, key: SessionKey) -> Result<Option<String>> {
    let conn = self.conn.lock().map_err(|e| ApiError::storage(e))?;
    conn
      .query_row(
        "SELECT value FROM session WHERE key = ?",
        params![key.as_str()],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| ApiError::storage(format!("failed to read {}: {}", key.as_str(), e)))
  }

  fn set(&self, key: SessionKey, value: &str) -> Result<()> {
    let conn = self.conn.lock().map_err(|e| ApiError::storage(e))?;
    conn
      .execute(
        "INSERT OR REPLACE INTO session (key, value, updated_at) VALUES (?, ?, datetime('now'))",
        params![key.as_str(), value],
      )
      .map_err(|e| ApiError::storage(format!("failed to write {}: {}", key.as_str(), e)))?;
    Ok(())
  }

  fn remove(&self, key: SessionKey) -> Result<()> {
    let conn = self.conn.lock().map_err(|e| ApiError::storage(e))?;
    conn
      .execute("DELETE FROM session WHERE key = ?", params![key.as_str()])
      .map_err(|e| ApiError::storage(format!("failed to delete {}: {}", key.as_str(), e)))?;
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let conn = self.conn.lock().map_err(|e| ApiError::storage(e))?;
    conn
      .execute("DELETE FROM session", [])
      .map_err(|e| ApiError::storage(format!("failed to clear session: {}", e)))?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn exercise(store: &dyn SessionStore) {
    assert_eq!(store.get(SessionKey::AuthToken).unwrap(), None);

    store.set(SessionKey::AuthToken, "access-1").unwrap();
    store.set(SessionKey::RefreshToken, "refresh-1").unwrap();
    store.set(SessionKey::UserId, "7").unwrap();
    store.set(SessionKey::AuthToken, "access-2").unwrap();
    assert_eq!(store.get(SessionKey::AuthToken).unwrap().as_deref(), Some("access-2"));

    store.remove(SessionKey::UserId).unwrap();
    assert_eq!(store.get(SessionKey::UserId).unwrap(), None);

    store.clear().unwrap();
    for key in SessionKey::ALL {
      assert_eq!(store.get(key).unwrap(), None, "{}", key.as_str());
    }
  }

  #[test]
  fn test_memory_store() {
    exercise(&MemorySessionStore::new());
  }

  #[test]
  fn test_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteSessionStore::open_at(&dir.path().join("nested/session.db")).unwrap();
    exercise(&store);
  }

  #[test]
  fn test_sqlite_store_persists_across_opens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.db");

    SqliteSessionStore::open_at(&path)
      .unwrap()
      .set(SessionKey::RefreshToken, "keep-me")
      .unwrap();

    let reopened = SqliteSessionStore::open_at(&path).unwrap();
    assert_eq!(
      reopened.get(SessionKey::RefreshToken).unwrap().as_deref(),
      Some("keep-me")
    );
  }
}
