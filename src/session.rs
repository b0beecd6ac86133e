//! Session management for Telegram accounts
//!
//! Provides:
//! - Discovery of persisted `<name>.session` files
//! - File-based session locking to prevent parallel use of one session
//! - Opening the SQLite session storage used by grammers

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use grammers_session::storages::SqliteSession;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::SESSION_EXTENSION;
use crate::error::{Error, Result};

/// A named, persisted Telegram login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub name: String,
    pub path: PathBuf,
}

impl Session {
    pub fn new(name: impl Into<String>, dir: &Path) -> Self {
        let name = name.into();
        let path = dir.join(format!("{}.{}", name, SESSION_EXTENSION));
        Self { name, path }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn lock_path(&self) -> PathBuf {
        let mut lock = self.path.clone().into_os_string();
        lock.push(".lock");
        PathBuf::from(lock)
    }
}

/// Find every `*.session` file directly inside `dir`.
///
/// A missing directory yields no sessions. Results are sorted by name.
pub fn discover_sessions(dir: &Path) -> Result<Vec<Session>> {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "Sessions directory does not exist");
        return Ok(Vec::new());
    }

    let suffix = format!(".{}", SESSION_EXTENSION);
    let mut sessions = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "Skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy();
        let Some(name) = file_name.strip_suffix(&suffix) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }

        debug!(session = name, "Found session file");
        sessions.push(Session {
            name: name.to_string(),
            path: entry.path().to_path_buf(),
        });
    }

    sessions.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(sessions)
}

/// Session lock guard that ensures exclusive access to one session file.
pub struct SessionLock {
    lock_file: Option<File>,
    path: PathBuf,
}

impl SessionLock {
    /// Acquire an exclusive lock on the session.
    pub fn acquire(session: &Session) -> Result<Self> {
        let path = session.lock_path();
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::LockError(format!("Failed to open lock file: {}", e)))?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                lock_file: Some(lock_file),
                path,
            }),
            Err(_) => Err(Error::SessionLocked(session.name.clone())),
        }
    }

    /// Release the lock manually
    pub fn release(&mut self) {
        if let Some(file) = self.lock_file.take() {
            let _ = file.unlock();
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Open (creating if needed) the SQLite storage behind a session.
pub fn open_session(session: &Session) -> Result<Arc<SqliteSession>> {
    if let Some(parent) = session.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let storage = SqliteSession::open(&session.path).map_err(|e| {
        Error::SessionNotFound(format!("{}: {}", session.path.display(), e))
    })?;
    Ok(Arc::new(storage))
}
