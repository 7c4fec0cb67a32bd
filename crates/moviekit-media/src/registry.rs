//! Process-wide bookkeeping of open movie sessions.
//!
//! At most one open session may exist per (file, role); a duplicate open is
//! rejected synchronously at `open()` time. The host application calls
//! [`SessionRegistry::close_all`] once at shutdown so no file is left
//! truncated by queued, unwritten frames.

use moviekit_core::{MovieError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Whether a session writes or reads its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRole {
    Writer,
    Reader,
}

impl SessionRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Writer => "writer",
            Self::Reader => "reader",
        }
    }
}

/// An open session the registry can drain and close on behalf of the
/// process.
pub trait Session: Send + Sync {
    /// Flush pending work, finalize the file, and join the worker thread.
    /// Must be safe to call more than once.
    fn shutdown(&self);
}

/// Normalize a path into a stable registry key.
///
/// Canonicalization needs the file to exist, which a writer's output does
/// not yet; fall back to joining with the working directory.
pub(crate) fn canonical_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Process-wide set of open writer/reader sessions.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<(PathBuf, SessionRole), Arc<dyn Session>>>,
}

impl SessionRegistry {
    /// Create an empty registry. Most callers want [`Self::global`].
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide registry instance.
    pub fn global() -> &'static SessionRegistry {
        static GLOBAL: OnceLock<SessionRegistry> = OnceLock::new();
        GLOBAL.get_or_init(SessionRegistry::new)
    }

    /// Register an opening session.
    ///
    /// Fails with [`MovieError::SessionExists`] when a session with the
    /// same role is already open on the same file.
    pub fn register(&self, path: &Path, role: SessionRole, session: Arc<dyn Session>) -> Result<()> {
        let key = (canonical_key(path), role);
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&key) {
            return Err(MovieError::SessionExists {
                role: role.as_str(),
                path: key.0,
            });
        }
        sessions.insert(key, session);
        Ok(())
    }

    /// Remove a closing session. Unknown sessions are ignored.
    pub fn deregister(&self, path: &Path, role: SessionRole) {
        self.sessions.lock().remove(&(canonical_key(path), role));
    }

    /// Whether a session with this role is open on this file.
    pub fn contains(&self, path: &Path, role: SessionRole) -> bool {
        self.sessions
            .lock()
            .contains_key(&(canonical_key(path), role))
    }

    /// Number of currently open sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether no sessions are open.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Drain and close every open session.
    ///
    /// Blocks until all queued frames are flushed and all worker threads
    /// have joined. Sessions deregister themselves during shutdown, so the
    /// map is taken first to avoid lock re-entry.
    pub fn close_all(&self) {
        let sessions: Vec<_> = {
            let mut map = self.sessions.lock();
            map.drain().collect()
        };
        if sessions.is_empty() {
            return;
        }
        info!("Closing all open ({}) movie sessions", sessions.len());
        for ((path, role), session) in sessions {
            info!("Closing {} session for {}", role.as_str(), path.display());
            session.shutdown();
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
