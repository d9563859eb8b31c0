//! # Session Context
//!
//! Holds the bearer token every backend call needs. The context is created
//! once at startup from a [`TokenStore`], handed to whatever talks to the
//! backend, and cleared on logout. There is no global token.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("token must not be empty")]
    EmptyToken,
}

/// What gets persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub saved_at: DateTime<Utc>,
}

/// Persistent key-value storage for the session token.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<StoredSession>, SessionError>;
    fn save(&self, session: &StoredSession) -> Result<(), SessionError>;
    fn clear(&self) -> Result<(), SessionError>;
}

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

/// Stores the session as a small JSON document.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> SessionError {
        SessionError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<StoredSession>, SessionError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, session: &StoredSession) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let body = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, body).map_err(|e| self.io_err(e))?;

        // The token is a credential.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| self.io_err(e))?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }
}

/// In-process store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    inner: RwLock<Option<StoredSession>>,
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<StoredSession>, SessionError> {
        Ok(self.inner.read().clone())
    }

    fn save(&self, session: &StoredSession) -> Result<(), SessionError> {
        *self.inner.write() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        *self.inner.write() = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// The explicit session passed to every network-calling component.
///
/// Cheap to clone; clones share the same token.
#[derive(Clone)]
pub struct SessionContext {
    store: Arc<dyn TokenStore>,
    token: Arc<RwLock<Option<String>>>,
}

impl SessionContext {
    /// Loads whatever the store holds. A missing entry is an anonymous
    /// session, not an error.
    pub fn init(store: Arc<dyn TokenStore>) -> Result<Self, SessionError> {
        let token = store.load()?.map(|s| s.token);
        tracing::debug!(authenticated = token.is_some(), "session loaded");
        Ok(Self {
            store,
            token: Arc::new(RwLock::new(token)),
        })
    }

    /// A session with no persistence, for tests and one-off calls.
    pub fn ephemeral(token: Option<String>) -> Self {
        Self {
            store: Arc::new(MemoryTokenStore::default()),
            token: Arc::new(RwLock::new(token)),
        }
    }

    pub fn login(&self, token: impl Into<String>) -> Result<(), SessionError> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(SessionError::EmptyToken);
        }
        self.store.save(&StoredSession {
            token: token.clone(),
            saved_at: Utc::now(),
        })?;
        *self.token.write() = Some(token);
        tracing::info!("session token stored");
        Ok(())
    }

    /// Forgets the token in memory and in the store.
    pub fn logout(&self) -> Result<(), SessionError> {
        *self.token.write() = None;
        self.store.clear()?;
        tracing::info!("session cleared");
        Ok(())
    }

    /// The current bearer token, read fresh on every call.
    pub fn bearer(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.read().is_some()
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_survives_reload_and_logout_clears_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let store = Arc::new(FileTokenStore::new(&path));

        let ctx = SessionContext::init(store.clone()).unwrap();
        assert!(!ctx.is_authenticated());
        ctx.login("tok-123").unwrap();

        let reloaded = SessionContext::init(Arc::new(FileTokenStore::new(&path))).unwrap();
        assert_eq!(reloaded.bearer().as_deref(), Some("tok-123"));

        reloaded.logout().unwrap();
        assert!(!path.exists());
        assert!(reloaded.bearer().is_none());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn clones_share_the_token() {
        let ctx = SessionContext::ephemeral(None);
        let other = ctx.clone();
        ctx.login("abc").unwrap();
        assert_eq!(other.bearer().as_deref(), Some("abc"));
        other.logout().unwrap();
        assert!(!ctx.is_authenticated());
    }

    #[test]
    fn blank_token_is_rejected() {
        let ctx = SessionContext::ephemeral(None);
        assert!(matches!(ctx.login("   "), Err(SessionError::EmptyToken)));
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();
        let err = SessionContext::init(Arc::new(FileTokenStore::new(&path))).unwrap_err();
        assert!(matches!(err, SessionError::Corrupt(_)));
    }

    #[test]
    fn clearing_missing_file_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("absent.json"));
        store.clear().unwrap();
    }
}
