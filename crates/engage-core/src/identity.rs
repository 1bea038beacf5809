//! Visitor identity: a stable pseudo-anonymous token per client.
//!
//! The token only deduplicates reactions; it is not a credential. It is
//! generated on first access, saved through an [`IdentityStore`], and reused
//! afterwards. When storage cannot be read or written the provider still
//! hands out an identifier, it just lasts for this session only.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};

use chrono::Utc;
use tracing::{debug, warn};

use crate::model::VisitorId;

/// Upper bound on a stored identifier; anything longer is treated as corrupt.
pub const MAX_VISITOR_ID_LEN: usize = 128;

/// Durable client-side storage for the visitor token.
pub trait IdentityStore: Send + Sync {
    /// Read the stored token, `Ok(None)` when nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns an error when the storage exists but cannot be read.
    fn load(&self) -> io::Result<Option<String>>;

    /// Persist the token, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error when the storage cannot be written.
    fn save(&self, token: &str) -> io::Result<()>;
}

/// Token stored as a single-line file.
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under the user data directory (`<data_dir>/engage/visitor-id`).
    ///
    /// Returns `None` when the platform has no data directory.
    #[must_use]
    pub fn in_user_data_dir() -> Option<Self> {
        dirs::data_dir().map(|dir| Self::new(dir.join("engage").join("visitor-id")))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw.trim().to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn save(&self, token: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, format!("{token}\n"))
    }
}

/// Process-local store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    token: Mutex<Option<String>>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store, as if a previous session had saved `token`.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> io::Result<Option<String>> {
        Ok(self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, token: &str) -> io::Result<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Resolved {
    id: VisitorId,
    persistent: bool,
}

/// Lazily-initialized visitor identity provider.
pub struct VisitorIdentity {
    store: Box<dyn IdentityStore>,
    resolved: OnceLock<Resolved>,
}

impl std::fmt::Debug for VisitorIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisitorIdentity")
            .field("resolved", &self.resolved.get())
            .finish_non_exhaustive()
    }
}

impl VisitorIdentity {
    pub fn new(store: impl IdentityStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            resolved: OnceLock::new(),
        }
    }

    /// Identity that is never persisted.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self::new(MemoryIdentityStore::new())
    }

    /// Return the visitor id, creating and persisting one on first use.
    ///
    /// Never fails: unreadable or unwritable storage degrades to an id that
    /// only lives as long as this provider.
    pub fn get_or_create(&self) -> VisitorId {
        self.resolved
            .get_or_init(|| self.resolve())
            .id
            .clone()
    }

    /// Whether the id returned by [`Self::get_or_create`] reached durable storage.
    pub fn is_persistent(&self) -> bool {
        self.resolved.get_or_init(|| self.resolve()).persistent
    }

    fn resolve(&self) -> Resolved {
        match self.store.load() {
            Ok(Some(stored)) if is_valid_token(&stored) => {
                debug!(visitor = %stored, "reusing stored visitor id");
                return Resolved {
                    id: VisitorId::new(stored),
                    persistent: true,
                };
            }
            Ok(Some(stored)) => {
                warn!(len = stored.len(), "stored visitor id is malformed, replacing it");
            }
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "visitor id storage unreadable, using a session-only id");
                return Resolved {
                    id: generate_visitor_id(),
                    persistent: false,
                };
            }
        }

        let id = generate_visitor_id();
        let persistent = match self.store.save(id.as_str()) {
            Ok(()) => {
                debug!(visitor = %id, "created visitor id");
                true
            }
            Err(err) => {
                warn!(error = %err, "could not persist visitor id, using a session-only id");
                false
            }
        };
        Resolved { id, persistent }
    }
}

/// Fresh identifier: `v-<unix millis, hex>-<64 random bits, hex>`.
///
/// Collision resistance is sized for anti-spam bookkeeping, not security.
#[must_use]
pub fn generate_visitor_id() -> VisitorId {
    let millis = Utc::now().timestamp_millis();
    let suffix: u64 = rand::random();
    VisitorId::new(format!("v-{millis:x}-{suffix:016x}"))
}

fn is_valid_token(raw: &str) -> bool {
    !raw.is_empty()
        && raw.len() <= MAX_VISITOR_ID_LEN
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
