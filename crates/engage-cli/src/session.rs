//! Per-invocation wiring: config, local backend, visitor identity.
//!
//! Resolution chain for the database: `--db` flag > `storage.database` in
//! config > `<data_dir>/engage/engage.db`. The identity file follows
//! `storage.identity_file` > `<data_dir>/engage/visitor-id`; with neither
//! available the visitor is ephemeral for this run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use engage_core::ErrorCode;
use engage_core::clock::SystemClock;
use engage_core::config::EngageConfig;
use engage_core::identity::{FileIdentityStore, VisitorIdentity};
use engage_core::model::PostId;
use engage_core::remote::{SqliteRemote, TimedRemote};
use engage_core::view::PostView;
use tracing::{debug, warn};

use crate::output::{CliError, OutputMode, fail};

pub struct Session {
    pub config: EngageConfig,
    pub remote: Arc<TimedRemote<SqliteRemote>>,
    pub identity: Arc<VisitorIdentity>,
    pub identity_file: Option<PathBuf>,
    pub database: PathBuf,
}

impl Session {
    /// Open the local backend named by `db_flag` or the config.
    ///
    /// # Errors
    ///
    /// Renders a `StorageUnavailable` error and fails if the database cannot
    /// be opened or migrated.
    pub fn open(
        config: EngageConfig,
        db_flag: Option<&Path>,
        project_root: &Path,
        output: OutputMode,
    ) -> Result<Self> {
        let database = db_flag.map_or_else(
            || config.storage.database_path(project_root),
            Path::to_path_buf,
        );
        let remote = SqliteRemote::open(&database).map_err(|err| {
            fail(
                output,
                &CliError::from_code(
                    ErrorCode::StorageUnavailable,
                    format!("cannot open {}: {err}", database.display()),
                ),
            )
        })?;
        debug!(database = %database.display(), "opened local backend");

        let store = config
            .storage
            .identity_file
            .clone()
            .map(FileIdentityStore::new)
            .or_else(FileIdentityStore::in_user_data_dir);
        let identity_file = store.as_ref().map(|s| s.path().to_path_buf());
        let identity = store.map_or_else(
            || {
                warn!("no data directory for the visitor id; reactions will not persist");
                VisitorIdentity::ephemeral()
            },
            VisitorIdentity::new,
        );

        Ok(Self {
            config,
            remote: Arc::new(TimedRemote::new(remote)),
            identity: Arc::new(identity),
            identity_file,
            database,
        })
    }

    /// A post view over the session's backend, not yet loaded.
    pub fn view(&self, post: &str) -> PostView {
        PostView::open(
            PostId::from(post),
            self.remote.clone(),
            Arc::clone(&self.identity),
            &self.config,
            Arc::new(SystemClock::new()),
        )
    }
}
