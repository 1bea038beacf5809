//! Single-file SQLite backend.
//!
//! Stands in for the hosted backend when running the CLI locally. Runtime
//! pragmas follow the usual local-database defaults:
//! - `journal_mode = WAL` so readers do not block the writer
//! - `busy_timeout = 5s` to ride out short lock contention
//! - `foreign_keys = ON` so replies cannot point at missing comments

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params, types::Type};
use tracing::debug;

use super::{RemoteError, RemoteStore, derive_comment_id, resolve_submitted};
use crate::model::{
    Comment, CommentId, NewComment, PostId, ReactionCounts, ReactionKind, VisitorId,
};

/// Busy timeout used for backend connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS comments (
    comment_id TEXT PRIMARY KEY,
    post_id TEXT NOT NULL CHECK (length(trim(post_id)) > 0),
    parent_id TEXT REFERENCES comments(comment_id),
    author_name TEXT NOT NULL CHECK (length(trim(author_name)) > 0),
    author_email TEXT,
    content TEXT NOT NULL CHECK (length(trim(content)) > 0),
    created_at_us INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_comments_post_created
    ON comments(post_id, created_at_us);

CREATE TABLE IF NOT EXISTS reactions (
    post_id TEXT NOT NULL,
    visitor_id TEXT NOT NULL,
    reaction TEXT NOT NULL CHECK (reaction IN ('like', 'dislike')),
    updated_at_us INTEGER NOT NULL,
    PRIMARY KEY (post_id, visitor_id)
);
";

const MIGRATIONS: &[(u32, &str)] = &[(1, MIGRATION_V1_SQL)];

/// [`RemoteStore`] backed by a SQLite database file.
#[derive(Debug)]
pub struct SqliteRemote {
    conn: Mutex<Connection>,
}

impl SqliteRemote {
    /// Open (or create) the database at `path`, apply pragmas and migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or SQLite
    /// fails to open, configure, or migrate the database.
    pub fn open(path: &Path) -> Result<Self, RemoteError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    RemoteError::Unavailable(format!("create {}: {err}", parent.display()))
                })?;
            }
        }

        let mut conn = Connection::open(path)?;
        configure_connection(&conn)?;
        let version = migrate(&mut conn)?;
        debug!(path = %path.display(), version, "opened sqlite backend");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, mostly for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite fails to migrate the database.
    pub fn open_in_memory() -> Result<Self, RemoteError> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
    })
}

/// Apply all pending migrations in ascending order.
fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let mut current = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", i64::from(*version))?;
        tx.commit()?;
        current = *version;
    }

    Ok(current)
}

fn parse_reaction(raw: &str) -> rusqlite::Result<ReactionKind> {
    raw.parse::<ReactionKind>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(err)))
}

fn row_to_comment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    let created_at_us: i64 = row.get(6)?;
    let created_at = DateTime::<Utc>::from_timestamp_micros(created_at_us).ok_or_else(|| {
        rusqlite::Error::IntegralValueOutOfRange(6, created_at_us)
    })?;
    Ok(Comment {
        id: CommentId::new(row.get::<_, String>(0)?),
        post_id: PostId::new(row.get::<_, String>(1)?),
        parent_id: row.get::<_, Option<String>>(2)?.map(CommentId::new),
        author_name: row.get(3)?,
        author_email: row.get(4)?,
        content: row.get(5)?,
        created_at,
    })
}

impl RemoteStore for SqliteRemote {
    fn fetch_comments(&self, post_id: &PostId) -> Result<Vec<Comment>, RemoteError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT comment_id, post_id, parent_id, author_name, author_email, content, created_at_us
             FROM comments
             WHERE post_id = ?1
             ORDER BY created_at_us ASC, comment_id ASC",
        )?;
        let rows = stmt.query_map(params![post_id.as_str()], row_to_comment)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn create_comment(&self, draft: &NewComment) -> Result<Comment, RemoteError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        if let Some(parent_id) = &draft.parent_id {
            let parent: Option<(String, Option<String>)> = tx
                .query_row(
                    "SELECT post_id, parent_id FROM comments WHERE comment_id = ?1",
                    params![parent_id.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            match parent {
                Some((post, grandparent)) if post == draft.post_id.as_str() => {
                    if grandparent.is_some() {
                        return Err(RemoteError::Rejected(
                            "replies can only target top-level comments".into(),
                        ));
                    }
                }
                _ => {
                    return Err(RemoteError::Rejected(format!(
                        "parent comment {parent_id} not found"
                    )));
                }
            }
        }

        let last_us: Option<i64> =
            tx.query_row("SELECT MAX(created_at_us) FROM comments", [], |row| row.get(0))?;
        let created_at_us = Utc::now()
            .timestamp_micros()
            .max(last_us.unwrap_or(0).saturating_add(1));
        let nonce: u64 = rand::random();
        let id = derive_comment_id(draft, created_at_us, nonce);

        tx.execute(
            "INSERT INTO comments
                (comment_id, post_id, parent_id, author_name, author_email, content, created_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                draft.post_id.as_str(),
                draft.parent_id.as_ref().map(CommentId::as_str),
                draft.author_name,
                draft.author_email,
                draft.content,
                created_at_us,
            ],
        )?;
        tx.commit()?;

        let created_at = DateTime::<Utc>::from_timestamp_micros(created_at_us)
            .ok_or_else(|| RemoteError::Malformed(format!("timestamp {created_at_us}")))?;
        Ok(Comment {
            id: CommentId::new(id),
            post_id: draft.post_id.clone(),
            parent_id: draft.parent_id.clone(),
            author_name: draft.author_name.clone(),
            author_email: draft.author_email.clone(),
            content: draft.content.clone(),
            created_at,
        })
    }

    fn fetch_reaction_aggregate(&self, post_id: &PostId) -> Result<ReactionCounts, RemoteError> {
        let conn = self.lock();
        let (likes, dislikes): (i64, i64) = conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN reaction = 'like' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN reaction = 'dislike' THEN 1 ELSE 0 END), 0)
             FROM reactions
             WHERE post_id = ?1",
            params![post_id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let to_count = |value: i64| {
            u64::try_from(value).map_err(|_| RemoteError::Malformed(format!("count {value}")))
        };
        Ok(ReactionCounts::new(to_count(likes)?, to_count(dislikes)?))
    }

    fn fetch_visitor_reaction(
        &self,
        post_id: &PostId,
        visitor_id: &VisitorId,
    ) -> Result<Option<ReactionKind>, RemoteError> {
        let conn = self.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT reaction FROM reactions WHERE post_id = ?1 AND visitor_id = ?2",
                params![post_id.as_str(), visitor_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.as_deref().map(parse_reaction).transpose()?)
    }

    fn submit_reaction(
        &self,
        post_id: &PostId,
        visitor_id: &VisitorId,
        kind: ReactionKind,
    ) -> Result<(), RemoteError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let stored: Option<String> = tx
            .query_row(
                "SELECT reaction FROM reactions WHERE post_id = ?1 AND visitor_id = ?2",
                params![post_id.as_str(), visitor_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let stored = stored.as_deref().map(parse_reaction).transpose()?;

        match resolve_submitted(stored, kind) {
            Some(next) => {
                tx.execute(
                    "INSERT INTO reactions (post_id, visitor_id, reaction, updated_at_us)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(post_id, visitor_id)
                     DO UPDATE SET reaction = excluded.reaction, updated_at_us = excluded.updated_at_us",
                    params![
                        post_id.as_str(),
                        visitor_id.as_str(),
                        next.to_string(),
                        Utc::now().timestamp_micros(),
                    ],
                )?;
            }
            None => {
                tx.execute(
                    "DELETE FROM reactions WHERE post_id = ?1 AND visitor_id = ?2",
                    params![post_id.as_str(), visitor_id.as_str()],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}
