//! The remote collaborator: the backend that owns the source of truth for
//! comments and reactions.
//!
//! The engine only ever talks to the backend through [`RemoteStore`]. Three
//! implementations ship with the crate:
//!
//! - [`MemoryRemote`]: in-process, with call counters and failure injection
//! - [`SqliteRemote`]: a single-file SQLite backend for the CLI
//! - [`TimedRemote`]: a decorator recording per-operation latencies

pub mod memory;
pub mod sqlite;
pub mod timed;

pub use memory::{MemoryRemote, RemoteOp};
pub use sqlite::SqliteRemote;
pub use timed::{OpTiming, TimedRemote, TimingReport};

use crate::error::ErrorCode;
use crate::model::{Comment, NewComment, PostId, ReactionCounts, ReactionKind, VisitorId};

/// Failure reported by a remote collaborator.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The backend could not be reached or did not answer.
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// The backend answered with something that could not be decoded.
    #[error("malformed remote response: {0}")]
    Malformed(String),

    /// The backend refused the request.
    #[error("remote rejected request: {0}")]
    Rejected(String),

    /// Local SQLite backend failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// A read from the remote failed. Local state is left as it was.
#[derive(Debug, thiserror::Error)]
#[error("failed to load {what} for post {post_id}: {source}")]
pub struct FetchError {
    /// What was being loaded (`comments`, `reactions`).
    pub what: &'static str,
    pub post_id: PostId,
    pub source: RemoteError,
}

impl FetchError {
    pub(crate) fn new(what: &'static str, post_id: &PostId, source: RemoteError) -> Self {
        Self {
            what,
            post_id: post_id.clone(),
            source,
        }
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::FetchFailed
    }
}

/// Operations the engine consumes from the backend.
///
/// Calls block until the backend answers. Implementations must be shareable
/// across threads since one remote usually serves several post views.
pub trait RemoteStore: Send + Sync {
    /// All comments of a post, in any order.
    fn fetch_comments(&self, post_id: &PostId) -> Result<Vec<Comment>, RemoteError>;

    /// Persist a new comment. The backend assigns id and creation time.
    fn create_comment(&self, draft: &NewComment) -> Result<Comment, RemoteError>;

    /// Like/dislike totals across all visitors.
    fn fetch_reaction_aggregate(&self, post_id: &PostId) -> Result<ReactionCounts, RemoteError>;

    /// The reaction one visitor currently holds, if any.
    fn fetch_visitor_reaction(
        &self,
        post_id: &PostId,
        visitor_id: &VisitorId,
    ) -> Result<Option<ReactionKind>, RemoteError>;

    /// Record a reaction. Re-sending the reaction the visitor already holds
    /// removes it; sending the opposite one switches it.
    fn submit_reaction(
        &self,
        post_id: &PostId,
        visitor_id: &VisitorId,
        kind: ReactionKind,
    ) -> Result<(), RemoteError>;
}

/// Server-side reaction rule shared by the bundled backends: given the
/// visitor's stored reaction and a submitted one, the reaction stored after.
pub(crate) fn resolve_submitted(
    stored: Option<ReactionKind>,
    submitted: ReactionKind,
) -> Option<ReactionKind> {
    if stored == Some(submitted) {
        None
    } else {
        Some(submitted)
    }
}

/// Derive a short comment id from the comment's content and a nonce.
pub(crate) fn derive_comment_id(draft: &NewComment, created_at_us: i64, nonce: u64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(draft.post_id.as_str().as_bytes());
    hasher.update(b"\t");
    hasher.update(draft.author_name.as_bytes());
    hasher.update(b"\t");
    hasher.update(draft.content.as_bytes());
    hasher.update(b"\t");
    hasher.update(&created_at_us.to_le_bytes());
    hasher.update(&nonce.to_le_bytes());
    let hex = hasher.finalize().to_hex();
    format!("c-{}", &hex.as_str()[..12])
}
