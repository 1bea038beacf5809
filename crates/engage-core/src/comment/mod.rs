//! Comment collection and the two-level thread derived from it.

pub mod store;

pub use store::CommentStore;

use crate::error::ErrorCode;
use crate::model::{CommentId, PostId};

/// Where a comment sits in the thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    /// Slide `index` of the top-level carousel.
    TopLevel { index: usize },
    /// Slide `index` of the reply carousel under top-level slide `parent_index`.
    Reply { parent_index: usize, index: usize },
}

impl Placement {
    /// Index of the top-level slide this placement belongs to.
    #[must_use]
    pub const fn top_level_index(self) -> usize {
        match self {
            Self::TopLevel { index } => index,
            Self::Reply { parent_index, .. } => parent_index,
        }
    }
}

/// A comment that would break the one-level thread shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThreadShapeError {
    #[error("comment {id} belongs to post {got}, not {expected}")]
    WrongPost {
        id: CommentId,
        expected: PostId,
        got: PostId,
    },

    #[error("comment {0} is already in the thread")]
    Duplicate(CommentId),

    #[error("reply {id} references unknown comment {parent}")]
    MissingParent { id: CommentId, parent: CommentId },

    #[error("reply {id} targets {parent}, which is itself a reply")]
    NestedReply { id: CommentId, parent: CommentId },
}

impl ThreadShapeError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::ThreadShapeViolation
    }
}
