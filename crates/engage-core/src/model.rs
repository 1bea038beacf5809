//! Shared data model: identifiers, comments, and reaction values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Borrow the identifier text.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of the blog post a comment thread or reaction belongs to.
    PostId
);
string_id!(
    /// Server-assigned comment identifier.
    CommentId
);
string_id!(
    /// Pseudo-anonymous identifier of one browser/client.
    VisitorId
);

/// A posted comment. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CommentId>,
    pub author_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// True when the comment starts a thread rather than replying to one.
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Input for creating a comment. The server assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewComment {
    pub post_id: PostId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CommentId>,
    pub author_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    pub content: String,
}

/// A visitor's reaction to a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Dislike,
}

impl ReactionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Dislike => "dislike",
        }
    }

    /// The other reaction.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Like => Self::Dislike,
            Self::Dislike => Self::Like,
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

impl FromStr for ReactionKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "like" | "up" | "+" => Ok(Self::Like),
            "dislike" | "down" | "-" => Ok(Self::Dislike),
            _ => Err(ParseEnumError {
                expected: "reaction",
                got: s.to_string(),
            }),
        }
    }
}

/// Aggregate reaction counters for one post, across all visitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReactionCounts {
    pub likes: u64,
    pub dislikes: u64,
}

impl ReactionCounts {
    #[must_use]
    pub const fn new(likes: u64, dislikes: u64) -> Self {
        Self { likes, dislikes }
    }

    /// Counter for `kind`.
    #[must_use]
    pub const fn get(&self, kind: ReactionKind) -> u64 {
        match kind {
            ReactionKind::Like => self.likes,
            ReactionKind::Dislike => self.dislikes,
        }
    }

    /// Total reactions across both kinds.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.likes.saturating_add(self.dislikes)
    }

    pub(crate) fn increment(&mut self, kind: ReactionKind) {
        let slot = self.slot_mut(kind);
        *slot = slot.saturating_add(1);
    }

    /// Decrement `kind`, flooring at zero.
    pub(crate) fn decrement(&mut self, kind: ReactionKind) {
        let slot = self.slot_mut(kind);
        *slot = slot.saturating_sub(1);
    }

    fn slot_mut(&mut self, kind: ReactionKind) -> &mut u64 {
        match kind {
            ReactionKind::Like => &mut self.likes,
            ReactionKind::Dislike => &mut self.dislikes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaction_kind_parses_aliases() {
        assert_eq!("Like".parse::<ReactionKind>(), Ok(ReactionKind::Like));
        assert_eq!(" down ".parse::<ReactionKind>(), Ok(ReactionKind::Dislike));
        let err = "meh".parse::<ReactionKind>().expect_err("should reject");
        assert_eq!(err.to_string(), "invalid reaction: 'meh'");
    }

    #[test]
    fn reaction_kind_serializes_lowercase() {
        let json = serde_json::to_string(&ReactionKind::Dislike).expect("serialize");
        assert_eq!(json, "\"dislike\"");
    }

    #[test]
    fn counts_floor_at_zero() {
        let mut counts = ReactionCounts::new(0, 1);
        counts.decrement(ReactionKind::Like);
        counts.decrement(ReactionKind::Dislike);
        counts.decrement(ReactionKind::Dislike);
        assert_eq!(counts, ReactionCounts::new(0, 0));
    }

    #[test]
    fn comment_omits_absent_optionals() {
        let comment = Comment {
            id: CommentId::from("c-1"),
            post_id: PostId::from("p1"),
            parent_id: None,
            author_name: "Ada".into(),
            author_email: None,
            content: "hello".into(),
            created_at: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
        };
        let json = serde_json::to_value(&comment).expect("serialize");
        assert!(json.get("parent_id").is_none());
        assert!(json.get("author_email").is_none());
        assert_eq!(json["id"], "c-1");
    }
}
