//! In-process backend used by tests, the simulator, and offline demos.
//!
//! Behaves like the hosted backend: assigns ids and timestamps on create,
//! only accepts replies to top-level comments of the same post, keeps at
//! most one reaction per `(post, visitor)`, and treats a repeated reaction
//! as toggle-off. Every call is counted, and any operation can be
//! told to fail so callers can exercise their error paths.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::{RemoteError, RemoteStore, derive_comment_id, resolve_submitted};
use crate::model::{
    Comment, CommentId, NewComment, PostId, ReactionCounts, ReactionKind, VisitorId,
};

/// The five remote operations, for call accounting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RemoteOp {
    FetchComments,
    CreateComment,
    FetchAggregate,
    FetchVisitorReaction,
    SubmitReaction,
}

impl RemoteOp {
    /// Stable name used in logs and timing reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::FetchComments => "remote.fetch_comments",
            Self::CreateComment => "remote.create_comment",
            Self::FetchAggregate => "remote.fetch_reaction_aggregate",
            Self::FetchVisitorReaction => "remote.fetch_visitor_reaction",
            Self::SubmitReaction => "remote.submit_reaction",
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    comments: Vec<Comment>,
    reactions: BTreeMap<(PostId, VisitorId), ReactionKind>,
    /// Counts seeded without visitor attribution (reactions predating the
    /// visitor table, or imported totals).
    baseline: HashMap<PostId, ReactionCounts>,
    calls: BTreeMap<RemoteOp, u64>,
    down: BTreeSet<RemoteOp>,
    pending_failures: BTreeMap<RemoteOp, u32>,
    nonce: u64,
    last_created_us: i64,
}

impl Inner {
    /// Count the call and decide whether it fails.
    fn begin(&mut self, op: RemoteOp) -> Result<(), RemoteError> {
        *self.calls.entry(op).or_default() += 1;

        if self.down.contains(&op) {
            return Err(RemoteError::Unavailable(format!("{} is down", op.name())));
        }

        if let Some(remaining) = self.pending_failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RemoteError::Unavailable(format!(
                    "{} failed (injected)",
                    op.name()
                )));
            }
        }

        Ok(())
    }

    /// Strictly increasing creation timestamps, even within one microsecond.
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let now_us = Utc::now().timestamp_micros();
        let ts = now_us.max(self.last_created_us.saturating_add(1));
        self.last_created_us = ts;
        DateTime::<Utc>::from_timestamp_micros(ts).unwrap_or_else(Utc::now)
    }

    fn aggregate(&self, post_id: &PostId) -> ReactionCounts {
        let mut counts = self.baseline.get(post_id).copied().unwrap_or_default();
        for ((post, _), kind) in &self.reactions {
            if post == post_id {
                counts.increment(*kind);
            }
        }
        counts
    }
}

/// Thread-safe in-memory [`RemoteStore`].
#[derive(Debug, Default)]
pub struct MemoryRemote {
    inner: Mutex<Inner>,
}

impl MemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an already-created comment as-is (no id/timestamp assignment).
    pub fn seed_comment(&self, comment: Comment) {
        let mut inner = self.lock();
        inner.last_created_us = inner
            .last_created_us
            .max(comment.created_at.timestamp_micros());
        inner.comments.push(comment);
    }

    /// Seed anonymous reaction totals for a post.
    pub fn seed_reactions(&self, post_id: &PostId, counts: ReactionCounts) {
        self.lock().baseline.insert(post_id.clone(), counts);
    }

    /// Make the next `times` calls of `op` fail.
    pub fn fail_next(&self, op: RemoteOp, times: u32) {
        *self.lock().pending_failures.entry(op).or_default() += times;
    }

    /// Take `op` down (every call fails) or bring it back.
    pub fn set_down(&self, op: RemoteOp, down: bool) {
        let mut inner = self.lock();
        if down {
            inner.down.insert(op);
        } else {
            inner.down.remove(&op);
        }
    }

    /// Number of calls issued for `op`, failed ones included.
    #[must_use]
    pub fn calls(&self, op: RemoteOp) -> u64 {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of calls issued across all operations.
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.lock().calls.values().sum()
    }

    /// Number of visitors currently holding a reaction on `post_id`.
    #[must_use]
    pub fn reacting_visitors(&self, post_id: &PostId) -> usize {
        self.lock()
            .reactions
            .keys()
            .filter(|(post, _)| post == post_id)
            .count()
    }

    /// Current aggregate without counting it as a remote call.
    #[must_use]
    pub fn peek_aggregate(&self, post_id: &PostId) -> ReactionCounts {
        self.lock().aggregate(post_id)
    }

    /// Number of comments stored for `post_id`, without counting a call.
    #[must_use]
    pub fn peek_comment_count(&self, post_id: &PostId) -> usize {
        self.lock()
            .comments
            .iter()
            .filter(|comment| &comment.post_id == post_id)
            .count()
    }

    /// Current reaction of one visitor without counting it as a remote call.
    #[must_use]
    pub fn peek_visitor_reaction(
        &self,
        post_id: &PostId,
        visitor_id: &VisitorId,
    ) -> Option<ReactionKind> {
        self.lock()
            .reactions
            .get(&(post_id.clone(), visitor_id.clone()))
            .copied()
    }
}

impl RemoteStore for MemoryRemote {
    fn fetch_comments(&self, post_id: &PostId) -> Result<Vec<Comment>, RemoteError> {
        let mut inner = self.lock();
        inner.begin(RemoteOp::FetchComments)?;
        Ok(inner
            .comments
            .iter()
            .filter(|comment| &comment.post_id == post_id)
            .cloned()
            .collect())
    }

    fn create_comment(&self, draft: &NewComment) -> Result<Comment, RemoteError> {
        let mut inner = self.lock();
        inner.begin(RemoteOp::CreateComment)?;

        if let Some(parent_id) = &draft.parent_id {
            let parent = inner
                .comments
                .iter()
                .find(|c| &c.id == parent_id && c.post_id == draft.post_id);
            match parent {
                None => {
                    return Err(RemoteError::Rejected(format!(
                        "parent comment {parent_id} not found"
                    )));
                }
                Some(parent) if parent.parent_id.is_some() => {
                    return Err(RemoteError::Rejected(
                        "replies can only target top-level comments".into(),
                    ));
                }
                Some(_) => {}
            }
        }

        let created_at = inner.next_created_at();
        inner.nonce = inner.nonce.wrapping_add(1);
        let id = derive_comment_id(draft, created_at.timestamp_micros(), inner.nonce);

        let comment = Comment {
            id: CommentId::new(id),
            post_id: draft.post_id.clone(),
            parent_id: draft.parent_id.clone(),
            author_name: draft.author_name.clone(),
            author_email: draft.author_email.clone(),
            content: draft.content.clone(),
            created_at,
        };
        inner.comments.push(comment.clone());
        Ok(comment)
    }

    fn fetch_reaction_aggregate(&self, post_id: &PostId) -> Result<ReactionCounts, RemoteError> {
        let mut inner = self.lock();
        inner.begin(RemoteOp::FetchAggregate)?;
        Ok(inner.aggregate(post_id))
    }

    fn fetch_visitor_reaction(
        &self,
        post_id: &PostId,
        visitor_id: &VisitorId,
    ) -> Result<Option<ReactionKind>, RemoteError> {
        let mut inner = self.lock();
        inner.begin(RemoteOp::FetchVisitorReaction)?;
        Ok(inner
            .reactions
            .get(&(post_id.clone(), visitor_id.clone()))
            .copied())
    }

    fn submit_reaction(
        &self,
        post_id: &PostId,
        visitor_id: &VisitorId,
        kind: ReactionKind,
    ) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        inner.begin(RemoteOp::SubmitReaction)?;

        let key = (post_id.clone(), visitor_id.clone());
        match resolve_submitted(inner.reactions.get(&key).copied(), kind) {
            Some(next) => {
                inner.reactions.insert(key, next);
            }
            None => {
                inner.reactions.remove(&key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(post: &str, parent: Option<&CommentId>, content: &str) -> NewComment {
        NewComment {
            post_id: PostId::from(post),
            parent_id: parent.cloned(),
            author_name: "Ada".into(),
            author_email: None,
            content: content.into(),
        }
    }

    #[test]
    fn create_assigns_unique_ids_and_increasing_timestamps() {
        let remote = MemoryRemote::new();
        let a = remote.create_comment(&draft("p1", None, "same")).expect("create a");
        let b = remote.create_comment(&draft("p1", None, "same")).expect("create b");
        assert_ne!(a.id, b.id);
        assert!(b.created_at > a.created_at);
    }

    #[test]
    fn create_rejects_unknown_parent() {
        let remote = MemoryRemote::new();
        let ghost = CommentId::from("c-ghost");
        let err = remote
            .create_comment(&draft("p1", Some(&ghost), "reply"))
            .expect_err("unknown parent");
        assert!(matches!(err, RemoteError::Rejected(_)));
    }

    #[test]
    fn create_rejects_reply_to_reply() {
        let remote = MemoryRemote::new();
        let top = remote.create_comment(&draft("p1", None, "top")).expect("create top");
        let reply = remote
            .create_comment(&draft("p1", Some(&top.id), "reply"))
            .expect("create reply");
        let err = remote
            .create_comment(&draft("p1", Some(&reply.id), "nested"))
            .expect_err("reply to reply");
        assert!(matches!(err, RemoteError::Rejected(ref msg) if msg.contains("top-level")));
        let comments = remote.fetch_comments(&PostId::from("p1")).expect("fetch");
        assert_eq!(comments.len(), 2);
    }

    #[test]
    fn fetch_filters_by_post() {
        let remote = MemoryRemote::new();
        remote.create_comment(&draft("p1", None, "one")).expect("create");
        remote.create_comment(&draft("p2", None, "two")).expect("create");
        let comments = remote.fetch_comments(&PostId::from("p1")).expect("fetch");
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].content, "one");
    }

    #[test]
    fn one_reaction_per_visitor_with_toggle_off() {
        let remote = MemoryRemote::new();
        let post = PostId::from("p1");
        let visitor = VisitorId::from("v-1");
        remote.seed_reactions(&post, ReactionCounts::new(3, 1));

        remote.submit_reaction(&post, &visitor, ReactionKind::Like).expect("like");
        assert_eq!(remote.peek_aggregate(&post), ReactionCounts::new(4, 1));

        remote.submit_reaction(&post, &visitor, ReactionKind::Dislike).expect("switch");
        assert_eq!(remote.peek_aggregate(&post), ReactionCounts::new(3, 2));
        assert_eq!(remote.reacting_visitors(&post), 1);

        remote.submit_reaction(&post, &visitor, ReactionKind::Dislike).expect("off");
        assert_eq!(remote.peek_aggregate(&post), ReactionCounts::new(3, 1));
        assert_eq!(remote.peek_visitor_reaction(&post, &visitor), None);
    }

    #[test]
    fn injected_failures_are_counted_and_consumed() {
        let remote = MemoryRemote::new();
        let post = PostId::from("p1");
        remote.fail_next(RemoteOp::FetchComments, 1);

        assert!(remote.fetch_comments(&post).is_err());
        assert!(remote.fetch_comments(&post).is_ok());
        assert_eq!(remote.calls(RemoteOp::FetchComments), 2);
        assert_eq!(remote.total_calls(), 2);
    }

    #[test]
    fn down_operation_fails_until_restored() {
        let remote = MemoryRemote::new();
        let post = PostId::from("p1");
        let visitor = VisitorId::from("v-1");
        remote.set_down(RemoteOp::SubmitReaction, true);
        assert!(remote.submit_reaction(&post, &visitor, ReactionKind::Like).is_err());
        assert_eq!(remote.peek_aggregate(&post), ReactionCounts::default());

        remote.set_down(RemoteOp::SubmitReaction, false);
        assert!(remote.submit_reaction(&post, &visitor, ReactionKind::Like).is_ok());
        assert_eq!(remote.peek_aggregate(&post).likes, 1);
    }
}
