//! One open post: its thread, carousel, reactions and comment form.

use std::sync::Arc;

use crate::clock::Clock;
use crate::comment::CommentStore;
use crate::config::EngageConfig;
use crate::identity::VisitorIdentity;
use crate::model::{Comment, NewComment, PostId, ReactionKind};
use crate::navigator::{Navigation, NavigatorState, ThreadNavigator};
use crate::reaction::{LedgerState, Outcome, ReactionLedger, ReactionSyncError};
use crate::remote::{FetchError, RemoteStore};
use crate::submission::{SubmissionPipeline, SubmitError};

/// Result of [`PostView::load`]. The two halves fail independently.
#[derive(Debug)]
pub struct LoadReport {
    /// Number of comments in the thread.
    pub comments: Result<usize, FetchError>,
    pub reactions: Result<Outcome<LedgerState>, FetchError>,
}

impl LoadReport {
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.comments.is_ok() && self.reactions.is_ok()
    }
}

pub struct PostView {
    remote: Arc<dyn RemoteStore>,
    store: CommentStore,
    navigator: ThreadNavigator,
    ledger: ReactionLedger,
    pipeline: SubmissionPipeline,
}

impl std::fmt::Debug for PostView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostView")
            .field("post_id", self.post_id())
            .field("comments", &self.store.len())
            .field("navigator", &self.navigator)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

impl PostView {
    pub fn open(
        post_id: PostId,
        remote: Arc<dyn RemoteStore>,
        identity: Arc<VisitorIdentity>,
        config: &EngageConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store: CommentStore::new(post_id.clone()),
            navigator: ThreadNavigator::new(clock, config.navigator.settle()),
            ledger: ReactionLedger::new(post_id, Arc::clone(&remote), identity),
            pipeline: SubmissionPipeline::new(Arc::clone(&remote), config.submission.clone()),
            remote,
        }
    }

    #[must_use]
    pub const fn post_id(&self) -> &PostId {
        self.store.post_id()
    }

    /// Load comments and reactions. Failures are reported, never fatal.
    pub fn load(&mut self) -> LoadReport {
        let comments = self
            .store
            .load(self.remote.as_ref())
            .map(<[Comment]>::len);
        self.navigator.reconcile(&self.store);
        let reactions = self.ledger.refresh();
        LoadReport {
            comments,
            reactions,
        }
    }

    /// Post a comment or reply and bring it on screen.
    ///
    /// # Errors
    ///
    /// See [`SubmissionPipeline::submit`]. On error the caller keeps its draft.
    pub fn submit(&mut self, draft: &NewComment) -> Result<Comment, SubmitError> {
        let (comment, placement) = self.pipeline.submit(&mut self.store, draft)?;
        self.navigator.focus(placement);
        Ok(comment)
    }

    /// # Errors
    ///
    /// See [`ReactionLedger::toggle`].
    pub fn toggle(&self, kind: ReactionKind) -> Result<Outcome<LedgerState>, ReactionSyncError> {
        self.ledger.toggle(kind)
    }

    pub fn next(&mut self) -> Navigation {
        self.navigator.next(&self.store)
    }

    pub fn prev(&mut self) -> Navigation {
        self.navigator.prev(&self.store)
    }

    pub fn go_to(&mut self, index: usize) -> Navigation {
        self.navigator.go_to(&self.store, index)
    }

    pub fn next_reply(&mut self) -> Navigation {
        self.navigator.next_reply(&self.store)
    }

    pub fn prev_reply(&mut self) -> Navigation {
        self.navigator.prev_reply(&self.store)
    }

    pub fn go_to_reply(&mut self, index: usize) -> Navigation {
        self.navigator.go_to_reply(&self.store, index)
    }

    /// The top-level comment under the cursor.
    #[must_use]
    pub fn active_comment(&self) -> Option<&Comment> {
        self.store
            .top_level_at(self.navigator.state().active_top_level)
    }

    /// The reply under the reply cursor, if the active comment has replies.
    #[must_use]
    pub fn active_reply(&self) -> Option<&Comment> {
        let state = self.navigator.state();
        self.store
            .reply_at(state.active_top_level, state.active_reply)
    }

    #[must_use]
    pub fn navigator_state(&self) -> NavigatorState {
        self.navigator.state()
    }

    #[must_use]
    pub fn reactions(&self) -> LedgerState {
        self.ledger.state()
    }

    #[must_use]
    pub const fn ledger(&self) -> &ReactionLedger {
        &self.ledger
    }

    #[must_use]
    pub const fn store(&self) -> &CommentStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::comment::fixtures::{POST, comment};
    use crate::identity::MemoryIdentityStore;
    use crate::model::{CommentId, ReactionCounts};
    use crate::remote::{MemoryRemote, RemoteOp};

    fn open(remote: &Arc<MemoryRemote>) -> PostView {
        PostView::open(
            PostId::from(POST),
            remote.clone(),
            Arc::new(VisitorIdentity::new(MemoryIdentityStore::with_token("v-me"))),
            &EngageConfig::default(),
            Arc::new(ManualClock::new()),
        )
    }

    #[test]
    fn load_reports_each_half() {
        let remote = Arc::new(MemoryRemote::new());
        remote.seed_comment(comment("A", None, 1));
        remote.seed_reactions(&PostId::from(POST), ReactionCounts::new(2, 0));
        remote.fail_next(RemoteOp::FetchAggregate, 1);

        let mut view = open(&remote);
        let report = view.load();
        assert_eq!(report.comments.as_ref().ok(), Some(&1));
        assert!(report.reactions.is_err());
        assert!(!report.is_complete());
        assert_eq!(view.active_comment().map(|c| c.id.as_str()), Some("A"));

        assert!(view.load().is_complete());
        assert_eq!(view.reactions().counts, ReactionCounts::new(2, 0));
    }

    #[test]
    fn submitted_reply_is_focused() {
        let remote = Arc::new(MemoryRemote::new());
        remote.seed_comment(comment("A", None, 1));
        remote.seed_comment(comment("B", None, 2));
        let mut view = open(&remote);
        view.load();

        let draft = NewComment {
            post_id: PostId::from(POST),
            parent_id: Some(CommentId::from("B")),
            author_name: "Ada".into(),
            content: "agreed".into(),
            ..NewComment::default()
        };
        let created = view.submit(&draft).expect("submit");

        assert_eq!(view.navigator_state().active_top_level, 1);
        assert_eq!(view.active_reply().map(|c| &c.id), Some(&created.id));
        assert!(view.navigator_state().is_transitioning);
        assert_eq!(view.next(), Navigation::Busy);
    }
}
