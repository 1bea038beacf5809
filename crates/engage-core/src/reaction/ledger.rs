//! Per-post reaction ledger with optimistic updates.
//!
//! A toggle snapshots the state, publishes the predicted next state right
//! away, then submits to the remote. Success keeps the prediction; failure
//! restores the snapshot exactly. At most one remote operation runs per
//! ledger: a toggle or refresh issued while another is in flight is skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use super::rules::{LedgerState, apply_toggle, classify};
use crate::error::ErrorCode;
use crate::identity::VisitorIdentity;
use crate::model::{PostId, ReactionKind};
use crate::remote::{FetchError, RemoteError, RemoteStore};

/// Whether a guarded operation ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T> {
    Applied(T),
    /// Another operation on the same ledger was in flight.
    Skipped,
}

impl<T> Outcome<T> {
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::Skipped => None,
        }
    }
}

/// The remote rejected or never received a reaction. The ledger was rolled
/// back to `restored`.
#[derive(Debug, thiserror::Error)]
#[error("{kind} on post {post_id} was not saved: {source}")]
pub struct ReactionSyncError {
    pub post_id: PostId,
    pub kind: ReactionKind,
    pub restored: LedgerState,
    pub source: RemoteError,
}

impl ReactionSyncError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::ReactionSyncFailed
    }
}

/// Clears the in-flight flag when dropped, whatever path the operation took.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ReactionLedger {
    post_id: PostId,
    remote: Arc<dyn RemoteStore>,
    identity: Arc<VisitorIdentity>,
    state: Mutex<LedgerState>,
    in_flight: AtomicBool,
}

impl std::fmt::Debug for ReactionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactionLedger")
            .field("post_id", &self.post_id)
            .field("state", &self.state())
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ReactionLedger {
    /// Empty ledger; call [`Self::refresh`] to load the remote state.
    pub fn new(
        post_id: PostId,
        remote: Arc<dyn RemoteStore>,
        identity: Arc<VisitorIdentity>,
    ) -> Self {
        Self {
            post_id,
            remote,
            identity,
            state: Mutex::new(LedgerState::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn post_id(&self) -> &PostId {
        &self.post_id
    }

    #[must_use]
    pub fn state(&self) -> LedgerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn publish(&self, next: LedgerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn try_begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.in_flight))
    }

    /// Toggle the visitor's `kind` reaction.
    ///
    /// Returns the state after the remote confirmed, or
    /// [`Outcome::Skipped`] when another operation is still running.
    ///
    /// # Errors
    ///
    /// Returns [`ReactionSyncError`] when the remote write fails; the state
    /// has already been restored to what it was before the call.
    pub fn toggle(&self, kind: ReactionKind) -> Result<Outcome<LedgerState>, ReactionSyncError> {
        let Some(_guard) = self.try_begin() else {
            debug!(post = %self.post_id, %kind, "toggle skipped, reaction already in flight");
            return Ok(Outcome::Skipped);
        };

        let snapshot = self.state();
        let predicted = apply_toggle(snapshot, kind);
        self.publish(predicted);
        debug!(
            post = %self.post_id,
            effect = ?classify(snapshot.mine, kind),
            likes = predicted.counts.likes,
            dislikes = predicted.counts.dislikes,
            "optimistic reaction applied"
        );

        let visitor = self.identity.get_or_create();
        match self.remote.submit_reaction(&self.post_id, &visitor, kind) {
            Ok(()) => Ok(Outcome::Applied(predicted)),
            Err(source) => {
                self.publish(snapshot);
                warn!(
                    post = %self.post_id,
                    %kind,
                    error = %source,
                    "reaction not saved, rolled back"
                );
                Err(ReactionSyncError {
                    post_id: self.post_id.clone(),
                    kind,
                    restored: snapshot,
                    source,
                })
            }
        }
    }

    /// Reload the aggregate and the visitor's reaction from the remote.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if either read fails; the state is unchanged.
    pub fn refresh(&self) -> Result<Outcome<LedgerState>, FetchError> {
        let Some(_guard) = self.try_begin() else {
            debug!(post = %self.post_id, "refresh skipped, reaction in flight");
            return Ok(Outcome::Skipped);
        };

        let fetch_err = |source| FetchError::new("reactions", &self.post_id, source);
        let counts = self
            .remote
            .fetch_reaction_aggregate(&self.post_id)
            .map_err(fetch_err)?;
        let visitor = self.identity.get_or_create();
        let mine = self
            .remote
            .fetch_visitor_reaction(&self.post_id, &visitor)
            .map_err(fetch_err)?;

        let loaded = LedgerState::new(counts, mine);
        self.publish(loaded);
        info!(
            post = %self.post_id,
            likes = counts.likes,
            dislikes = counts.dislikes,
            mine = ?mine,
            "loaded reactions"
        );
        Ok(Outcome::Applied(loaded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MemoryIdentityStore;
    use crate::model::{ReactionCounts, VisitorId};
    use crate::remote::{MemoryRemote, RemoteOp};
    use ReactionKind::{Dislike, Like};

    fn setup(likes: u64, dislikes: u64) -> (ReactionLedger, Arc<MemoryRemote>) {
        let remote = Arc::new(MemoryRemote::new());
        let post = PostId::from("post-1");
        remote.seed_reactions(&post, ReactionCounts::new(likes, dislikes));
        let identity = Arc::new(VisitorIdentity::new(MemoryIdentityStore::with_token("v-me")));
        let ledger = ReactionLedger::new(post, remote.clone(), identity);
        ledger.refresh().expect("refresh");
        (ledger, remote)
    }

    fn state(likes: u64, dislikes: u64, mine: Option<ReactionKind>) -> LedgerState {
        LedgerState::new(ReactionCounts::new(likes, dislikes), mine)
    }

    #[test]
    fn toggles_follow_rule_and_reach_remote() {
        let (ledger, remote) = setup(3, 1);
        let post = ledger.post_id().clone();
        let me = VisitorId::from("v-me");
        assert_eq!(ledger.state(), state(3, 1, None));

        assert_eq!(ledger.toggle(Like).expect("like"), Outcome::Applied(state(4, 1, Some(Like))));
        assert_eq!(remote.peek_visitor_reaction(&post, &me), Some(Like));

        ledger.toggle(Dislike).expect("dislike");
        assert_eq!(ledger.state(), state(3, 2, Some(Dislike)));

        ledger.toggle(Dislike).expect("undo");
        assert_eq!(ledger.state(), state(3, 1, None));
        assert_eq!(remote.peek_visitor_reaction(&post, &me), None);
        assert_eq!(remote.peek_aggregate(&post), ReactionCounts::new(3, 1));
    }

    #[test]
    fn failed_submit_restores_exact_snapshot() {
        let (ledger, remote) = setup(5, 2);
        ledger.toggle(Like).expect("like");
        let before = ledger.state();

        remote.fail_next(RemoteOp::SubmitReaction, 1);
        let err = ledger.toggle(Dislike).expect_err("submit fails");
        assert_eq!(err.code(), ErrorCode::ReactionSyncFailed);
        assert_eq!(err.restored, before);
        assert_eq!(ledger.state(), before);
        assert!(!ledger.is_in_flight());

        // Guard was released: the next toggle goes through.
        assert!(!ledger.toggle(Dislike).expect("retry").is_skipped());
    }

    #[test]
    fn failed_refresh_keeps_state() {
        let (ledger, remote) = setup(2, 0);
        ledger.toggle(Like).expect("like");
        let before = ledger.state();

        remote.fail_next(RemoteOp::FetchVisitorReaction, 1);
        let err = ledger.refresh().expect_err("refresh fails");
        assert_eq!(err.code(), ErrorCode::FetchFailed);
        assert_eq!(ledger.state(), before);
    }

    #[test]
    fn refresh_picks_up_stored_reaction() {
        let remote = Arc::new(MemoryRemote::new());
        let post = PostId::from("post-1");
        remote
            .submit_reaction(&post, &VisitorId::from("v-me"), Dislike)
            .expect("seed");
        let identity = Arc::new(VisitorIdentity::new(MemoryIdentityStore::with_token("v-me")));
        let ledger = ReactionLedger::new(post, remote, identity);

        let loaded = ledger.refresh().expect("refresh").applied();
        assert_eq!(loaded, Some(state(0, 1, Some(Dislike))));
    }

    #[test]
    fn operation_is_skipped_while_guard_is_held() {
        let (ledger, remote) = setup(0, 0);
        let guard = ledger.try_begin().expect("first claim");
        let calls = remote.total_calls();

        assert_eq!(ledger.toggle(Like).expect("skipped"), Outcome::Skipped);
        assert_eq!(ledger.refresh().expect("skipped"), Outcome::Skipped);
        assert_eq!(remote.total_calls(), calls);
        assert_eq!(ledger.state(), state(0, 0, None));

        drop(guard);
        assert!(!ledger.is_in_flight());
    }
}
