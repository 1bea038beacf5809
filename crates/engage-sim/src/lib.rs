//! engage-sim library.
//!
//! Drives many visitors against one fault-injecting [`MemoryRemote`]. Each
//! visitor has an open [`PostView`] per post and, step by step, toggles
//! reactions, reloads, posts comments or flips the carousel. Every step is
//! recorded with enough remote-side evidence for [`oracle`] to check the
//! engine's guarantees afterwards.
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` for setup failures; invariant breaks are
//!   data ([`oracle::InvariantViolation`]), not errors.
//! - **Logging**: `tracing` macros.

pub mod campaign;
pub mod oracle;
pub mod rng;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use engage_core::clock::ManualClock;
use engage_core::config::EngageConfig;
use engage_core::identity::{MemoryIdentityStore, VisitorIdentity};
use engage_core::model::{CommentId, NewComment, PostId, ReactionCounts, ReactionKind, VisitorId};
use engage_core::navigator::Navigation;
use engage_core::reaction::LedgerState;
use engage_core::remote::{MemoryRemote, RemoteOp};
use engage_core::view::PostView;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rng::DeterministicRng;

/// Fault injection rates, in percent per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Chance that a reaction write fails.
    pub submit_failure_percent: u8,
    /// Chance that one of a reload's reads fails.
    pub fetch_failure_percent: u8,
    /// Chance that a comment write fails.
    pub create_failure_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            submit_failure_percent: 15,
            fetch_failure_percent: 10,
            create_failure_percent: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub visitors: usize,
    pub posts: usize,
    pub steps: u64,
    /// Settle window of every simulated carousel.
    pub settle_ms: u64,
    /// Simulated time between steps.
    pub step_ms: u64,
    pub fault: FaultConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            visitors: 4,
            posts: 2,
            steps: 64,
            settle_ms: 250,
            step_ms: 100,
            fault: FaultConfig::default(),
        }
    }
}

/// What a step tried to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Toggle(ReactionKind),
    Reload,
    Comment { reply: bool },
    Navigate,
}

/// What happened, with remote-side evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEventKind {
    Toggle {
        kind: ReactionKind,
        injected_failure: bool,
        /// `true` when the remote write failed and the ledger rolled back.
        rolled_back: bool,
        skipped: bool,
        before: LedgerState,
        after: LedgerState,
        remote_before: ReactionCounts,
        remote_after: ReactionCounts,
        /// The visitor's reaction as stored remotely after the step.
        remote_mine: Option<ReactionKind>,
    },
    Reload {
        comments_ok: bool,
        reactions_ok: bool,
        after: LedgerState,
        remote_mine: Option<ReactionKind>,
    },
    Comment {
        reply: bool,
        posted: bool,
        thread_len: usize,
    },
    Navigate {
        moved: bool,
        busy: bool,
        active: usize,
        top_level_len: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub step: u64,
    pub visitor: usize,
    pub post: usize,
    /// Remote aggregate total for the post after the step.
    pub remote_total: u64,
    /// Visitors holding a reaction on the post after the step.
    pub reacting_visitors: u64,
    pub kind: TraceEventKind,
}

/// End-of-run view of one visitor on one post, after a final reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSnapshot {
    pub visitor: usize,
    pub post: usize,
    pub ledger: LedgerState,
    pub remote_mine: Option<ReactionKind>,
    /// Successful toggles issued through this view, in order.
    pub confirmed_toggles: Vec<ReactionKind>,
    pub thread_len: usize,
    pub remote_thread_len: usize,
    /// Comments listed in exactly one of top-level or a reply list.
    pub placed_once: usize,
    pub active_top_level: usize,
    pub top_level_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub seed: u64,
    pub trace: Vec<TraceEvent>,
    pub views: Vec<ViewSnapshot>,
    /// A rollback and a switch between reactions both happened.
    pub interesting_state_reached: bool,
}

impl SimulationResult {
    /// Stable FNV-1a fingerprint of the trace, for replay comparison.
    #[must_use]
    pub fn trace_fingerprint(&self) -> u64 {
        let encoded = serde_json::to_vec(&self.trace).unwrap_or_default();
        encoded.iter().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
            (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
        })
    }
}

struct VisitorView {
    visitor: usize,
    post: usize,
    view: PostView,
    confirmed: Vec<ReactionKind>,
}

pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    remote: Arc<MemoryRemote>,
    clock: Arc<ManualClock>,
    posts: Vec<PostId>,
    visitor_ids: Vec<VisitorId>,
    views: Vec<VisitorView>,
}

impl Simulator {
    /// Build the world: one remote, and a loaded view per visitor and post.
    ///
    /// # Errors
    ///
    /// Returns an error when the config asks for no visitors, posts or steps.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        if config.visitors == 0 {
            bail!("visitors must be > 0");
        }
        if config.posts == 0 {
            bail!("posts must be > 0");
        }
        if config.steps == 0 {
            bail!("steps must be > 0");
        }

        let remote = Arc::new(MemoryRemote::new());
        let clock = Arc::new(ManualClock::new());
        let mut engage = EngageConfig::default();
        engage.navigator.settle_ms = config.settle_ms;

        let posts: Vec<PostId> = (0..config.posts)
            .map(|p| PostId::new(format!("post-{p}")))
            .collect();
        let visitor_ids: Vec<VisitorId> = (0..config.visitors)
            .map(|v| VisitorId::new(format!("v-sim-{v}")))
            .collect();

        let mut views = Vec::with_capacity(config.visitors * config.posts);
        for (visitor, visitor_id) in visitor_ids.iter().enumerate() {
            let identity = Arc::new(VisitorIdentity::new(MemoryIdentityStore::with_token(
                visitor_id.as_str(),
            )));
            for (post, post_id) in posts.iter().enumerate() {
                let mut view = PostView::open(
                    post_id.clone(),
                    remote.clone(),
                    Arc::clone(&identity),
                    &engage,
                    clock.clone(),
                );
                view.load();
                views.push(VisitorView {
                    visitor,
                    post,
                    view,
                    confirmed: Vec::new(),
                });
            }
        }

        Ok(Self {
            rng: DeterministicRng::new(config.seed),
            config,
            remote,
            clock,
            posts,
            visitor_ids,
            views,
        })
    }

    fn pick_action(&mut self) -> Action {
        match self.rng.index(10) {
            0..=5 => Action::Toggle(if self.rng.coin() {
                ReactionKind::Like
            } else {
                ReactionKind::Dislike
            }),
            6 => Action::Reload,
            7 => Action::Comment {
                reply: self.rng.coin(),
            },
            _ => Action::Navigate,
        }
    }

    /// Run every step, then reload each view and snapshot it.
    ///
    /// # Errors
    ///
    /// Currently infallible once constructed; kept fallible for parity with
    /// [`Simulator::new`].
    pub fn run(&mut self) -> Result<SimulationResult> {
        let mut trace = Vec::with_capacity(usize::try_from(self.config.steps).unwrap_or(0));
        for step in 0..self.config.steps {
            let slot = self.rng.index(self.views.len());
            let action = self.pick_action();
            let kind = self.apply(slot, action);

            let post = &self.posts[self.views[slot].post];
            let event = TraceEvent {
                step,
                visitor: self.views[slot].visitor,
                post: self.views[slot].post,
                remote_total: self.remote.peek_aggregate(post).total(),
                reacting_visitors: u64::try_from(self.remote.reacting_visitors(post))
                    .unwrap_or(u64::MAX),
                kind,
            };
            debug!(step, ?action, "sim step");
            trace.push(event);
            self.clock.advance(Duration::from_millis(self.config.step_ms));
        }

        let views = self.snapshot_views();
        let rolled_back = trace.iter().any(|e| {
            matches!(e.kind, TraceEventKind::Toggle { rolled_back: true, .. })
        });
        let switched = trace.iter().any(|e| match e.kind {
            TraceEventKind::Toggle {
                before,
                after,
                rolled_back: false,
                skipped: false,
                ..
            } => before.mine.is_some() && after.mine.is_some() && before.mine != after.mine,
            _ => false,
        });

        Ok(SimulationResult {
            seed: self.config.seed,
            trace,
            views,
            interesting_state_reached: rolled_back && switched,
        })
    }

    fn apply(&mut self, slot: usize, action: Action) -> TraceEventKind {
        let post_id = self.posts[self.views[slot].post].clone();
        let visitor_id = self.visitor_ids[self.views[slot].visitor].clone();
        let fault = self.config.fault;

        match action {
            Action::Toggle(kind) => {
                let injected_failure = self.rng.percent(fault.submit_failure_percent);
                if injected_failure {
                    self.remote.fail_next(RemoteOp::SubmitReaction, 1);
                }
                let remote_before = self.remote.peek_aggregate(&post_id);
                let target = &mut self.views[slot];
                let before = target.view.reactions();
                let (rolled_back, skipped) = match target.view.toggle(kind) {
                    Ok(outcome) if outcome.is_skipped() => (false, true),
                    Ok(_) => {
                        target.confirmed.push(kind);
                        (false, false)
                    }
                    Err(_) => (true, false),
                };
                let after = target.view.reactions();
                TraceEventKind::Toggle {
                    kind,
                    injected_failure,
                    rolled_back,
                    skipped,
                    before,
                    after,
                    remote_before,
                    remote_after: self.remote.peek_aggregate(&post_id),
                    remote_mine: self.remote.peek_visitor_reaction(&post_id, &visitor_id),
                }
            }
            Action::Reload => {
                if self.rng.percent(fault.fetch_failure_percent) {
                    let op = match self.rng.index(3) {
                        0 => RemoteOp::FetchComments,
                        1 => RemoteOp::FetchAggregate,
                        _ => RemoteOp::FetchVisitorReaction,
                    };
                    self.remote.fail_next(op, 1);
                }
                let report = self.views[slot].view.load();
                TraceEventKind::Reload {
                    comments_ok: report.comments.is_ok(),
                    reactions_ok: report.reactions.is_ok(),
                    after: self.views[slot].view.reactions(),
                    remote_mine: self.remote.peek_visitor_reaction(&post_id, &visitor_id),
                }
            }
            Action::Comment { reply } => {
                if self.rng.percent(fault.create_failure_percent) {
                    self.remote.fail_next(RemoteOp::CreateComment, 1);
                }
                let parent = if reply {
                    let store = self.views[slot].view.store();
                    let len = store.top_level_len();
                    let pick = self.rng.index(len);
                    store.top_level_at(pick).map(|c| c.id.clone())
                } else {
                    None
                };
                let draft = NewComment {
                    post_id,
                    parent_id: parent.clone(),
                    author_name: format!("visitor {}", self.views[slot].visitor),
                    author_email: None,
                    content: format!("step comment from {visitor_id}"),
                };
                let target = &mut self.views[slot];
                let posted = target.view.submit(&draft).is_ok();
                TraceEventKind::Comment {
                    reply: parent.is_some(),
                    posted,
                    thread_len: target.view.store().len(),
                }
            }
            Action::Navigate => {
                let target = &mut self.views[slot];
                let nav = target.view.next();
                TraceEventKind::Navigate {
                    moved: nav.moved(),
                    busy: nav == Navigation::Busy,
                    active: target.view.navigator_state().active_top_level,
                    top_level_len: target.view.store().top_level_len(),
                }
            }
        }
    }

    fn snapshot_views(&mut self) -> Vec<ViewSnapshot> {
        let mut snapshots = Vec::with_capacity(self.views.len());
        for target in &mut self.views {
            let post_id = &self.posts[target.post];
            // Final reads must not be disturbed by faults.
            target.view.load();
            let store = target.view.store();
            let placed_once = count_placed_once(store);
            snapshots.push(ViewSnapshot {
                visitor: target.visitor,
                post: target.post,
                ledger: target.view.reactions(),
                remote_mine: self
                    .remote
                    .peek_visitor_reaction(post_id, &self.visitor_ids[target.visitor]),
                confirmed_toggles: target.confirmed.clone(),
                thread_len: store.len(),
                remote_thread_len: self.remote.peek_comment_count(post_id),
                placed_once,
                active_top_level: target.view.navigator_state().active_top_level,
                top_level_len: store.top_level_len(),
            });
        }
        snapshots
    }
}

fn count_placed_once(store: &engage_core::comment::CommentStore) -> usize {
    let mut seen: Vec<&CommentId> = Vec::with_capacity(store.len());
    for top in store.top_level() {
        seen.push(&top.id);
        seen.extend(
            store
                .replies_of(&top.id)
                .into_iter()
                .filter(|reply| reply.parent_id.as_ref() == Some(&top.id))
                .map(|reply| &reply.id),
        );
    }
    seen.sort();
    let before = seen.len();
    seen.dedup();
    if seen.len() == before { before } else { 0 }
}
