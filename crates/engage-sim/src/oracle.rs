use engage_core::model::ReactionKind;
use engage_core::reaction::LedgerState;
use engage_core::reaction::rules;

use crate::{SimulationResult, TraceEvent, TraceEventKind, ViewSnapshot};

/// Outcome of one or more invariant checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    #[must_use]
    fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    #[must_use]
    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    /// Merge another result into this one (failures accumulate).
    #[must_use]
    fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

/// One broken guarantee, with the evidence that shows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// The remote aggregate counts a reaction no visitor holds, or misses one.
    AggregateDrift {
        step: u64,
        post: usize,
        remote_total: u64,
        reacting_visitors: u64,
    },

    /// The view believes the visitor holds a different reaction than the
    /// backend has recorded.
    MineDiverged {
        step: u64,
        visitor: usize,
        post: usize,
        ledger: Option<ReactionKind>,
        remote: Option<ReactionKind>,
    },

    /// A failed write left the view or the backend changed.
    IncompleteRollback {
        step: u64,
        visitor: usize,
        post: usize,
        before: LedgerState,
        after: LedgerState,
    },

    /// Folding the confirmed toggles does not reproduce the final ledger.
    FoldMismatch {
        visitor: usize,
        post: usize,
        folded: Option<ReactionKind>,
        ledger: Option<ReactionKind>,
    },

    /// After a clean reload, the thread does not list every stored comment
    /// exactly once.
    ThreadIncomplete {
        visitor: usize,
        post: usize,
        listed: usize,
        placed_once: usize,
        stored: usize,
    },

    /// The carousel points past the end of its list.
    IndexOutOfRange {
        step: Option<u64>,
        visitor: usize,
        post: usize,
        active: usize,
        len: usize,
    },
}

/// Checks a finished simulation against the engine's guarantees.
///
/// # Invariants checked
///
/// 1. **Aggregate consistency** (`check_aggregate`): every post's remote total
///    equals the number of visitors holding a reaction on it.
/// 2. **Own reaction** (`check_own_reaction`): after every toggle and reload,
///    and at the end of the run, the view's idea of the visitor's reaction
///    matches the backend.
/// 3. **Rollback** (`check_rollback`): a failed write restores the pre-toggle
///    ledger exactly and leaves the backend untouched.
/// 4. **Fold** (`check_fold`): replaying the confirmed toggles through the pure
///    transition rule ends where the ledger ends.
/// 5. **Thread shape** (`check_threads`): after the final reload each view
///    lists every stored comment exactly once and its carousel index is in
///    range.
pub struct EngagementOracle;

impl EngagementOracle {
    #[must_use]
    pub fn check_all(result: &SimulationResult) -> OracleResult {
        OracleResult::pass()
            .merge(Self::check_aggregate(&result.trace))
            .merge(Self::check_own_reaction(&result.trace, &result.views))
            .merge(Self::check_rollback(&result.trace))
            .merge(Self::check_fold(&result.views))
            .merge(Self::check_threads(&result.trace, &result.views))
    }

    #[must_use]
    pub fn check_aggregate(trace: &[TraceEvent]) -> OracleResult {
        let violations = trace
            .iter()
            .filter(|event| event.remote_total != event.reacting_visitors)
            .map(|event| InvariantViolation::AggregateDrift {
                step: event.step,
                post: event.post,
                remote_total: event.remote_total,
                reacting_visitors: event.reacting_visitors,
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    /// A failed reload keeps the previous ledger, which still matches: only
    /// this view ever changes this visitor's reaction on this post.
    #[must_use]
    pub fn check_own_reaction(trace: &[TraceEvent], views: &[ViewSnapshot]) -> OracleResult {
        let mut violations = Vec::new();

        for event in trace {
            let observed = match &event.kind {
                TraceEventKind::Toggle {
                    after, remote_mine, ..
                }
                | TraceEventKind::Reload {
                    after, remote_mine, ..
                } => Some((after.mine, *remote_mine)),
                TraceEventKind::Comment { .. } | TraceEventKind::Navigate { .. } => None,
            };
            if let Some((ledger, remote)) = observed
                && ledger != remote
            {
                violations.push(InvariantViolation::MineDiverged {
                    step: event.step,
                    visitor: event.visitor,
                    post: event.post,
                    ledger,
                    remote,
                });
            }
        }

        for view in views {
            if view.ledger.mine != view.remote_mine {
                violations.push(InvariantViolation::MineDiverged {
                    step: u64::MAX,
                    visitor: view.visitor,
                    post: view.post,
                    ledger: view.ledger.mine,
                    remote: view.remote_mine,
                });
            }
        }

        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_rollback(trace: &[TraceEvent]) -> OracleResult {
        let violations = trace
            .iter()
            .filter_map(|event| match &event.kind {
                TraceEventKind::Toggle {
                    rolled_back: true,
                    before,
                    after,
                    remote_before,
                    remote_after,
                    ..
                } if before != after || remote_before != remote_after => {
                    Some(InvariantViolation::IncompleteRollback {
                        step: event.step,
                        visitor: event.visitor,
                        post: event.post,
                        before: *before,
                        after: *after,
                    })
                }
                _ => None,
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    /// Every view starts without a reaction, so the fold starts from the
    /// default state; counts are not compared because other visitors move them.
    #[must_use]
    pub fn check_fold(views: &[ViewSnapshot]) -> OracleResult {
        let violations = views
            .iter()
            .filter_map(|view| {
                let folded = rules::fold(
                    LedgerState::default(),
                    view.confirmed_toggles.iter().copied(),
                )
                .mine;
                (folded != view.ledger.mine).then_some(InvariantViolation::FoldMismatch {
                    visitor: view.visitor,
                    post: view.post,
                    folded,
                    ledger: view.ledger.mine,
                })
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_threads(trace: &[TraceEvent], views: &[ViewSnapshot]) -> OracleResult {
        let mut violations = Vec::new();

        for event in trace {
            if let TraceEventKind::Navigate {
                active,
                top_level_len,
                ..
            } = event.kind
                && !index_in_range(active, top_level_len)
            {
                violations.push(InvariantViolation::IndexOutOfRange {
                    step: Some(event.step),
                    visitor: event.visitor,
                    post: event.post,
                    active,
                    len: top_level_len,
                });
            }
        }

        for view in views {
            if view.thread_len != view.remote_thread_len || view.placed_once != view.thread_len {
                violations.push(InvariantViolation::ThreadIncomplete {
                    visitor: view.visitor,
                    post: view.post,
                    listed: view.thread_len,
                    placed_once: view.placed_once,
                    stored: view.remote_thread_len,
                });
            }
            if !index_in_range(view.active_top_level, view.top_level_len) {
                violations.push(InvariantViolation::IndexOutOfRange {
                    step: None,
                    visitor: view.visitor,
                    post: view.post,
                    active: view.active_top_level,
                    len: view.top_level_len,
                });
            }
        }

        OracleResult::from_violations(violations)
    }
}

const fn index_in_range(active: usize, len: usize) -> bool {
    active < len || (len == 0 && active == 0)
}

#[cfg(test)]
mod tests {
    use engage_core::model::ReactionCounts;

    use super::*;

    fn toggle_event(step: u64, before: LedgerState, after: LedgerState) -> TraceEvent {
        TraceEvent {
            step,
            visitor: 0,
            post: 0,
            remote_total: 1,
            reacting_visitors: 1,
            kind: TraceEventKind::Toggle {
                kind: ReactionKind::Like,
                injected_failure: true,
                rolled_back: true,
                skipped: false,
                before,
                after,
                remote_before: ReactionCounts::new(1, 0),
                remote_after: ReactionCounts::new(1, 0),
                remote_mine: after.mine,
            },
        }
    }

    fn snapshot(confirmed: Vec<ReactionKind>, mine: Option<ReactionKind>) -> ViewSnapshot {
        ViewSnapshot {
            visitor: 0,
            post: 0,
            ledger: LedgerState::new(ReactionCounts::default(), mine),
            remote_mine: mine,
            confirmed_toggles: confirmed,
            thread_len: 2,
            remote_thread_len: 2,
            placed_once: 2,
            active_top_level: 0,
            top_level_len: 1,
        }
    }

    #[test]
    fn drift_between_total_and_visitors_is_reported() {
        let mut event = toggle_event(3, LedgerState::default(), LedgerState::default());
        event.reacting_visitors = 2;
        let result = EngagementOracle::check_aggregate(&[event]);
        assert!(!result.passed);
        assert!(matches!(
            result.violations[0],
            InvariantViolation::AggregateDrift { step: 3, .. }
        ));
    }

    #[test]
    fn partial_rollback_is_reported() {
        let before = LedgerState::default();
        let after = LedgerState::new(ReactionCounts::new(1, 0), Some(ReactionKind::Like));
        let result = EngagementOracle::check_rollback(&[toggle_event(0, before, after)]);
        assert_eq!(result.violations.len(), 1);

        let clean = EngagementOracle::check_rollback(&[toggle_event(0, before, before)]);
        assert!(clean.passed);
    }

    #[test]
    fn fold_matches_final_ledger() {
        let toggles = vec![ReactionKind::Like, ReactionKind::Dislike];
        let ok =
            EngagementOracle::check_fold(&[snapshot(toggles.clone(), Some(ReactionKind::Dislike))]);
        assert!(ok.passed);

        let bad = EngagementOracle::check_fold(&[snapshot(toggles, None)]);
        assert!(matches!(
            bad.violations.as_slice(),
            [InvariantViolation::FoldMismatch {
                folded: Some(ReactionKind::Dislike),
                ledger: None,
                ..
            }]
        ));
    }

    #[test]
    fn missing_comments_and_bad_index_are_reported() {
        let mut view = snapshot(Vec::new(), None);
        view.remote_thread_len = 3;
        view.active_top_level = 1;
        let result = EngagementOracle::check_threads(&[], &[view]);
        assert_eq!(result.violations.len(), 2);
    }

    #[test]
    fn empty_carousel_at_zero_is_in_range() {
        assert!(index_in_range(0, 0));
        assert!(!index_in_range(1, 0));
        assert!(index_in_range(2, 3));
    }

    #[test]
    fn merge_accumulates_failures() {
        let fail = OracleResult::from_violations(vec![InvariantViolation::IndexOutOfRange {
            step: None,
            visitor: 0,
            post: 0,
            active: 4,
            len: 1,
        }]);
        let merged = OracleResult::pass().merge(fail.clone()).merge(fail);
        assert!(!merged.passed);
        assert_eq!(merged.violations.len(), 2);
    }
}
