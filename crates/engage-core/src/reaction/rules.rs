//! Pure toggle rule for one visitor's reaction on one post.

use serde::{Deserialize, Serialize};

use crate::model::{ReactionCounts, ReactionKind};

/// What a ledger shows: the aggregate plus the visitor's own reaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub counts: ReactionCounts,
    pub mine: Option<ReactionKind>,
}

impl LedgerState {
    #[must_use]
    pub const fn new(counts: ReactionCounts, mine: Option<ReactionKind>) -> Self {
        Self { counts, mine }
    }
}

/// Which branch of the rule a toggle took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleEffect {
    Added(ReactionKind),
    Switched { from: ReactionKind, to: ReactionKind },
    Removed(ReactionKind),
}

/// Classify a toggle of `kind` against the visitor's current reaction.
#[must_use]
pub fn classify(mine: Option<ReactionKind>, kind: ReactionKind) -> ToggleEffect {
    match mine {
        Some(current) if current == kind => ToggleEffect::Removed(kind),
        Some(current) => ToggleEffect::Switched {
            from: current,
            to: kind,
        },
        None => ToggleEffect::Added(kind),
    }
}

/// State after toggling `kind`.
///
/// Same reaction removes it, the opposite one switches, none adds. Counters
/// never go below zero.
#[must_use]
pub fn apply_toggle(state: LedgerState, kind: ReactionKind) -> LedgerState {
    let mut counts = state.counts;
    let mine = match classify(state.mine, kind) {
        ToggleEffect::Removed(removed) => {
            counts.decrement(removed);
            None
        }
        ToggleEffect::Switched { from, to } => {
            counts.decrement(from);
            counts.increment(to);
            Some(to)
        }
        ToggleEffect::Added(added) => {
            counts.increment(added);
            Some(added)
        }
    };
    LedgerState { counts, mine }
}

/// Fold a sequence of toggles over `initial`.
#[must_use]
pub fn fold(initial: LedgerState, toggles: impl IntoIterator<Item = ReactionKind>) -> LedgerState {
    toggles.into_iter().fold(initial, apply_toggle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReactionKind::{Dislike, Like};

    fn state(likes: u64, dislikes: u64, mine: Option<ReactionKind>) -> LedgerState {
        LedgerState::new(ReactionCounts::new(likes, dislikes), mine)
    }

    #[test]
    fn like_then_dislike_then_dislike() {
        let start = state(3, 1, None);
        let liked = apply_toggle(start, Like);
        assert_eq!(liked, state(4, 1, Some(Like)));
        let switched = apply_toggle(liked, Dislike);
        assert_eq!(switched, state(3, 2, Some(Dislike)));
        let cleared = apply_toggle(switched, Dislike);
        assert_eq!(cleared, state(3, 1, None));
    }

    #[test]
    fn same_toggle_twice_restores_counts() {
        for kind in [Like, Dislike] {
            let start = state(7, 2, None);
            assert_eq!(fold(start, [kind, kind]), start);
        }
    }

    #[test]
    fn removal_floors_at_zero() {
        // Visitor holds a like the aggregate does not reflect yet.
        assert_eq!(apply_toggle(state(0, 0, Some(Like)), Like), state(0, 0, None));
        assert_eq!(
            apply_toggle(state(0, 4, Some(Like)), Dislike),
            state(0, 5, Some(Dislike))
        );
    }

    #[test]
    fn classify_covers_each_branch() {
        assert_eq!(classify(None, Like), ToggleEffect::Added(Like));
        assert_eq!(classify(Some(Like), Like), ToggleEffect::Removed(Like));
        assert_eq!(
            classify(Some(Dislike), Like),
            ToggleEffect::Switched {
                from: Dislike,
                to: Like
            }
        );
    }
}
