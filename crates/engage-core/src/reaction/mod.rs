//! Like/dislike reactions: the pure toggle rule and the per-post ledger.

pub mod ledger;
pub mod rules;

pub use ledger::{Outcome, ReactionLedger, ReactionSyncError};
pub use rules::{LedgerState, ToggleEffect, apply_toggle};
