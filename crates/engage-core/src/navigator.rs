//! Carousel state machine over a post's thread.
//!
//! Two cursors: one over the top-level comments and one over the replies of
//! the active top-level comment. Moving the top-level cursor resets the reply
//! cursor. Every successful move opens a settle window; navigation requested
//! while the window is open is dropped, not queued.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::comment::{CommentStore, Placement};

/// Observable navigator state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NavigatorState {
    pub active_top_level: usize,
    pub active_reply: usize,
    pub is_transitioning: bool,
}

/// Result of a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Moved { from: usize, to: usize },
    /// Nothing to do: target is current, out of range, or fewer than two slides.
    Unchanged,
    /// Dropped because a transition is still settling.
    Busy,
}

impl Navigation {
    #[must_use]
    pub const fn moved(self) -> bool {
        matches!(self, Self::Moved { .. })
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    TopLevel,
    Reply,
}

pub struct ThreadNavigator {
    clock: Arc<dyn Clock>,
    settle_ms: u64,
    active_top_level: usize,
    active_reply: usize,
    settle_until: Option<u64>,
}

impl std::fmt::Debug for ThreadNavigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadNavigator")
            .field("settle_ms", &self.settle_ms)
            .field("active_top_level", &self.active_top_level)
            .field("active_reply", &self.active_reply)
            .field("settle_until", &self.settle_until)
            .finish_non_exhaustive()
    }
}

impl ThreadNavigator {
    pub fn new(clock: Arc<dyn Clock>, settle: Duration) -> Self {
        Self {
            clock,
            settle_ms: u64::try_from(settle.as_millis()).unwrap_or(u64::MAX),
            active_top_level: 0,
            active_reply: 0,
            settle_until: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> NavigatorState {
        NavigatorState {
            active_top_level: self.active_top_level,
            active_reply: self.active_reply,
            is_transitioning: self.is_transitioning(),
        }
    }

    #[must_use]
    pub fn is_transitioning(&self) -> bool {
        self.settle_until
            .is_some_and(|until| self.clock.now_millis() < until)
    }

    pub fn next(&mut self, store: &CommentStore) -> Navigation {
        self.step(Axis::TopLevel, store, true)
    }

    pub fn prev(&mut self, store: &CommentStore) -> Navigation {
        self.step(Axis::TopLevel, store, false)
    }

    pub fn go_to(&mut self, store: &CommentStore, index: usize) -> Navigation {
        self.jump(Axis::TopLevel, store, index)
    }

    pub fn next_reply(&mut self, store: &CommentStore) -> Navigation {
        self.step(Axis::Reply, store, true)
    }

    pub fn prev_reply(&mut self, store: &CommentStore) -> Navigation {
        self.step(Axis::Reply, store, false)
    }

    pub fn go_to_reply(&mut self, store: &CommentStore, index: usize) -> Navigation {
        self.jump(Axis::Reply, store, index)
    }

    /// Show a freshly appended comment. Ignores the settle guard.
    pub fn focus(&mut self, placement: Placement) -> NavigatorState {
        match placement {
            Placement::TopLevel { index } => {
                self.active_top_level = index;
                self.active_reply = 0;
            }
            Placement::Reply {
                parent_index,
                index,
            } => {
                self.active_top_level = parent_index;
                self.active_reply = index;
            }
        }
        self.begin_settle();
        debug!(?placement, "focused appended comment");
        self.state()
    }

    /// Pull the cursors back in range after the thread shrank.
    pub fn reconcile(&mut self, store: &CommentStore) -> NavigatorState {
        let top = store.top_level_len();
        self.active_top_level = clamp_index(self.active_top_level, top);
        let replies = self.reply_len(store);
        self.active_reply = clamp_index(self.active_reply, replies);
        self.state()
    }

    fn len(&self, axis: Axis, store: &CommentStore) -> usize {
        match axis {
            Axis::TopLevel => store.top_level_len(),
            Axis::Reply => self.reply_len(store),
        }
    }

    fn reply_len(&self, store: &CommentStore) -> usize {
        store
            .top_level_at(self.active_top_level)
            .map_or(0, |comment| store.reply_count(&comment.id))
    }

    const fn cursor(&self, axis: Axis) -> usize {
        match axis {
            Axis::TopLevel => self.active_top_level,
            Axis::Reply => self.active_reply,
        }
    }

    fn step(&mut self, axis: Axis, store: &CommentStore, forward: bool) -> Navigation {
        if self.is_transitioning() {
            return Navigation::Busy;
        }
        let len = self.len(axis, store);
        if len < 2 {
            return Navigation::Unchanged;
        }
        let from = self.cursor(axis).min(len - 1);
        let to = if forward {
            (from + 1) % len
        } else {
            (from + len - 1) % len
        };
        self.move_to(axis, from, to)
    }

    fn jump(&mut self, axis: Axis, store: &CommentStore, index: usize) -> Navigation {
        if self.is_transitioning() {
            return Navigation::Busy;
        }
        let from = self.cursor(axis);
        if index == from || index >= self.len(axis, store) {
            return Navigation::Unchanged;
        }
        self.move_to(axis, from, index)
    }

    fn move_to(&mut self, axis: Axis, from: usize, to: usize) -> Navigation {
        match axis {
            Axis::TopLevel => {
                self.active_top_level = to;
                self.active_reply = 0;
            }
            Axis::Reply => self.active_reply = to,
        }
        self.begin_settle();
        debug!(?axis, from, to, "carousel moved");
        Navigation::Moved { from, to }
    }

    fn begin_settle(&mut self) {
        self.settle_until = Some(self.clock.now_millis().saturating_add(self.settle_ms));
    }
}

const fn clamp_index(index: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else if index >= len {
        len - 1
    } else {
        index
    }
}
