//! engage-core library.
//!
//! Threaded comments navigated as a carousel, and anonymous like/dislike
//! reactions with optimistic updates, reconciled against a remote store.
//!
//! # Conventions
//!
//! - **Errors**: one `thiserror` enum per component, each mapping to an
//!   [`error::ErrorCode`]. `anyhow::Result` only where files are read
//!   (config).
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`). Degraded
//!   paths (rollback, quarantine, identity fallback) log at `warn`.
//! - **Remote calls** block; every component reaches the backend through
//!   [`remote::RemoteStore`].

pub mod autoplay;
pub mod clock;
pub mod comment;
pub mod config;
pub mod error;
pub mod identity;
pub mod model;
pub mod navigator;
pub mod reaction;
pub mod remote;
pub mod submission;
pub mod view;

pub use error::ErrorCode;
pub use model::{Comment, CommentId, NewComment, PostId, ReactionCounts, ReactionKind, VisitorId};
