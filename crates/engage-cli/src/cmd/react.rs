//! `engage react`: toggle the current visitor's reaction on a post.

use clap::Args;
use engage_core::ErrorCode;
use engage_core::model::ReactionKind;
use engage_core::reaction::rules::{self, ToggleEffect};
use engage_core::reaction::{LedgerState, Outcome};
use serde::Serialize;
use std::io::Write;
use tracing::warn;

use crate::output::{CliError, OutputMode, fail, render_mode};
use crate::session::Session;

#[derive(Args, Debug)]
pub struct ReactArgs {
    /// Post to react to.
    pub post: String,

    /// `like` or `dislike`. Repeating your current reaction removes it.
    pub kind: ReactionKind,
}

#[derive(Debug, Serialize)]
struct ReactOutput {
    ok: bool,
    post_id: String,
    kind: ReactionKind,
    /// `added`, `switched`, or `removed`.
    effect: &'static str,
    likes: u64,
    dislikes: u64,
    mine: Option<ReactionKind>,
}

const fn effect_name(effect: ToggleEffect) -> &'static str {
    match effect {
        ToggleEffect::Added(_) => "added",
        ToggleEffect::Switched { .. } => "switched",
        ToggleEffect::Removed(_) => "removed",
    }
}

pub fn run_react(args: &ReactArgs, output: OutputMode, session: &Session) -> anyhow::Result<()> {
    let view = session.view(&args.post);
    // Toggling from a stale ledger would compute the wrong transition.
    if let Err(err) = view.ledger().refresh() {
        return Err(fail(output, &CliError::from_code(err.code(), err.to_string())));
    }

    let before = view.reactions();
    let after: LedgerState = match view.toggle(args.kind) {
        Ok(Outcome::Applied(state)) => state,
        Ok(Outcome::Skipped) => {
            return Err(fail(
                output,
                &CliError::from_code(
                    ErrorCode::ReactionSyncFailed,
                    "another reaction for this post is still being saved",
                ),
            ));
        }
        Err(err) => {
            warn!(post = %args.post, kind = %args.kind, "reaction rolled back: {err}");
            return Err(fail(output, &CliError::from_code(err.code(), err.to_string())));
        }
    };

    let out = ReactOutput {
        ok: true,
        post_id: args.post.clone(),
        kind: args.kind,
        effect: effect_name(rules::classify(before.mine, args.kind)),
        likes: after.counts.likes,
        dislikes: after.counts.dislikes,
        mine: after.mine,
    };

    render_mode(
        output,
        &out,
        |out, w| {
            writeln!(
                w,
                "post={} effect={} likes={} dislikes={} mine={}",
                out.post_id,
                out.effect,
                out.likes,
                out.dislikes,
                out.mine.map_or("none", ReactionKind::as_str)
            )
        },
        |out, w| {
            writeln!(w, "✓ {}: {} {}", out.post_id, out.kind, out.effect)?;
            writeln!(w, "  👍 {}   👎 {}", out.likes, out.dislikes)
        },
    )
}
