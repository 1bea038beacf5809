use clap::Args;
use engage_core::model::ReactionKind;
use serde::Serialize;
use std::io::Write;

use crate::output::{CliError, OutputMode, fail, pretty_kv, pretty_section, render_mode};
use crate::session::Session;

#[derive(Args, Debug)]
pub struct ReactionsArgs {
    /// Post to inspect.
    pub post: String,
}

#[derive(Debug, Serialize)]
struct ReactionsOutput {
    post_id: String,
    likes: u64,
    dislikes: u64,
    total: u64,
    mine: Option<ReactionKind>,
    visitor_id: String,
}

pub fn run_reactions(
    args: &ReactionsArgs,
    output: OutputMode,
    session: &Session,
) -> anyhow::Result<()> {
    let view = session.view(&args.post);
    if let Err(err) = view.ledger().refresh() {
        return Err(fail(output, &CliError::from_code(err.code(), err.to_string())));
    }

    let state = view.reactions();
    let out = ReactionsOutput {
        post_id: args.post.clone(),
        likes: state.counts.likes,
        dislikes: state.counts.dislikes,
        total: state.counts.total(),
        mine: state.mine,
        visitor_id: session.identity.get_or_create().to_string(),
    };

    render_mode(
        output,
        &out,
        |out, w| {
            writeln!(
                w,
                "post={} likes={} dislikes={} mine={}",
                out.post_id,
                out.likes,
                out.dislikes,
                out.mine.map_or("none", ReactionKind::as_str)
            )
        },
        |out, w| {
            pretty_section(w, &format!("Reactions on {}", out.post_id))?;
            pretty_kv(w, "Likes", out.likes.to_string())?;
            pretty_kv(w, "Dislikes", out.dislikes.to_string())?;
            pretty_kv(
                w,
                "Yours",
                out.mine.map_or_else(|| "none".to_string(), |kind| kind.to_string()),
            )
        },
    )
}
