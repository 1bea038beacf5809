//! `engage comment`: post a comment or a reply.

use clap::Args;
use engage_core::model::{CommentId, NewComment, PostId};
use engage_core::submission::SubmitError;
use serde::Serialize;
use std::io::Write;
use tracing::info;

use super::comments::CommentRow;
use crate::output::{CliError, OutputMode, fail, render};
use crate::session::Session;

#[derive(Args, Debug)]
pub struct CommentArgs {
    /// Post to comment on.
    pub post: String,

    /// Display name shown next to the comment.
    #[arg(long)]
    pub name: String,

    /// Optional contact email; never shown publicly.
    #[arg(long)]
    pub email: Option<String>,

    /// Reply to this top-level comment instead of starting a new thread.
    #[arg(long, value_name = "COMMENT_ID")]
    pub reply_to: Option<String>,

    /// Comment text.
    pub content: String,
}

#[derive(Debug, Serialize)]
struct CommentOutput {
    ok: bool,
    post_id: String,
    comment: CommentRow,
    /// Top-level slide now on screen.
    active_top_level: usize,
    active_reply: usize,
}

impl CommentArgs {
    fn draft(&self) -> NewComment {
        NewComment {
            post_id: PostId::from(self.post.as_str()),
            parent_id: self.reply_to.as_deref().map(CommentId::from),
            author_name: self.name.clone(),
            author_email: self.email.clone(),
            content: self.content.clone(),
        }
    }
}

fn submit_error(err: &SubmitError) -> CliError {
    let message = match err {
        SubmitError::Validation(invalid) => format!("invalid {invalid}"),
        SubmitError::Submission(failed) => failed.to_string(),
    };
    CliError::from_code(err.code(), message)
}

pub fn run_comment(
    args: &CommentArgs,
    output: OutputMode,
    session: &Session,
) -> anyhow::Result<()> {
    let mut view = session.view(&args.post);
    // Replies are checked against the loaded thread.
    if let Err(err) = view.load().comments {
        return Err(fail(output, &CliError::from_code(err.code(), err.to_string())));
    }

    let comment = view
        .submit(&args.draft())
        .map_err(|err| fail(output, &submit_error(&err)))?;
    info!(post = %args.post, comment = %comment.id, "comment posted");

    let state = view.navigator_state();
    let out = CommentOutput {
        ok: true,
        post_id: args.post.clone(),
        comment: CommentRow::from(&comment),
        active_top_level: state.active_top_level,
        active_reply: state.active_reply,
    };

    render(output, &out, |out, w| match &out.comment.parent_id {
        Some(parent) => writeln!(
            w,
            "✓ {}: reply {} posted under {parent}",
            out.post_id, out.comment.id
        ),
        None => writeln!(w, "✓ {}: comment {} posted", out.post_id, out.comment.id),
    })
}
