//! `engage comments`: print a post's thread, replies nested under their parent.

use chrono::SecondsFormat;
use clap::Args;
use engage_core::model::Comment;
use serde::Serialize;
use std::io::Write;

use crate::output::{CliError, OutputMode, fail, pretty_section, render_mode};
use crate::session::Session;

#[derive(Args, Debug)]
pub struct CommentsArgs {
    /// Post to read.
    pub post: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CommentRow {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub author: String,
    pub content: String,
    pub created_at: String,
}

impl From<&Comment> for CommentRow {
    fn from(comment: &Comment) -> Self {
        Self {
            id: comment.id.to_string(),
            parent_id: comment.parent_id.as_ref().map(ToString::to_string),
            author: comment.author_name.clone(),
            content: comment.content.clone(),
            created_at: comment
                .created_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

#[derive(Debug, Serialize)]
struct ThreadEntry {
    #[serde(flatten)]
    comment: CommentRow,
    replies: Vec<CommentRow>,
}

#[derive(Debug, Serialize)]
struct ThreadOutput {
    post_id: String,
    total: usize,
    quarantined: usize,
    threads: Vec<ThreadEntry>,
}

/// First line of `content`, cut to `max` characters.
pub fn preview(content: &str, max: usize) -> String {
    let line = content.lines().next().unwrap_or_default();
    if line.chars().count() > max {
        let cut: String = line.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    } else {
        line.to_string()
    }
}

pub fn run_comments(
    args: &CommentsArgs,
    output: OutputMode,
    session: &Session,
) -> anyhow::Result<()> {
    let mut view = session.view(&args.post);
    let report = view.load();
    if let Err(err) = report.comments {
        return Err(fail(output, &CliError::from_code(err.code(), err.to_string())));
    }

    let store = view.store();
    let threads: Vec<ThreadEntry> = store
        .top_level()
        .into_iter()
        .map(|top| ThreadEntry {
            comment: CommentRow::from(top),
            replies: store
                .replies_of(&top.id)
                .into_iter()
                .map(CommentRow::from)
                .collect(),
        })
        .collect();
    let out = ThreadOutput {
        post_id: args.post.clone(),
        total: store.len(),
        quarantined: store.quarantined().len(),
        threads,
    };

    render_mode(
        output,
        &out,
        |out, w| {
            writeln!(
                w,
                "post={} comments={} quarantined={}",
                out.post_id, out.total, out.quarantined
            )?;
            for entry in &out.threads {
                let c = &entry.comment;
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}",
                    c.id,
                    c.created_at,
                    c.author,
                    preview(&c.content, 80)
                )?;
                for r in &entry.replies {
                    writeln!(
                        w,
                        "  {}\t{}\t{}\t{}",
                        r.id,
                        r.created_at,
                        r.author,
                        preview(&r.content, 78)
                    )?;
                }
            }
            Ok(())
        },
        |out, w| {
            pretty_section(w, &format!("Comments on {} ({})", out.post_id, out.total))?;
            if out.threads.is_empty() {
                writeln!(w, "No comments yet.")?;
            }
            for (index, entry) in out.threads.iter().enumerate() {
                let c = &entry.comment;
                writeln!(w, "[{}] {} · {}", index + 1, c.author, c.created_at)?;
                for line in c.content.lines() {
                    writeln!(w, "    {line}")?;
                }
                for r in &entry.replies {
                    writeln!(
                        w,
                        "    ↳ {} · {}: {}",
                        r.author,
                        r.created_at,
                        preview(&r.content, 56)
                    )?;
                }
            }
            if out.quarantined > 0 {
                writeln!(w, "({} replies hidden: parent missing)", out.quarantined)?;
            }
            Ok(())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_keeps_short_first_line() {
        assert_eq!(preview("hello\nworld", 80), "hello");
        assert_eq!(preview("", 10), "");
    }

    #[test]
    fn preview_cuts_long_lines() {
        let cut = preview("abcdefghij", 5);
        assert_eq!(cut, "abcd…");
        assert_eq!(cut.chars().count(), 5);
    }
}
