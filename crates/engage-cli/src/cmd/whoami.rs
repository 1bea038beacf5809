//! `engage whoami`: show the anonymous visitor id reactions are filed under.

use serde::Serialize;
use std::io::Write;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use crate::session::Session;

#[derive(Debug, Serialize)]
struct WhoamiOutput {
    visitor_id: String,
    /// `false` when the id lives only for this run.
    persistent: bool,
    identity_file: Option<String>,
    database: String,
}

pub fn run_whoami(output: OutputMode, session: &Session) -> anyhow::Result<()> {
    let visitor_id = session.identity.get_or_create();
    let out = WhoamiOutput {
        visitor_id: visitor_id.to_string(),
        persistent: session.identity.is_persistent(),
        identity_file: session
            .identity_file
            .as_ref()
            .map(|path| path.display().to_string()),
        database: session.database.display().to_string(),
    };

    render_mode(
        output,
        &out,
        |out, w| {
            writeln!(
                w,
                "visitor_id={} persistent={}",
                out.visitor_id, out.persistent
            )
        },
        |out, w| {
            pretty_section(w, "Visitor")?;
            pretty_kv(w, "Id", &out.visitor_id)?;
            pretty_kv(w, "Persistent", if out.persistent { "yes" } else { "no (this run only)" })?;
            if let Some(path) = &out.identity_file {
                pretty_kv(w, "Stored in", path)?;
            }
            pretty_kv(w, "Database", &out.database)
        },
    )
}
