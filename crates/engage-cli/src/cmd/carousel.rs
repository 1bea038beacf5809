//! `engage carousel`: autoplay a post's top-level comments.
//!
//! The view is shared with the autoplay worker behind a mutex; each tick
//! advances the carousel and reports the slide back over a channel. The
//! command returns after `--ticks` slides and the worker is joined before the
//! result is printed. Without `--ticks`, `navigator.autoplay` decides between
//! one full cycle and the first slide alone.

use std::io::Write;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use engage_core::autoplay::Autoplay;
use engage_core::navigator::Navigation;
use engage_core::view::PostView;
use serde::Serialize;
use tracing::{debug, warn};

use super::comments::{CommentRow, preview};
use crate::output::{CliError, OutputMode, fail, pretty_section, render_mode};
use crate::session::Session;

#[derive(Args, Debug)]
pub struct CarouselArgs {
    /// Post whose thread to play.
    pub post: String,

    /// Number of autoplay ticks before stopping. Defaults to one full cycle
    /// when `navigator.autoplay` is on, otherwise none.
    #[arg(long)]
    pub ticks: Option<u64>,

    /// Milliseconds between ticks. Defaults to `navigator.autoplay_ms`.
    #[arg(long, value_name = "MS")]
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
struct Slide {
    /// 0 for the slide shown before autoplay starts.
    tick: u64,
    /// `moved`, `unchanged`, or `busy` (tick fell inside the settle window).
    navigation: &'static str,
    index: usize,
    of: usize,
    comment: CommentRow,
    replies: usize,
}

impl Slide {
    fn capture(view: &PostView, tick: u64, navigation: Navigation) -> Option<Self> {
        let comment = view.active_comment()?;
        let store = view.store();
        Some(Self {
            tick,
            navigation: match navigation {
                Navigation::Moved { .. } => "moved",
                Navigation::Unchanged => "unchanged",
                Navigation::Busy => "busy",
            },
            index: view.navigator_state().active_top_level,
            of: store.top_level_len(),
            replies: store.reply_count(&comment.id),
            comment: CommentRow::from(comment),
        })
    }
}

#[derive(Debug, Serialize)]
struct CarouselOutput {
    post_id: String,
    interval_ms: u64,
    slides: Vec<Slide>,
}

pub fn run_carousel(
    args: &CarouselArgs,
    output: OutputMode,
    session: &Session,
) -> anyhow::Result<()> {
    let mut view = session.view(&args.post);
    if let Err(err) = view.load().comments {
        return Err(fail(output, &CliError::from_code(err.code(), err.to_string())));
    }

    let navigator = &session.config.navigator;
    let interval = args
        .interval_ms
        .map_or_else(|| navigator.autoplay_interval(), Duration::from_millis);
    if interval <= navigator.settle() {
        warn!(
            interval_ms = interval.as_millis(),
            settle_ms = navigator.settle_ms,
            "autoplay interval is not longer than the settle window; ticks will be dropped"
        );
    }

    let mut out = CarouselOutput {
        post_id: args.post.clone(),
        interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        slides: Vec::new(),
    };

    let top_level = view.store().top_level_len();
    if let Some(first) = Slide::capture(&view, 0, Navigation::Unchanged) {
        out.slides.push(first);
        let ticks = args.ticks.unwrap_or_else(|| {
            if navigator.autoplay {
                u64::try_from(top_level).unwrap_or(u64::MAX)
            } else {
                0
            }
        });
        if ticks > 0 {
            out.slides.extend(play(view, interval, ticks)?);
        }
    }

    render_mode(
        output,
        &out,
        |out, w| {
            for slide in &out.slides {
                writeln!(
                    w,
                    "tick={} nav={} slide={}/{} id={} author={} replies={}",
                    slide.tick,
                    slide.navigation,
                    slide.index + 1,
                    slide.of,
                    slide.comment.id,
                    slide.comment.author,
                    slide.replies
                )?;
            }
            Ok(())
        },
        |out, w| {
            pretty_section(w, &format!("Carousel for {}", out.post_id))?;
            if out.slides.is_empty() {
                return writeln!(w, "No comments yet.");
            }
            for slide in &out.slides {
                let marker = if slide.navigation == "busy" { " (settling)" } else { "" };
                writeln!(
                    w,
                    "[{}/{}] {}: {}{marker}",
                    slide.index + 1,
                    slide.of,
                    slide.comment.author,
                    preview(&slide.comment.content, 48)
                )?;
            }
            Ok(())
        },
    )
}

/// Run autoplay for `ticks` ticks and collect the slide after each one.
fn play(view: PostView, interval: Duration, ticks: u64) -> anyhow::Result<Vec<Slide>> {
    let shared = Arc::new(Mutex::new(view));
    let (tx, rx) = mpsc::channel();

    let mut autoplay = {
        let shared = Arc::clone(&shared);
        let mut tick = 0_u64;
        Autoplay::start(interval, move || {
            tick += 1;
            let slide = {
                let mut view = shared.lock().unwrap_or_else(PoisonError::into_inner);
                let navigation = view.next();
                Slide::capture(&view, tick, navigation)
            };
            if let Some(slide) = slide {
                // The receiver is gone once enough slides were collected.
                let _ = tx.send(slide);
            }
        })
        .context("failed to start autoplay")?
    };

    let patience = interval.saturating_mul(4).max(Duration::from_secs(1));
    let mut slides = Vec::new();
    while u64::try_from(slides.len()).unwrap_or(u64::MAX) < ticks {
        match rx.recv_timeout(patience) {
            Ok(slide) => slides.push(slide),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                warn!(received = slides.len(), expected = ticks, "autoplay stalled");
                break;
            }
        }
    }
    autoplay.stop();
    debug!(ticks = autoplay.ticks(), "autoplay finished");
    Ok(slides)
}
