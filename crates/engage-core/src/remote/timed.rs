//! Latency accounting for remote calls.
//!
//! [`TimedRemote`] wraps any [`RemoteStore`] and records how long each call
//! took, keyed by operation name. The CLI prints the report with `--timing`.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;

use super::memory::RemoteOp;
use super::{RemoteError, RemoteStore};
use crate::model::{Comment, NewComment, PostId, ReactionCounts, ReactionKind, VisitorId};

/// Aggregated latency report across remote operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingReport {
    /// Per-operation statistics, sorted by operation name.
    pub operations: Vec<OpTiming>,
}

/// Latency statistics for one remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpTiming {
    pub name: &'static str,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub count: usize,
    /// Calls that returned an error.
    pub failures: usize,
}

#[derive(Debug, Default)]
struct Samples {
    elapsed: Vec<Duration>,
    failures: usize,
}

/// Decorator that times every call to the wrapped remote.
#[derive(Debug)]
pub struct TimedRemote<R> {
    inner: R,
    samples: Mutex<BTreeMap<&'static str, Samples>>,
}

impl<R: RemoteStore> TimedRemote<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            samples: Mutex::new(BTreeMap::new()),
        }
    }

    /// The wrapped remote.
    pub const fn inner(&self) -> &R {
        &self.inner
    }

    fn timed<T>(
        &self,
        op: RemoteOp,
        call: impl FnOnce(&R) -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let started = Instant::now();
        let result = call(&self.inner);
        let elapsed = started.elapsed();

        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = samples.entry(op.name()).or_default();
        entry.elapsed.push(elapsed);
        if result.is_err() {
            entry.failures += 1;
        }
        result
    }

    /// Snapshot of all samples recorded so far.
    #[must_use]
    pub fn report(&self) -> TimingReport {
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        let operations = samples
            .iter()
            .map(|(&name, recorded)| {
                let mut values = recorded.elapsed.clone();
                values.sort_unstable();
                OpTiming {
                    name,
                    p50: percentile(&values, 50),
                    p95: percentile(&values, 95),
                    p99: percentile(&values, 99),
                    count: values.len(),
                    failures: recorded.failures,
                }
            })
            .collect();
        TimingReport { operations }
    }
}

impl TimingReport {
    /// Returns true when no remote call was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// JSON form with microsecond latencies.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        #[derive(Serialize)]
        struct Row<'a> {
            name: &'a str,
            count: usize,
            failures: usize,
            p50_us: u128,
            p95_us: u128,
            p99_us: u128,
        }

        let rows: Vec<Row<'_>> = self
            .operations
            .iter()
            .map(|op| Row {
                name: op.name,
                count: op.count,
                failures: op.failures,
                p50_us: op.p50.as_micros(),
                p95_us: op.p95.as_micros(),
                p99_us: op.p99.as_micros(),
            })
            .collect();
        json!({ "remote_timing": rows })
    }

    /// One line per operation, suitable for stderr.
    #[must_use]
    pub fn display_table(&self) -> String {
        let mut out = format!(
            "{:<34} {:>5} {:>5} {:>8} {:>8} {:>8}\n",
            "operation", "count", "fail", "p50", "p95", "p99"
        );
        for op in &self.operations {
            out.push_str(&format!(
                "{:<34} {:>5} {:>5} {:>8} {:>8} {:>8}\n",
                op.name,
                op.count,
                op.failures,
                format_duration(op.p50),
                format_duration(op.p95),
                format_duration(op.p99),
            ));
        }
        out
    }
}

fn format_duration(duration: Duration) -> String {
    let micros = duration.as_micros();
    if micros >= 1_000 {
        format!("{}ms", micros / 1_000)
    } else {
        format!("{micros}us")
    }
}

/// Nearest-rank percentile over sorted samples.
fn percentile(sorted: &[Duration], pct: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted[rank.min(sorted.len()) - 1]
}

impl<R: RemoteStore> RemoteStore for TimedRemote<R> {
    fn fetch_comments(&self, post_id: &PostId) -> Result<Vec<Comment>, RemoteError> {
        self.timed(RemoteOp::FetchComments, |r| r.fetch_comments(post_id))
    }

    fn create_comment(&self, draft: &NewComment) -> Result<Comment, RemoteError> {
        self.timed(RemoteOp::CreateComment, |r| r.create_comment(draft))
    }

    fn fetch_reaction_aggregate(&self, post_id: &PostId) -> Result<ReactionCounts, RemoteError> {
        self.timed(RemoteOp::FetchAggregate, |r| {
            r.fetch_reaction_aggregate(post_id)
        })
    }

    fn fetch_visitor_reaction(
        &self,
        post_id: &PostId,
        visitor_id: &VisitorId,
    ) -> Result<Option<ReactionKind>, RemoteError> {
        self.timed(RemoteOp::FetchVisitorReaction, |r| {
            r.fetch_visitor_reaction(post_id, visitor_id)
        })
    }

    fn submit_reaction(
        &self,
        post_id: &PostId,
        visitor_id: &VisitorId,
        kind: ReactionKind,
    ) -> Result<(), RemoteError> {
        self.timed(RemoteOp::SubmitReaction, |r| {
            r.submit_reaction(post_id, visitor_id, kind)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemote;

    #[test]
    fn percentile_uses_nearest_rank() {
        let values: Vec<Duration> = (1..=100).map(Duration::from_millis).collect();
        assert_eq!(percentile(&values, 50), Duration::from_millis(50));
        assert_eq!(percentile(&values, 95), Duration::from_millis(95));
        assert_eq!(percentile(&values, 99), Duration::from_millis(99));
        assert_eq!(percentile(&[], 50), Duration::ZERO);
    }

    #[test]
    fn records_calls_and_failures_per_operation() {
        let timed = TimedRemote::new(MemoryRemote::new());
        let post = PostId::from("p1");
        timed.inner().fail_next(RemoteOp::FetchComments, 1);

        assert!(timed.fetch_comments(&post).is_err());
        assert!(timed.fetch_comments(&post).is_ok());
        assert!(timed.fetch_reaction_aggregate(&post).is_ok());

        let report = timed.report();
        assert_eq!(report.operations.len(), 2);
        let fetch = report
            .operations
            .iter()
            .find(|op| op.name == "remote.fetch_comments")
            .expect("fetch timing");
        assert_eq!(fetch.count, 2);
        assert_eq!(fetch.failures, 1);
    }

    #[test]
    fn empty_report_renders_header_only() {
        let timed = TimedRemote::new(MemoryRemote::new());
        let report = timed.report();
        assert!(report.is_empty());
        assert_eq!(report.display_table().lines().count(), 1);
        assert_eq!(report.to_json()["remote_timing"], json!([]));
    }

    #[test]
    fn table_columns_line_up_with_header() {
        let timed = TimedRemote::new(MemoryRemote::new());
        assert!(timed.fetch_comments(&PostId::from("p1")).is_ok());
        let table = timed.report().display_table();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), lines[1].len());
        assert!(lines[0].starts_with("operation "));
        assert!(lines[0].ends_with("p99"));
        let count_end = lines[0].find("count").expect("count column") + "count".len();
        assert_eq!(&lines[1][count_end - 1..count_end], "1");
    }
}
