//! E2E CLI tests for reactions and visitor identity:
//! - toggle transitions (`engage react`): add, switch, remove
//! - aggregate counts across visitors (`engage reactions`)
//! - visitor id persistence (`engage whoami`)
//! - timing report on stderr
//!
//! Visitors are told apart by their identity file; all of them share one
//! database, the way separate browsers share one backend.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

/// One visitor: a project dir whose config names its own identity file.
struct Visitor {
    dir: PathBuf,
}

impl Visitor {
    fn new(root: &Path, name: &str, database: &Path) -> Self {
        let dir = root.join(name);
        let config_dir = dir.join(".engage");
        std::fs::create_dir_all(&config_dir).expect("create .engage");
        let config = format!(
            "[navigator]\nsettle_ms = 0\n\n[storage]\ndatabase = {:?}\nidentity_file = {:?}\n",
            database.display().to_string(),
            dir.join("visitor-id").display().to_string(),
        );
        std::fs::write(config_dir.join("config.toml"), config).expect("write config");
        Self { dir }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("engage"));
        cmd.current_dir(&self.dir);
        cmd.env("ENGAGE_LOG", "error");
        cmd.env_remove("FORMAT");
        cmd.env_remove("ENGAGE_TIMING");
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self
            .cmd()
            .args(args)
            .arg("--json")
            .output()
            .expect("engage should not crash");
        assert!(
            output.status.success(),
            "engage {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("--json should produce valid JSON")
    }

    fn react(&self, post: &str, kind: &str) -> Value {
        self.json(&["react", post, kind])
    }
}

fn world(names: &[&str]) -> (TempDir, Vec<Visitor>) {
    let root = tempfile::tempdir().expect("tempdir");
    let database = root.path().join("shared.db");
    let visitors = names
        .iter()
        .map(|name| Visitor::new(root.path(), name, &database))
        .collect();
    (root, visitors)
}

// ---------------------------------------------------------------------------
// Toggle transitions
// ---------------------------------------------------------------------------

#[test]
fn like_then_like_again_removes_it() {
    let (_root, visitors) = world(&["ada"]);
    let ada = &visitors[0];

    let added = ada.react("p1", "like");
    assert_eq!(added["effect"], "added");
    assert_eq!(added["likes"], 1);
    assert_eq!(added["mine"], "like");

    let removed = ada.react("p1", "like");
    assert_eq!(removed["effect"], "removed");
    assert_eq!(removed["likes"], 0);
    assert!(removed["mine"].is_null());
}

#[test]
fn switching_moves_the_count() {
    let (_root, visitors) = world(&["ada"]);
    let ada = &visitors[0];

    ada.react("p1", "like");
    let switched = ada.react("p1", "dislike");
    assert_eq!(switched["effect"], "switched");
    assert_eq!(switched["likes"], 0);
    assert_eq!(switched["dislikes"], 1);
    assert_eq!(switched["mine"], "dislike");
}

#[test]
fn kind_aliases_are_accepted() {
    let (_root, visitors) = world(&["ada"]);
    let json = visitors[0].react("p1", "+");
    assert_eq!(json["kind"], "like");
}

#[test]
fn unknown_kind_is_a_usage_error() {
    let (_root, visitors) = world(&["ada"]);
    visitors[0]
        .cmd()
        .args(["react", "p1", "love"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("love"));
}

// ---------------------------------------------------------------------------
// Aggregates across visitors
// ---------------------------------------------------------------------------

#[test]
fn counts_aggregate_across_visitors() {
    let (_root, visitors) = world(&["ada", "grace", "linus"]);
    visitors[0].react("p1", "like");
    visitors[1].react("p1", "like");
    visitors[2].react("p1", "dislike");

    let json = visitors[0].json(&["reactions", "p1"]);
    assert_eq!(json["likes"], 2);
    assert_eq!(json["dislikes"], 1);
    assert_eq!(json["total"], 3);
    assert_eq!(json["mine"], "like");

    let linus = visitors[2].json(&["reactions", "p1"]);
    assert_eq!(linus["mine"], "dislike");
}

#[test]
fn reactions_are_scoped_per_post() {
    let (_root, visitors) = world(&["ada"]);
    let ada = &visitors[0];
    ada.react("p1", "like");

    let other = ada.json(&["reactions", "p2"]);
    assert_eq!(other["total"], 0);
    assert!(other["mine"].is_null());
}

#[test]
fn another_visitor_cannot_remove_my_reaction() {
    let (_root, visitors) = world(&["ada", "grace"]);
    visitors[0].react("p1", "like");

    // Grace's "like" adds her own; it never toggles Ada's off.
    let grace = visitors[1].react("p1", "like");
    assert_eq!(grace["effect"], "added");
    assert_eq!(grace["likes"], 2);
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[test]
fn visitor_id_persists_between_runs() {
    let (_root, visitors) = world(&["ada"]);
    let first = visitors[0].json(&["whoami"]);
    let second = visitors[0].json(&["whoami"]);

    assert_eq!(first["persistent"], true);
    assert!(first["visitor_id"].as_str().is_some_and(|id| !id.is_empty()));
    assert_eq!(first["visitor_id"], second["visitor_id"]);
}

#[test]
fn visitors_get_distinct_ids() {
    let (_root, visitors) = world(&["ada", "grace"]);
    let ada = visitors[0].json(&["whoami"]);
    let grace = visitors[1].json(&["whoami"]);
    assert_ne!(ada["visitor_id"], grace["visitor_id"]);
}

#[test]
fn reaction_survives_identity_reuse() {
    let (_root, visitors) = world(&["ada"]);
    visitors[0].react("p1", "dislike");
    // A later run resolves the same visitor and sees its own reaction.
    let json = visitors[0].json(&["reactions", "p1"]);
    assert_eq!(json["mine"], "dislike");
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

#[test]
fn timing_flag_reports_backend_calls() {
    let (_root, visitors) = world(&["ada"]);
    visitors[0]
        .cmd()
        .args(["--timing", "reactions", "p1", "--format", "text"])
        .assert()
        .success()
        .stderr(predicate::str::contains("timing report"))
        .stderr(predicate::str::contains("remote.fetch_reaction_aggregate"));
}
