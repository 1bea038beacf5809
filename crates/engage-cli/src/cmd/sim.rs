//! `engage sim`: deterministic simulation campaigns.
//!
//! `engage sim run` executes a campaign across many seeds; `engage sim replay`
//! reruns one seed with its full trace summary.

use std::io::Write;
use std::process;

use anyhow::Result;
use clap::{Args, Subcommand};
use engage_sim::FaultConfig;
use engage_sim::campaign::{self, CampaignConfig};
use engage_sim::{TraceEventKind, ViewSnapshot};
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section};

#[derive(Args, Debug)]
pub struct SimArgs {
    #[command(subcommand)]
    pub command: SimCommand,
}

#[derive(Subcommand, Debug)]
pub enum SimCommand {
    #[command(
        about = "Run a simulation campaign across multiple seeds",
        long_about = "Run many seeded simulations of visitors reacting, commenting and\n\
                      browsing against a fault-injecting backend. Reports pass/fail per\n\
                      seed and the first failure for replay.",
        after_help = "EXAMPLES:\n    # Run 100 seeds with defaults\n    engage sim run --seeds 100\n\n\
                      # Heavier world with more faults\n    engage sim run --seeds 200 --visitors 8 --steps 256 --faults 40\n\n\
                      # Machine-readable output\n    engage sim run --seeds 100 --format json"
    )]
    Run(SimRunArgs),

    #[command(
        about = "Replay a single seed with detailed trace output",
        long_about = "Replay one seed and print its trace summary, final views and oracle\n\
                      result. Use after a campaign failure to debug.",
        after_help = "EXAMPLES:\n    # Replay seed 42\n    engage sim replay --seed 42\n\n\
                      # Machine-readable output\n    engage sim replay --seed 42 --format json"
    )]
    Replay(SimReplayArgs),
}

/// World shape shared by `run` and `replay`.
#[derive(Args, Debug, Clone)]
pub struct WorldArgs {
    /// Simulated visitors.
    #[arg(long, default_value = "4")]
    pub visitors: usize,

    /// Posts each visitor has open.
    #[arg(long, default_value = "2")]
    pub posts: usize,

    /// Steps per seed.
    #[arg(long, default_value = "64")]
    pub steps: u64,

    /// Reaction write failure rate in percent; reads and comment writes fail
    /// at two thirds of it.
    #[arg(long, default_value = "15", value_parser = clap::value_parser!(u8).range(0..=100))]
    pub faults: u8,
}

#[derive(Args, Debug)]
pub struct SimRunArgs {
    /// Number of seeds to run.
    #[arg(long, default_value = "100")]
    pub seeds: u64,

    /// First seed.
    #[arg(long, default_value = "0")]
    pub seed_start: u64,

    #[command(flatten)]
    pub world: WorldArgs,
}

#[derive(Args, Debug)]
pub struct SimReplayArgs {
    /// Seed to replay.
    #[arg(long)]
    pub seed: u64,

    #[command(flatten)]
    pub world: WorldArgs,
}

#[derive(Debug, Serialize)]
struct RunOutput {
    seeds_run: usize,
    seeds_passed: usize,
    seeds_failed: usize,
    first_failure: Option<u64>,
    interesting_states_reached: usize,
    all_passed: bool,
    failures: Vec<campaign::SeedFailure>,
}

#[derive(Debug, Default, Serialize)]
struct StepCounts {
    toggles: usize,
    rollbacks: usize,
    reloads: usize,
    comments: usize,
    navigations: usize,
}

#[derive(Debug, Serialize)]
struct ReplayOutput {
    seed: u64,
    trace_events: usize,
    steps: StepCounts,
    views: Vec<ViewSnapshot>,
    oracle_passed: bool,
    violations: Vec<String>,
    interesting_state_reached: bool,
    trace_fingerprint: u64,
}

fn build_campaign_config(seed_start: u64, seeds: u64, world: &WorldArgs) -> CampaignConfig {
    let secondary = u8::try_from(u16::from(world.faults) * 2 / 3).unwrap_or(100);
    CampaignConfig {
        seed_range: seed_start..seed_start.saturating_add(seeds),
        visitors: world.visitors,
        posts: world.posts,
        steps: world.steps,
        fault: FaultConfig {
            submit_failure_percent: world.faults,
            fetch_failure_percent: secondary,
            create_failure_percent: secondary,
        },
        ..CampaignConfig::default()
    }
}

fn count_steps(trace: &[engage_sim::TraceEvent]) -> StepCounts {
    let mut counts = StepCounts::default();
    for event in trace {
        match &event.kind {
            TraceEventKind::Toggle { rolled_back, .. } => {
                counts.toggles += 1;
                counts.rollbacks += usize::from(*rolled_back);
            }
            TraceEventKind::Reload { .. } => counts.reloads += 1,
            TraceEventKind::Comment { .. } => counts.comments += 1,
            TraceEventKind::Navigate { .. } => counts.navigations += 1,
        }
    }
    counts
}

pub fn run_sim_run(args: &SimRunArgs, output: OutputMode) -> Result<()> {
    let config = build_campaign_config(args.seed_start, args.seeds, &args.world);
    let report = campaign::run_campaign(&config)?;

    let out = RunOutput {
        seeds_run: report.seeds_run,
        seeds_passed: report.seeds_passed,
        seeds_failed: report.failures.len(),
        first_failure: report.first_failure,
        interesting_states_reached: report.interesting_states_reached,
        all_passed: report.all_passed(),
        failures: report.failures.clone(),
    };

    match output {
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputMode::Text => {
            println!(
                "campaign seeds_run={} visitors={} steps={} faults_pct={}",
                out.seeds_run, args.world.visitors, args.world.steps, args.world.faults
            );
            println!(
                "results passed={} failed={} interesting_states={} all_passed={}",
                out.seeds_passed, out.seeds_failed, out.interesting_states_reached, out.all_passed
            );
            for failure in out.failures.iter().take(5) {
                println!(
                    "failure seed={} violations={}",
                    failure.seed,
                    failure.violations.len()
                );
            }
            if let Some(seed) = out.first_failure {
                println!("hint replay_seed={seed}");
            }
        }
        OutputMode::Pretty => {
            let stdout = std::io::stdout();
            let mut w = stdout.lock();
            pretty_section(&mut w, "Simulation Campaign")?;
            pretty_kv(&mut w, "Seeds", out.seeds_run.to_string())?;
            pretty_kv(&mut w, "Visitors", args.world.visitors.to_string())?;
            pretty_kv(&mut w, "Posts", args.world.posts.to_string())?;
            pretty_kv(&mut w, "Steps", args.world.steps.to_string())?;
            pretty_kv(&mut w, "Fault rate", format!("{}%", args.world.faults))?;
            pretty_kv(
                &mut w,
                "Results",
                format!(
                    "{} passed / {} failed ({} interesting states)",
                    out.seeds_passed, out.seeds_failed, out.interesting_states_reached
                ),
            )?;

            match out.first_failure {
                None => pretty_kv(&mut w, "Status", "all seeds passed")?,
                Some(seed) => {
                    pretty_kv(
                        &mut w,
                        "Status",
                        format!("{} failures (first at seed {seed})", out.seeds_failed),
                    )?;
                    writeln!(w)?;
                    pretty_section(&mut w, "Failure Samples")?;
                    for failure in out.failures.iter().take(5) {
                        writeln!(
                            w,
                            "seed {:<8} violations={}",
                            failure.seed,
                            failure.violations.len()
                        )?;
                        for violation in &failure.violations {
                            writeln!(w, "  - {violation}")?;
                        }
                    }
                    writeln!(w)?;
                    pretty_kv(
                        &mut w,
                        "Replay",
                        format!(
                            "engage sim replay --seed {seed} --visitors {} --steps {}",
                            args.world.visitors, args.world.steps
                        ),
                    )?;
                }
            }
        }
    }

    // Non-zero exit for CI.
    if !report.all_passed() {
        process::exit(1);
    }

    Ok(())
}

pub fn run_sim_replay(args: &SimReplayArgs, output: OutputMode) -> Result<()> {
    let config = build_campaign_config(args.seed, 1, &args.world);
    let trace = campaign::replay_seed(args.seed, &config)?;

    let out = ReplayOutput {
        seed: args.seed,
        trace_events: trace.result.trace.len(),
        steps: count_steps(&trace.result.trace),
        views: trace.result.views.clone(),
        oracle_passed: trace.oracle.passed,
        violations: trace
            .oracle
            .violations
            .iter()
            .map(campaign::format_violation)
            .collect(),
        interesting_state_reached: trace.result.interesting_state_reached,
        trace_fingerprint: trace.fingerprint,
    };

    match output {
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputMode::Text => {
            println!(
                "replay seed={} visitors={} posts={} steps={}",
                out.seed, args.world.visitors, args.world.posts, args.world.steps
            );
            println!(
                "result oracle_passed={} trace_events={} rollbacks={} interesting_state_reached={} trace_fingerprint={:016x}",
                out.oracle_passed,
                out.trace_events,
                out.steps.rollbacks,
                out.interesting_state_reached,
                out.trace_fingerprint
            );
            for violation in &out.violations {
                println!("violation={violation}");
            }
            for view in &out.views {
                println!(
                    "view visitor={} post={} likes={} dislikes={} mine={:?} comments={}",
                    view.visitor,
                    view.post,
                    view.ledger.counts.likes,
                    view.ledger.counts.dislikes,
                    view.ledger.mine,
                    view.thread_len
                );
            }
        }
        OutputMode::Pretty => {
            let stdout = std::io::stdout();
            let mut w = stdout.lock();
            pretty_section(&mut w, &format!("Replay Seed {}", out.seed))?;
            pretty_kv(&mut w, "Visitors", args.world.visitors.to_string())?;
            pretty_kv(&mut w, "Posts", args.world.posts.to_string())?;
            pretty_kv(&mut w, "Trace events", out.trace_events.to_string())?;
            pretty_kv(
                &mut w,
                "Steps",
                format!(
                    "{} toggles ({} rolled back), {} reloads, {} comments, {} navigations",
                    out.steps.toggles,
                    out.steps.rollbacks,
                    out.steps.reloads,
                    out.steps.comments,
                    out.steps.navigations
                ),
            )?;
            pretty_kv(&mut w, "Interesting", out.interesting_state_reached.to_string())?;
            pretty_kv(&mut w, "Fingerprint", format!("{:016x}", out.trace_fingerprint))?;
            pretty_kv(&mut w, "Oracle", out.oracle_passed.to_string())?;

            if !out.oracle_passed {
                writeln!(w)?;
                pretty_section(&mut w, "Invariant Violations")?;
                for violation in &out.violations {
                    writeln!(w, "- {violation}")?;
                }
            }
        }
    }

    if !trace.oracle.passed {
        process::exit(1);
    }

    Ok(())
}

pub fn run_sim(args: &SimArgs, output: OutputMode) -> Result<()> {
    match &args.command {
        SimCommand::Run(run_args) => run_sim_run(run_args, output),
        SimCommand::Replay(replay_args) => run_sim_replay(replay_args, output),
    }
}
