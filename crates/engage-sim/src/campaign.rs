//! Many-seed campaigns over the simulator.
//!
//! Every seed builds a fresh world, runs it, and hands the result to the
//! oracle. The first failing seed is reported so it can be replayed alone.

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::oracle::{EngagementOracle, InvariantViolation, OracleResult};
use crate::{FaultConfig, SimulationConfig, SimulationResult, Simulator};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Seeds to execute, e.g. `0..100`.
    pub seed_range: Range<u64>,
    pub visitors: usize,
    pub posts: usize,
    pub steps: u64,
    pub settle_ms: u64,
    pub step_ms: u64,
    pub fault: FaultConfig,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let sim = SimulationConfig::default();
        Self {
            seed_range: 0..100,
            visitors: sim.visitors,
            posts: sim.posts,
            steps: sim.steps,
            settle_ms: sim.settle_ms,
            step_ms: sim.step_ms,
            fault: sim.fault,
        }
    }
}

impl CampaignConfig {
    #[must_use]
    pub const fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            visitors: self.visitors,
            posts: self.posts,
            steps: self.steps,
            settle_ms: self.settle_ms,
            step_ms: self.step_ms,
            fault: self.fault,
        }
    }

    /// # Errors
    ///
    /// Returns an error if any parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        if self.visitors == 0 {
            bail!("visitors must be > 0");
        }
        if self.posts == 0 {
            bail!("posts must be > 0");
        }
        if self.steps == 0 {
            bail!("steps must be > 0");
        }
        let fault = self.fault;
        for (name, percent) in [
            ("submit_failure_percent", fault.submit_failure_percent),
            ("fetch_failure_percent", fault.fetch_failure_percent),
            ("create_failure_percent", fault.create_failure_percent),
        ] {
            if percent > 100 {
                bail!("{name} must be within 0..=100, got {percent}");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed, for replay.
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds that saw both a rollback and a reaction switch.
    pub interesting_states_reached: usize,
}

impl CampaignReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One seed replayed with everything needed to debug it.
#[derive(Debug, Clone)]
pub struct DetailedTrace {
    pub result: SimulationResult,
    pub oracle: OracleResult,
    pub fingerprint: u64,
}

/// # Errors
///
/// Returns an error if config validation fails or a world cannot be built.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        interesting_states_reached: 0,
    };

    for seed in config.seed_range.clone() {
        report.seeds_run += 1;
        let (result, oracle) = simulate(seed, config)?;
        if result.interesting_state_reached {
            report.interesting_states_reached += 1;
        }

        if oracle.passed {
            report.seeds_passed += 1;
        } else {
            debug!(seed, violations = oracle.violations.len(), "seed failed");
            report.first_failure.get_or_insert(seed);
            report.failures.push(SeedFailure {
                seed,
                violations: oracle.violations.iter().map(format_violation).collect(),
            });
        }
    }

    info!(
        seeds_run = report.seeds_run,
        seeds_passed = report.seeds_passed,
        "campaign complete"
    );
    Ok(report)
}

/// Run one seed: `Ok(Ok(()))` on pass, `Ok(Err(violations))` on failure.
///
/// # Errors
///
/// The outer error is reserved for worlds that cannot be built.
pub fn run_single_seed(
    seed: u64,
    config: &CampaignConfig,
) -> Result<std::result::Result<(), Vec<InvariantViolation>>> {
    let (_, oracle) = simulate(seed, config)?;
    if oracle.passed {
        Ok(Ok(()))
    } else {
        Ok(Err(oracle.violations))
    }
}

/// # Errors
///
/// Returns an error when config validation or world setup fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    config.validate()?;
    let (result, oracle) = simulate(seed, config)?;
    let fingerprint = result.trace_fingerprint();
    Ok(DetailedTrace {
        result,
        oracle,
        fingerprint,
    })
}

fn simulate(seed: u64, config: &CampaignConfig) -> Result<(SimulationResult, OracleResult)> {
    let result = Simulator::new(config.sim_config_for_seed(seed))?.run()?;
    let oracle = EngagementOracle::check_all(&result);
    Ok((result, oracle))
}

#[must_use]
pub fn format_violation(v: &InvariantViolation) -> String {
    match v {
        InvariantViolation::AggregateDrift {
            step,
            post,
            remote_total,
            reacting_visitors,
        } => format!(
            "AggregateDrift: step {step} post {post} total={remote_total} \
             but {reacting_visitors} visitors hold a reaction"
        ),
        InvariantViolation::MineDiverged {
            step,
            visitor,
            post,
            ledger,
            remote,
        } => {
            let at = if *step == u64::MAX {
                "end of run".to_string()
            } else {
                format!("step {step}")
            };
            format!(
                "MineDiverged: {at} visitor {visitor} post {post} \
                 (ledger={ledger:?}, remote={remote:?})"
            )
        }
        InvariantViolation::IncompleteRollback {
            step,
            visitor,
            post,
            before,
            after,
        } => format!(
            "IncompleteRollback: step {step} visitor {visitor} post {post} \
             (before={before:?}, after={after:?})"
        ),
        InvariantViolation::FoldMismatch {
            visitor,
            post,
            folded,
            ledger,
        } => format!(
            "FoldMismatch: visitor {visitor} post {post} \
             (folded={folded:?}, ledger={ledger:?})"
        ),
        InvariantViolation::ThreadIncomplete {
            visitor,
            post,
            listed,
            placed_once,
            stored,
        } => format!(
            "ThreadIncomplete: visitor {visitor} post {post} lists {listed} \
             ({placed_once} placed once) of {stored} stored"
        ),
        InvariantViolation::IndexOutOfRange {
            step,
            visitor,
            post,
            active,
            len,
        } => {
            let at = step.map_or_else(|| "end of run".to_string(), |s| format!("step {s}"));
            format!(
                "IndexOutOfRange: {at} visitor {visitor} post {post} \
                 active={active} len={len}"
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(CampaignConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_seed_range_rejected() {
        let config = CampaignConfig {
            seed_range: 5..5,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_visitors_rejected() {
        let config = CampaignConfig {
            visitors: 0,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_fault_rejected() {
        let config = CampaignConfig {
            fault: FaultConfig {
                submit_failure_percent: 101,
                ..FaultConfig::default()
            },
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn sim_config_carries_seed() {
        let config = CampaignConfig::default();
        let sim = config.sim_config_for_seed(42);
        assert_eq!(sim.seed, 42);
        assert_eq!(sim.visitors, config.visitors);
        assert_eq!(sim.steps, config.steps);
    }

    #[test]
    fn single_seed_passes() {
        let result = run_single_seed(0, &CampaignConfig::default()).expect("sim should not error");
        assert!(result.is_ok(), "seed 0 should pass: {result:?}");
    }

    #[test]
    fn hundred_seeds_pass_under_faults() {
        let report = run_campaign(&CampaignConfig::default()).expect("campaign");
        assert_eq!(report.seeds_run, 100);
        assert!(
            report.all_passed(),
            "campaign failed: {:?}",
            report.failures.first()
        );
        assert!(report.first_failure.is_none());
    }

    #[test]
    fn heavy_faults_reach_interesting_states() {
        let config = CampaignConfig {
            seed_range: 0..20,
            steps: 128,
            fault: FaultConfig {
                submit_failure_percent: 40,
                fetch_failure_percent: 30,
                create_failure_percent: 30,
            },
            ..CampaignConfig::default()
        };
        let report = run_campaign(&config).expect("campaign");
        assert!(report.all_passed(), "{:?}", report.failures.first());
        assert!(report.interesting_states_reached > 0);
    }

    #[test]
    fn replay_is_deterministic() {
        let config = CampaignConfig::default();
        let first = replay_seed(7, &config).expect("replay 1");
        let second = replay_seed(7, &config).expect("replay 2");
        assert_eq!(first.result.trace, second.result.trace);
        assert_eq!(first.result.views, second.result.views);
        assert_eq!(first.fingerprint, second.fingerprint);
        assert!(first.oracle.passed, "{:?}", first.oracle.violations);
    }

    #[test]
    fn report_serializes_to_json() {
        let report = CampaignReport {
            seeds_run: 10,
            seeds_passed: 9,
            first_failure: Some(7),
            failures: vec![SeedFailure {
                seed: 7,
                violations: vec!["FoldMismatch: visitor 0 post 1".into()],
            }],
            interesting_states_reached: 5,
        };
        let json = serde_json::to_string(&report).expect("serialize");
        assert!(json.contains("\"seeds_run\":10"));
        assert!(json.contains("\"first_failure\":7"));
    }

    #[test]
    fn violations_format_readably() {
        let s = format_violation(&InvariantViolation::IndexOutOfRange {
            step: Some(3),
            visitor: 1,
            post: 0,
            active: 4,
            len: 2,
        });
        assert!(s.starts_with("IndexOutOfRange"));
        assert!(s.contains("step 3"));
        assert!(s.contains("active=4 len=2"));
    }
}
