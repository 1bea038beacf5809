#![forbid(unsafe_code)]

use anyhow::Result;
use engage_sim::oracle::EngagementOracle;
use engage_sim::{SimulationConfig, Simulator};

fn main() -> Result<()> {
    let result = Simulator::new(SimulationConfig::default())?.run()?;
    let oracle = EngagementOracle::check_all(&result);

    println!(
        "simulation complete: trace_events={} views={} passed={} interesting={}",
        result.trace.len(),
        result.views.len(),
        oracle.passed,
        result.interesting_state_reached
    );

    Ok(())
}
