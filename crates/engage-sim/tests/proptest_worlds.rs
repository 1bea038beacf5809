use engage_sim::campaign::{CampaignConfig, run_single_seed};
use engage_sim::rng::DeterministicRng;
use engage_sim::{FaultConfig, SimulationConfig, Simulator};
use proptest::prelude::*;

fn arb_fault() -> impl Strategy<Value = FaultConfig> {
    (0_u8..=100, 0_u8..=100, 0_u8..=100).prop_map(|(submit, fetch, create)| FaultConfig {
        submit_failure_percent: submit,
        fetch_failure_percent: fetch,
        create_failure_percent: create,
    })
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(64))]

    // Any seed, world shape and fault mix keeps every invariant.
    #[test]
    fn arbitrary_worlds_hold_invariants(
        seed in any::<u64>(),
        visitors in 1_usize..6,
        posts in 1_usize..3,
        steps in 1_u64..80,
        settle_ms in 0_u64..400,
        fault in arb_fault(),
    ) {
        let config = CampaignConfig {
            seed_range: seed..seed.saturating_add(1),
            visitors,
            posts,
            steps,
            settle_ms,
            fault,
            ..CampaignConfig::default()
        };
        let outcome = run_single_seed(seed, &config).expect("world builds");
        prop_assert!(outcome.is_ok(), "seed {seed} violated: {:?}", outcome.err());
    }

    #[test]
    fn same_seed_same_trace(seed in any::<u64>(), fault in arb_fault()) {
        let config = SimulationConfig { seed, steps: 32, fault, ..SimulationConfig::default() };
        let a = Simulator::new(config.clone()).expect("world").run().expect("run");
        let b = Simulator::new(config).expect("world").run().expect("run");
        prop_assert_eq!(a.trace_fingerprint(), b.trace_fingerprint());
        prop_assert_eq!(a.views, b.views);
    }

    #[test]
    fn rng_index_stays_in_bounds(seed in any::<u64>(), len in 1_usize..1_000) {
        let mut rng = DeterministicRng::new(seed);
        for _ in 0..16 {
            prop_assert!(rng.index(len) < len);
        }
    }
}
