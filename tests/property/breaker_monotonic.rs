//! Invariant: once the failure threshold is crossed, the circuit cannot
//! be `Closed` again until probes succeed - more failures, with no
//! success anywhere, never close it.

use modelmux_breaker::{BreakerConfig, BreakerState, Outcome};
use modelmux_core::EndpointId;
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    #[test]
    fn failures_without_success_never_close_the_circuit(
        threshold in 2u32..6,
        extra_failures in 0u32..8,
    ) {
        let set = BreakerConfig::builder()
            .failure_threshold(threshold)
            .recovery_timeout(Duration::from_millis(20))
            .half_open_successes(2)
            .build();
        let id = EndpointId::new("prov", "model");

        for _ in 0..threshold {
            set.record(&id, Outcome::Failure);
        }
        prop_assert_eq!(set.state(&id), BreakerState::Open);

        // Keep failing, including through half-open probes, with no
        // success recorded anywhere in the window.
        for _ in 0..extra_failures {
            std::thread::sleep(Duration::from_millis(25));
            let _ = set.admit(&id);
            set.record(&id, Outcome::Failure);
        }
        prop_assert_ne!(set.state(&id), BreakerState::Closed);
    }

    #[test]
    fn successes_below_the_probe_quota_leave_it_half_open(
        threshold in 2u32..5,
        probes in 1u32..3,
    ) {
        let set = BreakerConfig::builder()
            .failure_threshold(threshold)
            .recovery_timeout(Duration::from_millis(10))
            .half_open_successes(3)
            .build();
        let id = EndpointId::new("prov", "model");

        for _ in 0..threshold {
            set.record(&id, Outcome::Failure);
        }
        std::thread::sleep(Duration::from_millis(15));

        for _ in 0..probes {
            let _ = set.admit(&id);
            set.record(&id, Outcome::Success);
        }
        // Fewer than the required consecutive successes: still half-open.
        prop_assert_eq!(set.state(&id), BreakerState::HalfOpen);
    }
}
