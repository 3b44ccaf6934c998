//! Invariant: `consecutive_429s` strictly increases across a rate-limit
//! run with no intervening success, and `cooldown_until` never moves
//! backwards during that run.

use crate::common::fast_capacity;
use modelmux_capacity::RateLimitHeaders;
use modelmux_core::EndpointId;
use proptest::prelude::*;
use std::time::Instant;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn rate_limit_runs_grow_monotonically(hits in 1u32..8) {
        let registry = fast_capacity();
        let id = EndpointId::new("prov", "model");
        let mut previous: Option<Instant> = None;

        for i in 1..=hits {
            registry.observe_rate_limit(&id);
            let snapshot = registry.snapshot(&id).unwrap();
            prop_assert_eq!(snapshot.consecutive_429s, i);
            let until = snapshot.cooldown_until.unwrap();
            if let Some(previous) = previous {
                prop_assert!(until >= previous, "cooldown deadline moved backwards");
            }
            previous = Some(until);
        }
    }

    #[test]
    fn a_success_resets_the_run(hits in 1u32..6) {
        let registry = fast_capacity();
        let id = EndpointId::new("prov", "model");
        for _ in 0..hits {
            registry.observe_rate_limit(&id);
        }
        registry.observe_response(&id, &RateLimitHeaders::default(), 10, 10);

        let snapshot = registry.snapshot(&id).unwrap();
        prop_assert_eq!(snapshot.consecutive_429s, 0);
        prop_assert!(snapshot.cooldown_until.is_none());
    }
}
