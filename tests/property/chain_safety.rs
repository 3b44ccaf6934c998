//! Invariant: whatever the upstreams do, `route_and_call` either answers
//! from an endpoint in the workload's chain or fails with
//! `NoRoute`/`Exhausted`/`Cancelled`.

use crate::common::*;
use modelmux::{AdapterError, MemorySink, RouteError, RouteRequest};
use modelmux_core::{EndpointId, Workload};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn scripted_outcome(tag: u8, n: usize) -> Result<modelmux_core::ProviderResponse, AdapterError> {
    match tag % 3 {
        0 => Ok(ok_response(&format!("reply {n}"))),
        1 => Err(AdapterError::rate_limit("429")),
        _ => Err(AdapterError::transport("reset")),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    #[test]
    fn responses_only_come_from_the_chain(outcomes in proptest::collection::vec(0u8..3, 1..16)) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let e1 = endpoint("prov-pc-a", "model-1", 5);
            let e2 = endpoint("prov-pc-a", "model-2", 4);
            let e3 = endpoint("prov-pc-b", "model-3", 3);
            let chain: Vec<EndpointId> =
                vec![e1.id.clone(), e2.id.clone(), e3.id.clone()];
            let sink = Arc::new(MemorySink::new());
            let mux = mux_with(
                coding_config(vec![e1, e2, e3]),
                &["prov-pc-a", "prov-pc-b"],
                Arc::clone(&sink),
            );
            let script_a: Vec<_> = outcomes.iter().enumerate().map(|(n, t)| scripted_outcome(*t, n)).collect();
            let script_b: Vec<_> = outcomes.iter().enumerate().map(|(n, t)| scripted_outcome(t.wrapping_add(1), n)).collect();
            mux.register_adapter("prov-pc-a", ScriptedAdapter::scripted(script_a));
            mux.register_adapter("prov-pc-b", ScriptedAdapter::scripted(script_b));

            for i in 0..outcomes.len() {
                let result = mux
                    .route_and_call(
                        RouteRequest::builder(Workload::Coding)
                            .prompt(format!("call {i}"))
                            .no_cache()
                            .deadline_in(Duration::from_secs(10))
                            .build(),
                    )
                    .await;
                match result {
                    Ok(outcome) => {
                        prop_assert!(
                            chain.contains(&outcome.endpoint),
                            "served endpoint {} not in chain",
                            outcome.endpoint
                        );
                    }
                    Err(RouteError::NoRoute { .. })
                    | Err(RouteError::Exhausted { .. })
                    | Err(RouteError::Cancelled) => {}
                    Err(other) => {
                        prop_assert!(false, "unexpected terminal error: {other}");
                    }
                }
            }

            // Observations, too, only ever name chain members.
            for observation in sink.observations() {
                prop_assert!(chain.contains(&observation.endpoint));
            }
            Ok(())
        })?;
    }
}
