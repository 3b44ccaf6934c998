use crate::common::*;
use modelmux::{MemorySink, RouteRequest};
use modelmux_core::Workload;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn response_comes_from_the_chain_head() {
    let sink = Arc::new(MemorySink::new());
    let e1 = endpoint("prov-s1a", "model-hi", 5);
    let e2 = endpoint("prov-s1b", "model-lo", 4);
    let mux = mux_with(
        coding_config(vec![e1.clone(), e2.clone()]),
        &["prov-s1a", "prov-s1b"],
        Arc::clone(&sink),
    );
    let head = ScriptedAdapter::always_ok();
    mux.register_adapter("prov-s1a", head.clone());
    mux.register_adapter("prov-s1b", ScriptedAdapter::always_ok());

    let outcome = mux
        .route_and_call(
            RouteRequest::builder(Workload::Coding)
                .prompt("write hello world")
                .estimated_tokens(500)
                .deadline_in(Duration::from_secs(10))
                .build(),
        )
        .await
        .expect("routable");

    assert_eq!(outcome.endpoint, e1.id);
    assert!(!outcome.from_cache);
    assert_eq!(head.calls(), 1);

    let observations = sink.observations();
    assert_eq!(observations.len(), 1);
    assert_eq!(observations[0].endpoint, e1.id);
    assert!(observations[0].outcome.is_success());
    assert_eq!(
        Some(observations[0].decision_id.clone()),
        outcome.decision_id
    );
}

#[tokio::test]
async fn observations_carry_usage_and_cost() {
    let sink = Arc::new(MemorySink::new());
    let e1 = endpoint("prov-s1c", "model", 5);
    let mux = mux_with(coding_config(vec![e1]), &["prov-s1c"], Arc::clone(&sink));
    mux.register_adapter("prov-s1c", ScriptedAdapter::always_ok());

    mux.route_and_call(
        RouteRequest::builder(Workload::Coding)
            .prompt("sum a list")
            .deadline_in(Duration::from_secs(5))
            .build(),
    )
    .await
    .expect("routable");

    let observations = sink.observations();
    assert_eq!(observations[0].input_tokens, 100);
    assert_eq!(observations[0].output_tokens, 20);
    assert!(observations[0].cost_usd > 0.0);
}
