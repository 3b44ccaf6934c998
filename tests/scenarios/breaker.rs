use crate::common::*;
use modelmux::{AdapterError, MemorySink, RouteRequest};
use modelmux_breaker::BreakerState;
use modelmux_core::{Strategy, Workload};
use std::sync::Arc;
use std::time::Duration;

fn request(prompt: &str, strategy: Strategy) -> RouteRequest {
    RouteRequest::builder(Workload::Coding)
        .prompt(prompt)
        .strategy(strategy)
        .no_cache()
        .deadline_in(Duration::from_secs(10))
        .build()
}

#[tokio::test]
async fn transport_failures_open_the_breaker_and_probes_close_it() {
    let sink = Arc::new(MemorySink::new());
    let e1 = endpoint("prov-s5a", "model-hi", 5);
    let e2 = endpoint("prov-s5b", "model-lo", 4);
    let mux = mux_with(
        coding_config(vec![e1.clone(), e2.clone()]),
        &["prov-s5a", "prov-s5b"],
        Arc::clone(&sink),
    );
    let flaky = ScriptedAdapter::scripted(vec![
        Err(AdapterError::transport("connection reset")),
        Err(AdapterError::transport("connection reset")),
        Err(AdapterError::transport("connection reset")),
        Err(AdapterError::transport("connection reset")),
        Err(AdapterError::transport("connection reset")),
    ]);
    mux.register_adapter("prov-s5a", flaky.clone());
    mux.register_adapter("prov-s5b", ScriptedAdapter::always_ok());

    // Five transport failures in a row, each recovered via the fallback.
    for i in 0..5 {
        let outcome = mux
            .route_and_call(request(&format!("attempt {i}"), Strategy::Balanced))
            .await
            .expect("fallback serves");
        assert_eq!(outcome.endpoint, e2.id);
    }
    assert_eq!(flaky.calls(), 5);
    assert_eq!(mux.breakers().state(&e1.id), BreakerState::Open);

    // With the breaker open the router does not even try the head.
    let outcome = mux
        .route_and_call(request("sixth", Strategy::Balanced))
        .await
        .expect("fallback serves");
    assert_eq!(outcome.endpoint, e2.id);
    assert_eq!(flaky.calls(), 5);

    // After the recovery timeout the circuit half-opens; three successful
    // probes close it again.
    tokio::time::sleep(Duration::from_millis(70)).await;
    for i in 0..3 {
        let outcome = mux
            .route_and_call(request(&format!("probe {i}"), Strategy::SpeedOptimized))
            .await
            .expect("probe serves");
        assert_eq!(outcome.endpoint, e1.id);
    }
    assert_eq!(mux.breakers().state(&e1.id), BreakerState::Closed);
}
