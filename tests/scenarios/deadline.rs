use crate::common::*;
use modelmux::{AttemptOutcome, MemorySink, RouteError, RouteRequest};
use modelmux_breaker::BreakerState;
use modelmux_core::{FailureClass, Workload};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn request(prompt: &str, deadline: Duration) -> RouteRequest {
    RouteRequest::builder(Workload::Coding)
        .prompt(prompt)
        .no_cache()
        .deadline_in(deadline)
        .build()
}

#[tokio::test]
async fn deadline_expiry_cancels_promptly() {
    let sink = Arc::new(MemorySink::new());
    let e1 = endpoint("prov-d1", "model", 5);
    let mux = mux_with(coding_config(vec![e1.clone()]), &["prov-d1"], Arc::clone(&sink));
    mux.register_adapter("prov-d1", Arc::new(HangingAdapter));

    let started = Instant::now();
    let result = mux
        .route_and_call(request("hang forever", Duration::from_millis(100)))
        .await;

    assert_eq!(result.unwrap_err(), RouteError::Cancelled);
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "cancellation must track the deadline, not the upstream"
    );

    // The surrendered attempt was observed as a transport failure, but a
    // single client-side timeout does not open the breaker.
    let observations = sink.observations();
    assert_eq!(observations.len(), 1);
    assert_eq!(
        observations[0].outcome,
        AttemptOutcome::Failure(FailureClass::Transport)
    );
    assert_eq!(mux.breakers().state(&e1.id), BreakerState::Closed);
}

#[tokio::test]
async fn a_run_of_timeouts_does_open_the_breaker() {
    let sink = Arc::new(MemorySink::new());
    let e1 = endpoint("prov-d2", "model", 5);
    let mux = mux_with(coding_config(vec![e1.clone()]), &["prov-d2"], Arc::clone(&sink));
    mux.register_adapter("prov-d2", Arc::new(HangingAdapter));

    for i in 0..3 {
        let result = mux
            .route_and_call(request(&format!("hang {i}"), Duration::from_millis(50)))
            .await;
        assert_eq!(result.unwrap_err(), RouteError::Cancelled);
    }
    assert_eq!(mux.breakers().state(&e1.id), BreakerState::Open);
}
