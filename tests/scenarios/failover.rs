use crate::common::*;
use modelmux::{AdapterError, AttemptOutcome, MemorySink, RouteRequest};
use modelmux_breaker::BreakerState;
use modelmux_core::{CapacityStatus, FailureClass, Workload};
use std::sync::Arc;
use std::time::Duration;

fn request(prompt: &str) -> RouteRequest {
    RouteRequest::builder(Workload::Coding)
        .prompt(prompt)
        .no_cache()
        .deadline_in(Duration::from_secs(10))
        .build()
}

#[tokio::test]
async fn http_429_fails_over_to_the_next_endpoint() {
    let sink = Arc::new(MemorySink::new());
    let e1 = endpoint("prov-s2a", "model-hi", 5);
    let e2 = endpoint("prov-s2b", "model-lo", 4);
    let mux = mux_with(
        coding_config(vec![e1.clone(), e2.clone()]),
        &["prov-s2a", "prov-s2b"],
        Arc::clone(&sink),
    );
    mux.register_adapter(
        "prov-s2a",
        ScriptedAdapter::scripted(vec![Err(AdapterError::from_http(429, "too many requests"))]),
    );
    mux.register_adapter("prov-s2b", ScriptedAdapter::always_ok());

    let outcome = mux.route_and_call(request("sort a vec")).await.expect("failover");

    assert_eq!(outcome.endpoint, e2.id);

    let observations = sink.observations();
    assert_eq!(observations.len(), 2);
    assert_eq!(observations[0].endpoint, e1.id);
    assert_eq!(
        observations[0].outcome,
        AttemptOutcome::Failure(FailureClass::RateLimit)
    );
    assert_eq!(observations[1].endpoint, e2.id);
    assert!(observations[1].outcome.is_success());

    // The rate-limited endpoint cooled down; its breaker is untouched.
    assert_eq!(mux.capacity().status(&e1.id), CapacityStatus::Cooldown);
    let snapshot = mux.capacity().snapshot(&e1.id).expect("snapshot");
    assert_eq!(snapshot.consecutive_429s, 1);
    assert!(snapshot.cooldown_until.is_some());
    assert_eq!(mux.breakers().state(&e1.id), BreakerState::Closed);
}

#[tokio::test]
async fn capacity_exhausted_503_is_a_rate_limit_not_a_fatal() {
    let sink = Arc::new(MemorySink::new());
    let e1 = endpoint("prov-s3a", "model-hi", 5);
    let e2 = endpoint("prov-s3b", "model-lo", 4);
    let mux = mux_with(
        coding_config(vec![e1.clone(), e2.clone()]),
        &["prov-s3a", "prov-s3b"],
        Arc::clone(&sink),
    );
    mux.register_adapter(
        "prov-s3a",
        ScriptedAdapter::scripted(vec![Err(AdapterError::from_http(
            503,
            "MODEL_CAPACITY_EXHAUSTED",
        ))]),
    );
    mux.register_adapter("prov-s3b", ScriptedAdapter::always_ok());

    let outcome = mux.route_and_call(request("explain this")).await.expect("failover");

    assert_eq!(outcome.endpoint, e2.id);
    assert_eq!(
        sink.observations()[0].outcome,
        AttemptOutcome::Failure(FailureClass::RateLimit)
    );
    assert_eq!(mux.capacity().status(&e1.id), CapacityStatus::Cooldown);
    assert_eq!(mux.breakers().state(&e1.id), BreakerState::Closed);
}

#[tokio::test]
async fn provider_cooldown_skips_sibling_endpoints() {
    let sink = Arc::new(MemorySink::new());
    let e1 = endpoint("prov-s4a", "model-1", 5);
    let e2 = endpoint("prov-s4a", "model-2", 4);
    let e3 = endpoint("prov-s4b", "model-3", 3);
    let mux = mux_with(
        coding_config(vec![e1.clone(), e2.clone(), e3.clone()]),
        &["prov-s4a", "prov-s4b"],
        Arc::clone(&sink),
    );
    let shared_quota = ScriptedAdapter::scripted(vec![Err(AdapterError::rate_limit("429"))]);
    mux.register_adapter("prov-s4a", shared_quota.clone());
    mux.register_adapter("prov-s4b", ScriptedAdapter::always_ok());

    let outcome = mux.route_and_call(request("first")).await.expect("failover");

    // The sibling on the same provider was presumed quota-shared and
    // skipped: one rate limit, then straight to the other provider.
    assert_eq!(outcome.endpoint, e3.id);
    assert_eq!(shared_quota.calls(), 1);
    let observations = sink.observations();
    assert_eq!(observations.len(), 2);
    assert_eq!(observations[0].endpoint, e1.id);
    assert_eq!(observations[1].endpoint, e3.id);

    // A fresh route inside the cooldown window goes directly to the other
    // provider; the siblings are never contacted.
    let outcome = mux.route_and_call(request("second")).await.expect("routable");
    assert_eq!(outcome.endpoint, e3.id);
    assert_eq!(shared_quota.calls(), 1);
    assert_eq!(sink.observations().len(), 3);
}

#[tokio::test]
async fn auth_failures_invalidate_credentials_and_advance() {
    let sink = Arc::new(MemorySink::new());
    let e1 = endpoint("prov-auth-a", "model-hi", 5);
    let e2 = endpoint("prov-auth-b", "model-lo", 4);
    let mux = mux_with(
        coding_config(vec![e1.clone(), e2.clone()]),
        &["prov-auth-a", "prov-auth-b"],
        Arc::clone(&sink),
    );
    mux.register_adapter(
        "prov-auth-a",
        ScriptedAdapter::scripted(vec![Err(AdapterError::from_http(401, "bad key"))]),
    );
    mux.register_adapter("prov-auth-b", ScriptedAdapter::always_ok());

    // Warm the oracle's cache, then pull the secret out from under it:
    // the cached answer stays usable until the 401 invalidates it.
    assert!(mux.credentials().is_usable(&"prov-auth-a".into()));
    disable_credentials("prov-auth-a");

    let outcome = mux.route_and_call(request("query")).await.expect("failover");
    assert_eq!(outcome.endpoint, e2.id);
    assert_eq!(
        sink.observations()[0].outcome,
        AttemptOutcome::Failure(FailureClass::Auth)
    );
    // The 401 did not blacken the breaker, and the invalidation dropped
    // the cached answer: the provider now filters out at routing time.
    assert_eq!(mux.breakers().state(&e1.id), BreakerState::Closed);
    assert!(!mux.credentials().is_usable(&"prov-auth-a".into()));
}

#[tokio::test]
async fn format_violations_retry_once_then_give_up_on_the_endpoint() {
    let sink = Arc::new(MemorySink::new());
    let e1 = endpoint("prov-fmt-a", "model-hi", 5);
    let e2 = endpoint("prov-fmt-b", "model-lo", 4);
    let mux = mux_with(
        coding_config(vec![e1.clone(), e2.clone()]),
        &["prov-fmt-a", "prov-fmt-b"],
        Arc::clone(&sink),
    );
    let flaky = ScriptedAdapter::scripted(vec![
        Err(AdapterError::new(FailureClass::Format, "bad tool syntax")),
        Err(AdapterError::new(FailureClass::Format, "bad tool syntax")),
    ]);
    mux.register_adapter("prov-fmt-a", flaky.clone());
    mux.register_adapter("prov-fmt-b", ScriptedAdapter::always_ok());

    let outcome = mux.route_and_call(request("call a tool")).await.expect("failover");

    assert_eq!(outcome.endpoint, e2.id);
    // Two attempts on the head (initial + retry), then the fallback.
    assert_eq!(flaky.calls(), 2);
    let observations = sink.observations();
    assert_eq!(observations.len(), 3);
    assert!(observations[2].outcome.is_success());
}

#[tokio::test]
async fn format_retry_that_recovers_stays_on_the_endpoint() {
    let sink = Arc::new(MemorySink::new());
    let e1 = endpoint("prov-fmt-c", "model", 5);
    let mux = mux_with(coding_config(vec![e1.clone()]), &["prov-fmt-c"], Arc::clone(&sink));
    mux.register_adapter(
        "prov-fmt-c",
        ScriptedAdapter::scripted(vec![Err(AdapterError::new(
            FailureClass::Format,
            "transient syntax hiccup",
        ))]),
    );

    let outcome = mux.route_and_call(request("retry me")).await.expect("recovered");
    assert_eq!(outcome.endpoint, e1.id);
    assert_eq!(sink.observations().len(), 2);
}
