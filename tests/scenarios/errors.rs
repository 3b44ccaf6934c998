use crate::common::*;
use modelmux::{AdapterError, MemorySink, Mux, RouteError, RouteRequest};
use modelmux_core::{Capability, CapabilitySet, FailureClass, Workload};
use modelmux_ledger::SpendWindow;
use std::sync::Arc;
use std::time::Duration;

fn request(workload: Workload, prompt: &str) -> RouteRequest {
    RouteRequest::builder(workload)
        .prompt(prompt)
        .no_cache()
        .deadline_in(Duration::from_secs(10))
        .build()
}

#[tokio::test]
async fn unknown_workload_is_a_configuration_error() {
    let sink = Arc::new(MemorySink::new());
    let mux = mux_with(
        coding_config(vec![endpoint("prov-e1", "model", 5)]),
        &["prov-e1"],
        sink,
    );
    let err = mux
        .route_and_call(request(Workload::Reasoning, "think"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouteError::Configuration { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn impossible_capability_set_is_a_configuration_error() {
    let sink = Arc::new(MemorySink::new());
    let mut bare = endpoint("prov-e2", "model", 5);
    bare.capabilities = CapabilitySet::empty();
    let mux = mux_with(coding_config(vec![bare]), &["prov-e2"], sink);

    let err = mux
        .route_and_call(
            RouteRequest::builder(Workload::Coding)
                .prompt("look at this image")
                .capability(Capability::Vision)
                .no_cache()
                .deadline_in(Duration::from_secs(10))
                .build(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RouteError::Configuration { .. }));
}

#[tokio::test]
async fn missing_credentials_mean_no_route() {
    let config = coding_config(vec![endpoint("prov-e3-never-set", "model", 5)]);
    let mux = Mux::builder(config)
        .credentials(credential_sources(&["prov-e3-never-set"]))
        .build()
        .expect("valid config");
    mux.register_adapter("prov-e3-never-set", ScriptedAdapter::always_ok());

    let err = mux
        .route_and_call(request(Workload::Coding, "anything"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouteError::NoRoute { .. }));
}

#[tokio::test]
async fn credential_change_filters_the_provider_immediately() {
    let sink = Arc::new(MemorySink::new());
    let e1 = endpoint("prov-e4a", "model-hi", 5);
    let e2 = endpoint("prov-e4b", "model-lo", 4);
    let mux = mux_with(
        coding_config(vec![e1.clone(), e2.clone()]),
        &["prov-e4a", "prov-e4b"],
        Arc::clone(&sink),
    );
    mux.register_adapter("prov-e4a", ScriptedAdapter::always_ok());
    mux.register_adapter("prov-e4b", ScriptedAdapter::always_ok());

    let outcome = mux
        .route_and_call(request(Workload::Coding, "one"))
        .await
        .expect("routable");
    assert_eq!(outcome.endpoint, e1.id);

    disable_credentials("prov-e4a");
    mux.notify_credential_change(&"prov-e4a".into());

    let outcome = mux
        .route_and_call(request(Workload::Coding, "two"))
        .await
        .expect("routable");
    assert_eq!(outcome.endpoint, e2.id);
    // Every observation after the change avoids the dropped provider.
    for observation in sink.observations().iter().skip(1) {
        assert_ne!(observation.endpoint.provider, e1.id.provider);
    }
}

#[tokio::test]
async fn every_success_is_ledgered_and_observed_exactly_once() {
    let sink = Arc::new(MemorySink::new());
    let e1 = endpoint("prov-e5", "model", 5);
    let mux = mux_with(coding_config(vec![e1]), &["prov-e5"], Arc::clone(&sink));
    mux.register_adapter("prov-e5", ScriptedAdapter::always_ok());

    for i in 0..5 {
        mux.route_and_call(request(Workload::Coding, &format!("prompt {i}")))
            .await
            .expect("routable");
    }

    assert_eq!(mux.ledger().record_count(&"prov-e5".into()), 5);
    assert!(mux.ledger().spend(&"prov-e5".into(), SpendWindow::Day) > 0.0);
    let observations = sink.observations();
    assert_eq!(observations.len(), 5);
    assert!(observations.iter().all(|o| o.outcome.is_success()));
}

#[tokio::test]
async fn exhausted_carries_the_final_classification() {
    let sink = Arc::new(MemorySink::new());
    let e1 = endpoint("prov-e6a", "model-hi", 5);
    let e2 = endpoint("prov-e6b", "model-lo", 4);
    let mux = mux_with(
        coding_config(vec![e1, e2]),
        &["prov-e6a", "prov-e6b"],
        Arc::clone(&sink),
    );
    let dead = || {
        ScriptedAdapter::scripted(vec![
            Err(AdapterError::transport("reset")),
            Err(AdapterError::transport("reset")),
        ])
    };
    mux.register_adapter("prov-e6a", dead());
    mux.register_adapter("prov-e6b", dead());

    let err = mux
        .route_and_call(request(Workload::Coding, "doomed"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RouteError::Exhausted {
            last_error: FailureClass::Transport
        }
    );
    assert_eq!(sink.observations().len(), 2);
}
