use crate::common::*;
use modelmux::{MemorySink, RouteRequest};
use modelmux_core::Workload;
use std::sync::Arc;
use std::time::Duration;

fn request(prompt: &str) -> RouteRequest {
    RouteRequest::builder(Workload::Coding)
        .prompt(prompt)
        .deadline_in(Duration::from_secs(10))
        .build()
}

#[tokio::test]
async fn equivalent_prompts_hit_the_cache() {
    let sink = Arc::new(MemorySink::new());
    let e1 = endpoint("prov-c1", "model", 5);
    let mux = mux_with(coding_config(vec![e1.clone()]), &["prov-c1"], Arc::clone(&sink));
    let adapter = ScriptedAdapter::always_ok();
    mux.register_adapter("prov-c1", adapter.clone());

    let first = mux
        .route_and_call(request("Write   Hello World"))
        .await
        .expect("miss routes");
    assert!(!first.from_cache);

    // Same prompt modulo whitespace and case: served from the cache, no
    // second upstream call, no second observation.
    let second = mux
        .route_and_call(request("write hello world"))
        .await
        .expect("hit");
    assert!(second.from_cache);
    assert_eq!(second.endpoint, e1.id);
    assert_eq!(second.response.content, first.response.content);
    assert!(second.decision_id.is_none());
    assert_eq!(adapter.calls(), 1);
    assert_eq!(sink.observations().len(), 1);
}

#[tokio::test]
async fn concurrent_identical_misses_coalesce_into_one_call() {
    let sink = Arc::new(MemorySink::new());
    let e1 = endpoint("prov-c2", "model", 5);
    let mux = mux_with(coding_config(vec![e1]), &["prov-c2"], Arc::clone(&sink));
    let adapter = ScriptedAdapter::slow(Duration::from_millis(50));
    mux.register_adapter("prov-c2", adapter.clone());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let mux = mux.clone();
        handles.push(tokio::spawn(async move {
            mux.route_and_call(request("expensive analysis")).await
        }));
    }

    let mut contents = Vec::new();
    for handle in handles {
        let outcome = handle.await.unwrap().expect("shared result");
        contents.push(outcome.response.content);
    }

    // One leader computed; every waiter saw identical bytes; exactly one
    // insert happened.
    assert_eq!(adapter.calls(), 1);
    contents.dedup();
    assert_eq!(contents.len(), 1);
    assert_eq!(mux.cache().len(), 1);
    assert_eq!(sink.observations().len(), 1);
}

#[tokio::test]
async fn no_cache_requests_always_go_upstream() {
    let sink = Arc::new(MemorySink::new());
    let e1 = endpoint("prov-c3", "model", 5);
    let mux = mux_with(coding_config(vec![e1]), &["prov-c3"], Arc::clone(&sink));
    let adapter = ScriptedAdapter::always_ok();
    mux.register_adapter("prov-c3", adapter.clone());

    for _ in 0..2 {
        let outcome = mux
            .route_and_call(
                RouteRequest::builder(Workload::Coding)
                    .prompt("same prompt")
                    .no_cache()
                    .deadline_in(Duration::from_secs(10))
                    .build(),
            )
            .await
            .expect("routable");
        assert!(!outcome.from_cache);
    }
    assert_eq!(adapter.calls(), 2);
    assert_eq!(mux.cache().len(), 0);
}
