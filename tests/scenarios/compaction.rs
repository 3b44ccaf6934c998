use crate::common::*;
use modelmux::{MemorySink, MuxConfig, RouteRequest};
use modelmux_compactor::CompactionBudget;
use modelmux_core::{Role, ToolCall, Turn, Workload};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn call(id: &str) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: "shell".into(),
        arguments: "{}".into(),
    }
}

/// Compacts on every request, keeping a single trailing exchange.
fn always_compact(provider: &str, config: &mut MuxConfig) {
    config.compaction = HashMap::from([(
        provider.into(),
        CompactionBudget {
            trigger_fraction: 0.0,
            max_input_tokens: 1_000_000,
            target_input_tokens: 1_000_000,
            max_exchanges: 1,
        },
    )]);
}

#[tokio::test]
async fn orphaned_tool_results_never_reach_the_provider() {
    let sink = Arc::new(MemorySink::new());
    let e1 = endpoint("prov-s6", "model", 5);
    let mut config = coding_config(vec![e1.clone()]);
    always_compact("prov-s6", &mut config);
    let mux = mux_with(config, &["prov-s6"], Arc::clone(&sink));
    let adapter = ScriptedAdapter::always_ok();
    mux.register_adapter("prov-s6", adapter.clone());

    let history = vec![
        Turn::system("sys"),
        Turn::user("one"),
        Turn::assistant_with_tools("", vec![call("t1")]),
        Turn::tool_result("t1", "result one"),
        Turn::user("two"),
        Turn::assistant_with_tools("", vec![call("t2")]),
        Turn::tool_result("t2", "result two"),
    ];
    mux.route_and_call(
        RouteRequest::builder(Workload::Coding)
            .history(history)
            .no_cache()
            .deadline_in(Duration::from_secs(10))
            .build(),
    )
    .await
    .expect("routable");

    let sent = &adapter.requests()[0].turns;
    assert_eq!(
        sent,
        &vec![
            Turn::system("sys"),
            Turn::user("two"),
            Turn::assistant_with_tools("", vec![call("t2")]),
            Turn::tool_result("t2", "result two"),
        ]
    );
    // The dropped pair went together: no orphan results anywhere.
    for turn in sent {
        if turn.role == Role::Tool {
            assert_eq!(turn.tool_call_id.as_deref(), Some("t2"));
        }
    }
}

#[tokio::test]
async fn histories_under_the_trigger_pass_through_unchanged() {
    let sink = Arc::new(MemorySink::new());
    let e1 = endpoint("prov-s6b", "model", 5);
    // Default budgets: a short history is far under every trigger.
    let mux = mux_with(coding_config(vec![e1]), &["prov-s6b"], Arc::clone(&sink));
    let adapter = ScriptedAdapter::always_ok();
    mux.register_adapter("prov-s6b", adapter.clone());

    let history = vec![
        Turn::system("sys"),
        Turn::user("one"),
        Turn::assistant("a1"),
        Turn::user("two"),
    ];
    mux.route_and_call(
        RouteRequest::builder(Workload::Coding)
            .history(history.clone())
            .no_cache()
            .deadline_in(Duration::from_secs(10))
            .build(),
    )
    .await
    .expect("routable");

    assert_eq!(adapter.requests()[0].turns, history);
}
