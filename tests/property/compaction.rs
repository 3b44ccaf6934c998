//! Invariant: after compaction, the retained tail contains no tool-result
//! whose matching tool-call is absent.

use modelmux_compactor::{CompactionBudget, Compactor};
use modelmux_core::{Role, ToolCall, Turn};
use proptest::prelude::*;
use std::collections::HashSet;

fn history_from(shape: &[(bool, bool)]) -> Vec<Turn> {
    let mut turns = vec![Turn::system("preamble")];
    for (i, (with_tool, late_result)) in shape.iter().enumerate() {
        turns.push(Turn::user(format!("question {i}")));
        if *with_tool {
            let id = format!("t{i}");
            turns.push(Turn::assistant_with_tools(
                "",
                vec![ToolCall {
                    id: id.clone(),
                    name: "tool".into(),
                    arguments: "{}".into(),
                }],
            ));
            if !*late_result {
                turns.push(Turn::tool_result(id.as_str(), format!("result {i}")));
            }
        }
        turns.push(Turn::assistant(format!("answer {i}")));
        if *with_tool && *late_result {
            // The result straggles in after the assistant's answer.
            turns.push(Turn::tool_result(format!("t{i}"), format!("late {i}")));
        }
    }
    turns
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn retained_tail_has_no_orphan_tool_results(
        shape in proptest::collection::vec((any::<bool>(), any::<bool>()), 1..8),
        max_exchanges in 1usize..8,
    ) {
        let history = history_from(&shape);
        let budget = CompactionBudget {
            trigger_fraction: 0.0,
            max_input_tokens: 1_000_000,
            target_input_tokens: 1_000_000,
            max_exchanges,
        };
        let (compacted, saved) = Compactor::new().compact(&history, &budget);

        let retained_calls: HashSet<&str> = compacted
            .iter()
            .flat_map(|t| t.tool_calls.iter().map(|c| c.id.as_str()))
            .collect();
        for turn in &compacted {
            if turn.role == Role::Tool {
                let id = turn.tool_call_id.as_deref().unwrap();
                prop_assert!(
                    retained_calls.contains(id),
                    "orphan tool result {id} survived compaction"
                );
            }
        }

        // The preamble and the most recent exchange always survive.
        prop_assert_eq!(&compacted[0], &history[0]);
        let last_user = format!("question {}", shape.len() - 1);
        prop_assert!(compacted.iter().any(|t| t.content == last_user));

        // Token accounting is consistent.
        let before = modelmux_core::estimate_history_tokens(&history);
        let after = modelmux_core::estimate_history_tokens(&compacted);
        prop_assert_eq!(saved, before.saturating_sub(after));
    }
}
