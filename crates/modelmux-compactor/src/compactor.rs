use crate::budget::CompactionBudget;
use async_trait::async_trait;
use hashbrown::HashSet;
use modelmux_core::{estimate_history_tokens, Role, Turn};
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;

/// Error from a summarization sub-request.
#[derive(Debug, Clone, Error)]
#[error("summarization failed: {0}")]
pub struct SummarizeError(pub String);

/// Delegates truncated prefix content to a summarization endpoint.
///
/// The implementation is expected to route its own request; it must mark
/// that request so it never re-enters compaction.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, dropped: &[Turn]) -> Result<String, SummarizeError>;
}

/// Shrinks histories to a [`CompactionBudget`].
pub struct Compactor {
    summarizer: RwLock<Option<Arc<dyn Summarizer>>>,
}

impl Compactor {
    pub fn new() -> Self {
        Self {
            summarizer: RwLock::new(None),
        }
    }

    /// Installs the optional summarizer after construction (it usually
    /// holds a handle back into the router).
    pub fn set_summarizer(&self, summarizer: Arc<dyn Summarizer>) {
        *self.summarizer.write() = Some(summarizer);
    }

    pub fn has_summarizer(&self) -> bool {
        self.summarizer.read().is_some()
    }

    /// Compacts `history` to fit `budget`. Returns the new history and the
    /// tokens saved. A history under the trigger is returned unchanged.
    pub fn compact(&self, history: &[Turn], budget: &CompactionBudget) -> (Vec<Turn>, u32) {
        let before = estimate_history_tokens(history);
        if !budget.should_compact(before) {
            return (history.to_vec(), 0);
        }

        let (preamble, exchanges) = split_history(history);
        let mut keep = exchanges.len().min(budget.max_exchanges);
        let mut retained = assemble(&preamble, &exchanges, keep);

        // Still over target: shed the oldest retained exchanges, but never
        // the most recent one.
        while keep > 1 && estimate_history_tokens(&retained) > budget.target_input_tokens {
            keep -= 1;
            retained = assemble(&preamble, &exchanges, keep);
        }

        let after = estimate_history_tokens(&retained);
        let saved = before.saturating_sub(after);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            turns_before = history.len(),
            turns_after = retained.len(),
            tokens_before = before,
            tokens_after = after,
            "history compacted"
        );

        (retained, saved)
    }

    /// Like [`compact`](Self::compact), but when a summarizer is installed
    /// the dropped turns are condensed into a summary turn placed right
    /// after the preamble.
    pub async fn compact_with_summary(
        &self,
        history: &[Turn],
        budget: &CompactionBudget,
    ) -> (Vec<Turn>, u32) {
        let before = estimate_history_tokens(history);
        let (mut retained, saved) = self.compact(history, budget);
        if saved == 0 {
            return (retained, saved);
        }

        let summarizer = self.summarizer.read().clone();
        let Some(summarizer) = summarizer else {
            return (retained, saved);
        };

        let dropped = dropped_turns(history, &retained);
        if dropped.is_empty() {
            return (retained, saved);
        }

        match summarizer.summarize(&dropped).await {
            Ok(summary) => {
                let preamble_len = retained
                    .iter()
                    .take_while(|t| t.role == Role::System)
                    .count();
                retained.insert(
                    preamble_len,
                    Turn::system(format!("Summary of earlier conversation: {summary}")),
                );
                let after = estimate_history_tokens(&retained);
                (retained, before.saturating_sub(after))
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %_err, "summarization failed, keeping plain compaction");
                (retained, saved)
            }
        }
    }
}

impl Default for Compactor {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits a history into the leading system preamble and a list of
/// exchanges. Each exchange starts at a user turn; any non-system turns
/// before the first user turn ride along with the first exchange.
fn split_history(history: &[Turn]) -> (Vec<Turn>, Vec<Vec<Turn>>) {
    let preamble: Vec<Turn> = history
        .iter()
        .take_while(|t| t.role == Role::System)
        .cloned()
        .collect();

    let mut exchanges: Vec<Vec<Turn>> = Vec::new();
    for turn in &history[preamble.len()..] {
        if turn.role == Role::User || exchanges.is_empty() {
            if turn.role == Role::User {
                exchanges.push(vec![turn.clone()]);
                continue;
            }
            exchanges.push(Vec::new());
        }
        if let Some(last) = exchanges.last_mut() {
            last.push(turn.clone());
        }
    }
    (preamble, exchanges)
}

/// Rebuilds a history from the preamble plus the last `keep` exchanges,
/// dropping orphan tool-results.
fn assemble(preamble: &[Turn], exchanges: &[Vec<Turn>], keep: usize) -> Vec<Turn> {
    let start = exchanges.len().saturating_sub(keep);
    let tail: Vec<Turn> = exchanges[start..].iter().flatten().cloned().collect();

    let retained_calls: HashSet<&str> = tail
        .iter()
        .flat_map(|t| t.tool_calls.iter().map(|c| c.id.as_str()))
        .collect();

    let mut out = preamble.to_vec();
    out.extend(tail.iter().filter(|turn| match turn.role {
        Role::Tool => turn
            .tool_call_id
            .as_deref()
            .map(|id| retained_calls.contains(id))
            .unwrap_or(false),
        _ => true,
    }).cloned());
    out
}

fn dropped_turns(history: &[Turn], retained: &[Turn]) -> Vec<Turn> {
    // The retained tail is an in-order subsequence of the body; whatever
    // the subsequence walk does not match was dropped.
    let preamble_len = history.iter().take_while(|t| t.role == Role::System).count();
    let mut kept = retained[preamble_len.min(retained.len())..].iter().peekable();
    let mut dropped = Vec::new();
    for turn in &history[preamble_len..] {
        if kept.peek() == Some(&turn) {
            kept.next();
        } else {
            dropped.push(turn.clone());
        }
    }
    dropped
}
