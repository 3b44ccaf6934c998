use serde::{Deserialize, Serialize};

/// Provider-class compaction budget.
///
/// The presets mirror the usual provider tiers but every field is plain
/// data: endpoint ceilings declared in the catalog stay authoritative, and
/// callers may override any preset value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompactionBudget {
    /// Compact once estimated tokens exceed this fraction of `max_input_tokens`.
    pub trigger_fraction: f64,
    pub max_input_tokens: u32,
    pub target_input_tokens: u32,
    /// How many trailing exchanges to keep.
    pub max_exchanges: usize,
}

impl CompactionBudget {
    /// Small-context providers: compact early and hard.
    pub fn aggressive() -> Self {
        Self {
            trigger_fraction: 0.20,
            max_input_tokens: 50_000,
            target_input_tokens: 8_000,
            max_exchanges: 3,
        }
    }

    /// The middle of the road.
    pub fn balanced() -> Self {
        Self {
            trigger_fraction: 0.50,
            max_input_tokens: 100_000,
            target_input_tokens: 40_000,
            max_exchanges: 8,
        }
    }

    /// Long-context providers: compact late, keep plenty.
    pub fn maintenance() -> Self {
        Self {
            trigger_fraction: 0.70,
            max_input_tokens: 180_000,
            target_input_tokens: 100_000,
            max_exchanges: 12,
        }
    }

    pub fn with_max_exchanges(mut self, n: usize) -> Self {
        self.max_exchanges = n;
        self
    }

    pub fn with_target_input_tokens(mut self, n: u32) -> Self {
        self.target_input_tokens = n;
        self
    }

    /// True when `estimated_tokens` crosses the compaction trigger.
    pub fn should_compact(&self, estimated_tokens: u32) -> bool {
        f64::from(estimated_tokens) > self.trigger_fraction * f64::from(self.max_input_tokens)
    }
}

impl Default for CompactionBudget {
    fn default() -> Self {
        Self::balanced()
    }
}
