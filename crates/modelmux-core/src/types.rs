//! Endpoint, workload, and strategy types.
//!
//! An [`Endpoint`] is a routable `(provider, model)` pair declared once at
//! startup and never mutated. Workload chains over endpoint ids are owned by
//! the router catalog; every other component keys its own state maps by
//! [`EndpointId`] or [`ProviderId`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an upstream provider (e.g. `"anthropic"`, `"openai"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ProviderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a model within a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ModelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A routable `(provider, model)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId {
    pub provider: ProviderId,
    pub model: ModelId,
}

impl EndpointId {
    pub fn new(provider: impl Into<ProviderId>, model: impl Into<ModelId>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Coarse classification of what the caller wants from a request.
///
/// Each workload owns an ordered fallback chain of endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Workload {
    /// Planning and task decomposition.
    Orchestrator,
    /// Long-form reasoning.
    Reasoning,
    /// Code generation and editing.
    Coding,
    /// Search, retrieval, and summarization.
    Librarian,
}

impl Workload {
    pub const ALL: [Workload; 4] = [
        Workload::Orchestrator,
        Workload::Reasoning,
        Workload::Coding,
        Workload::Librarian,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Workload::Orchestrator => "orchestrator",
            Workload::Reasoning => "reasoning",
            Workload::Coding => "coding",
            Workload::Librarian => "librarian",
        }
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A capability an endpoint may declare and a request may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ToolUse,
    Vision,
    LongContext,
    Code,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::ToolUse,
        Capability::Vision,
        Capability::LongContext,
        Capability::Code,
    ];

    fn bit(self) -> u8 {
        match self {
            Capability::ToolUse => 1 << 0,
            Capability::Vision => 1 << 1,
            Capability::LongContext => 1 << 2,
            Capability::Code => 1 << 3,
        }
    }
}

/// A small set of [`Capability`] values.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        let mut set = Self::empty();
        for cap in Capability::ALL {
            set.insert(cap);
        }
        set
    }

    pub fn with(mut self, cap: Capability) -> Self {
        self.insert(cap);
        self
    }

    pub fn insert(&mut self, cap: Capability) {
        self.0 |= cap.bit();
    }

    pub fn contains(&self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    /// True if every capability in `required` is present in `self`.
    pub fn is_superset(&self, required: &CapabilitySet) -> bool {
        self.0 & required.0 == required.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut set = Self::empty();
        for cap in iter {
            set.insert(cap);
        }
        set
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for CapabilitySet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let caps = Vec::<Capability>::deserialize(deserializer)?;
        Ok(caps.into_iter().collect())
    }
}

/// Static description of one upstream target.
///
/// Declared once at startup, owned by the router catalog, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    /// Quality tier: 1 is the most capable, 5 the least.
    pub tier: u8,
    /// USD per input token.
    pub cost_per_input_token: f64,
    /// USD per output token.
    pub cost_per_output_token: f64,
    /// Declared input ceiling in tokens.
    pub max_input_tokens: u32,
    /// Declared output ceiling in tokens.
    pub max_output_tokens: u32,
    /// Declared per-minute token budget.
    pub tokens_per_minute: u64,
    /// Declared per-day request budget.
    pub requests_per_day: u64,
    pub capabilities: CapabilitySet,
}

impl Endpoint {
    /// Blended USD cost per 1k tokens, assuming a 3:1 input:output mix.
    pub fn blended_cost_per_1k(&self) -> f64 {
        (0.75 * self.cost_per_input_token + 0.25 * self.cost_per_output_token) * 1000.0
    }

    /// Realized USD cost for a completed call.
    pub fn cost_usd(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        f64::from(input_tokens) * self.cost_per_input_token
            + f64::from(output_tokens) * self.cost_per_output_token
    }
}

/// Derived health of an endpoint's capacity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityStatus {
    Available,
    Approaching,
    Low,
    Exhausted,
    Cooldown,
}

impl CapacityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CapacityStatus::Available => "available",
            CapacityStatus::Approaching => "approaching",
            CapacityStatus::Low => "low",
            CapacityStatus::Exhausted => "exhausted",
            CapacityStatus::Cooldown => "cooldown",
        }
    }

    /// True for the statuses that should push the router toward another
    /// endpoint before a failure occurs.
    pub fn prefers_switch(self) -> bool {
        matches!(
            self,
            CapacityStatus::Low | CapacityStatus::Exhausted | CapacityStatus::Cooldown
        )
    }
}

impl fmt::Display for CapacityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selection strategy for ranking candidate endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    CostOptimized,
    SpeedOptimized,
    ReliabilityOptimized,
    Balanced,
    CapabilityFirst,
}

/// Weight vector applied to the per-endpoint component scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyWeights {
    pub cost: f64,
    pub speed: f64,
    pub reliability: f64,
    pub capability: f64,
}

impl StrategyWeights {
    pub fn balanced() -> Self {
        Self {
            cost: 0.30,
            speed: 0.30,
            reliability: 0.25,
            capability: 0.15,
        }
    }

    pub fn for_strategy(strategy: Strategy) -> Self {
        match strategy {
            Strategy::CostOptimized => Self {
                cost: 0.70,
                speed: 0.10,
                reliability: 0.10,
                capability: 0.10,
            },
            Strategy::SpeedOptimized => Self {
                cost: 0.10,
                speed: 0.70,
                reliability: 0.10,
                capability: 0.10,
            },
            Strategy::ReliabilityOptimized => Self {
                cost: 0.10,
                speed: 0.10,
                reliability: 0.70,
                capability: 0.10,
            },
            Strategy::Balanced => Self::balanced(),
            Strategy::CapabilityFirst => Self {
                cost: 0.10,
                speed: 0.10,
                reliability: 0.15,
                capability: 0.65,
            },
        }
    }
}

impl Default for StrategyWeights {
    fn default() -> Self {
        Self::balanced()
    }
}
