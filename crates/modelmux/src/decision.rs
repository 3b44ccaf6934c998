use modelmux_core::{CapacityStatus, EndpointId, Strategy, Workload};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_DECISION: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier linking all attempt observations of one
/// `route_and_call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DecisionId(u64);

impl DecisionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_DECISION.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d-{}", self.0)
    }
}

/// Why the router picked the endpoint it picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Highest composite score under the caller's strategy.
    BestScore,
    /// Nothing else survived filtering.
    OnlyCandidate,
    /// Tie broken toward the tier of the session's previous decision.
    StickyTier,
}

/// Immutable routing decision: created by the router, consumed by the
/// executor, logged for replay.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub id: DecisionId,
    pub workload: Workload,
    pub endpoint: EndpointId,
    pub strategy: Strategy,
    pub reason: ReasonCode,
    /// Capacity status of the selected endpoint at decision time.
    pub capacity_status: CapacityStatus,
    /// The rest of the ranked list, in failover order.
    pub remaining_chain: Vec<EndpointId>,
}
