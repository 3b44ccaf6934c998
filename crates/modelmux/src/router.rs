//! Endpoint selection: filter, gate, score, tie-break.
//!
//! The router never blocks: every input it consults is a non-blocking read
//! of component state. When everything is filtered out it reports the
//! earliest known relief time instead of waiting for it.

use crate::catalog::Catalog;
use crate::decision::{DecisionId, ReasonCode, RoutingDecision};
use crate::error::RouteError;
use crate::mux::Inner;
use crate::score::{self, ScoreContext};
use modelmux_core::{CapabilitySet, CapacityStatus, EndpointId, Strategy, StrategyWeights, Workload};
use modelmux_limiter::CheckOutcome;
use std::cmp::Ordering;
use std::time::Duration;

/// Scores within this distance tie and fall through to stickiness and
/// chain order.
const SCORE_EPSILON: f64 = 1e-9;

struct Candidate {
    id: EndpointId,
    chain_index: usize,
    tier: u8,
    status: CapacityStatus,
    score: f64,
}

pub(crate) struct DecideParams<'a> {
    pub workload: Workload,
    pub estimated_tokens: u32,
    pub capabilities: &'a CapabilitySet,
    pub strategy: Strategy,
    pub weights: StrategyWeights,
    pub session: Option<&'a str>,
}

pub(crate) fn decide(
    inner: &Inner,
    catalog: &Catalog,
    params: &DecideParams<'_>,
) -> Result<RoutingDecision, RouteError> {
    let chain = catalog.chain(params.workload).ok_or_else(|| {
        RouteError::configuration(format!(
            "no chain configured for workload {}",
            params.workload
        ))
    })?;

    let mut throttle_retry: Option<Duration> = None;
    let mut candidates: Vec<Candidate> = Vec::with_capacity(chain.len());

    for (chain_index, id) in chain.iter().enumerate() {
        let Some(endpoint) = catalog.endpoint(id) else {
            continue;
        };
        if !params.capabilities.is_empty()
            && !endpoint.capabilities.is_superset(params.capabilities)
        {
            continue;
        }
        if !inner.oracle.is_usable(&id.provider) {
            continue;
        }
        // A rate-limited sibling puts the whole provider in cooldown.
        if inner.capacity.provider_cooldown_until(&id.provider).is_some() {
            continue;
        }
        let status = inner.capacity.status(id);
        if matches!(status, CapacityStatus::Cooldown | CapacityStatus::Exhausted) {
            continue;
        }
        if !inner.breakers.admittable(id) {
            continue;
        }

        let throttled = match inner.limiter.check(&id.provider, params.estimated_tokens) {
            CheckOutcome::Allow => false,
            CheckOutcome::Throttle { retry_after } => {
                throttle_retry = Some(match throttle_retry {
                    Some(existing) => existing.min(retry_after),
                    None => retry_after,
                });
                true
            }
        };

        let ctx = ScoreContext {
            status,
            breaker: inner.breakers.state(id),
            throttled,
        };
        candidates.push(Candidate {
            id: id.clone(),
            chain_index,
            tier: endpoint.tier,
            status,
            score: score::composite(endpoint, &ctx, &params.weights),
        });
    }

    if candidates.is_empty() {
        let capacity_relief = inner
            .capacity
            .earliest_relief()
            .map(|at| at.saturating_duration_since(std::time::Instant::now()));
        let retry_after = match (capacity_relief, throttle_retry) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        return Err(RouteError::NoRoute { retry_after });
    }

    let sticky_tier = params
        .session
        .and_then(|session| inner.sessions.lock().get(session).copied());

    candidates.sort_by(|a, b| rank(a, b, sticky_tier));

    let reason = if candidates.len() == 1 {
        ReasonCode::OnlyCandidate
    } else if decided_by_stickiness(&candidates, sticky_tier) {
        ReasonCode::StickyTier
    } else {
        ReasonCode::BestScore
    };

    let mut ranked = candidates.into_iter();
    let Some(top) = ranked.next() else {
        return Err(RouteError::NoRoute { retry_after: None });
    };

    let decision = RoutingDecision {
        id: DecisionId::next(),
        workload: params.workload,
        endpoint: top.id,
        strategy: params.strategy,
        reason,
        capacity_status: top.status,
        remaining_chain: ranked.map(|c| c.id).collect(),
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(
        decision = %decision.id,
        workload = %decision.workload,
        endpoint = %decision.endpoint,
        strategy = ?params.strategy,
        fallbacks = decision.remaining_chain.len(),
        "routing decision"
    );

    #[cfg(feature = "metrics")]
    metrics::counter!(
        "modelmux_router_decisions_total",
        "workload" => decision.workload.as_str(),
        "endpoint" => decision.endpoint.to_string()
    )
    .increment(1);

    Ok(decision)
}

/// Score descending, then sticky tier, then chain order.
fn rank(a: &Candidate, b: &Candidate, sticky_tier: Option<u8>) -> Ordering {
    if (a.score - b.score).abs() > SCORE_EPSILON {
        return b
            .score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal);
    }
    if let Some(tier) = sticky_tier {
        let a_sticky = a.tier == tier;
        let b_sticky = b.tier == tier;
        if a_sticky != b_sticky {
            return if a_sticky { Ordering::Less } else { Ordering::Greater };
        }
    }
    a.chain_index.cmp(&b.chain_index)
}

fn decided_by_stickiness(candidates: &[Candidate], sticky_tier: Option<u8>) -> bool {
    let Some(tier) = sticky_tier else {
        return false;
    };
    let (Some(top), Some(second)) = (candidates.first(), candidates.get(1)) else {
        return false;
    };
    (top.score - second.score).abs() <= SCORE_EPSILON && top.tier == tier && second.tier != tier
}
