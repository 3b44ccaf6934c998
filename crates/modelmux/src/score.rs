//! Endpoint scoring under a strategy's weight vector.
//!
//! Each component score lives in [0, 1]; the composite is their weighted
//! sum. A throttled provider halves the composite - demoted, not dropped.

use modelmux_breaker::BreakerState;
use modelmux_core::{Capability, CapacityStatus, Endpoint, StrategyWeights};

/// Live signals folded into the score alongside the static descriptor.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScoreContext {
    pub status: CapacityStatus,
    pub breaker: BreakerState,
    pub throttled: bool,
}

pub(crate) fn composite(endpoint: &Endpoint, ctx: &ScoreContext, weights: &StrategyWeights) -> f64 {
    let cost = 1.0 / (1.0 + endpoint.blended_cost_per_1k());
    let speed = f64::from(endpoint.tier) / 5.0;
    let reliability = reliability(ctx.status, ctx.breaker);
    let capability = endpoint.capabilities.len() as f64 / Capability::ALL.len() as f64;

    let mut score = weights.cost * cost
        + weights.speed * speed
        + weights.reliability * reliability
        + weights.capability * capability;
    if ctx.throttled {
        score *= 0.5;
    }
    score
}

fn reliability(status: CapacityStatus, breaker: BreakerState) -> f64 {
    let capacity_factor = match status {
        CapacityStatus::Available => 1.0,
        CapacityStatus::Approaching => 0.75,
        CapacityStatus::Low => 0.4,
        CapacityStatus::Exhausted | CapacityStatus::Cooldown => 0.1,
    };
    let breaker_factor = match breaker {
        BreakerState::Closed => 1.0,
        BreakerState::HalfOpen => 0.5,
        BreakerState::Open => 0.0,
    };
    capacity_factor * breaker_factor
}
