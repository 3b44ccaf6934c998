//! The endpoint catalog: declared endpoints, workload chains, provider
//! budgets, and strategy weights.
//!
//! A catalog is validated once at build time and immutable afterwards;
//! [`configure`](crate::Mux::configure) swaps the whole catalog atomically,
//! so requests that already hold a snapshot finish against it.

use crate::error::RouteError;
use modelmux_compactor::CompactionBudget;
use modelmux_core::{Endpoint, EndpointId, ProviderId, Strategy, StrategyWeights, Workload};
use modelmux_limiter::ProviderBudget;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Full routing configuration, replaceable at runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MuxConfig {
    pub endpoints: Vec<Endpoint>,
    /// Fallback chains per workload, in priority order.
    pub chains: HashMap<Workload, Vec<EndpointId>>,
    /// Per-provider admission budgets for the token-bucket limiter.
    #[serde(default)]
    pub provider_budgets: HashMap<ProviderId, ProviderBudget>,
    /// Per-provider compaction budgets; providers without one get
    /// [`CompactionBudget::balanced`].
    #[serde(default)]
    pub compaction: HashMap<ProviderId, CompactionBudget>,
    /// Overrides the default weights of the `Balanced` strategy.
    #[serde(default)]
    pub balanced_weights: Option<StrategyWeights>,
}

/// Validated, immutable view of a [`MuxConfig`].
#[derive(Debug)]
pub(crate) struct Catalog {
    endpoints: HashMap<EndpointId, Endpoint>,
    chains: HashMap<Workload, Vec<EndpointId>>,
    compaction: HashMap<ProviderId, CompactionBudget>,
    balanced_weights: Option<StrategyWeights>,
}

impl Catalog {
    pub(crate) fn build(config: &MuxConfig) -> Result<Self, RouteError> {
        let mut endpoints = HashMap::new();
        for endpoint in &config.endpoints {
            if endpoints
                .insert(endpoint.id.clone(), endpoint.clone())
                .is_some()
            {
                return Err(RouteError::configuration(format!(
                    "endpoint {} declared twice",
                    endpoint.id
                )));
            }
        }

        for (workload, chain) in &config.chains {
            for id in chain {
                if !endpoints.contains_key(id) {
                    return Err(RouteError::configuration(format!(
                        "chain for {workload} references undeclared endpoint {id}"
                    )));
                }
            }
        }

        Ok(Self {
            endpoints,
            chains: config.chains.clone(),
            compaction: config.compaction.clone(),
            balanced_weights: config.balanced_weights,
        })
    }

    pub(crate) fn endpoint(&self, id: &EndpointId) -> Option<&Endpoint> {
        self.endpoints.get(id)
    }

    pub(crate) fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }

    pub(crate) fn chain(&self, workload: Workload) -> Option<&[EndpointId]> {
        self.chains.get(&workload).map(Vec::as_slice)
    }

    pub(crate) fn compaction_budget(&self, provider: &ProviderId) -> CompactionBudget {
        self.compaction
            .get(provider)
            .copied()
            .unwrap_or_else(CompactionBudget::balanced)
    }

    /// Effective weights: per-call override first, then the configured
    /// `Balanced` override, then the strategy's defaults.
    pub(crate) fn weights(
        &self,
        strategy: Strategy,
        call_override: Option<StrategyWeights>,
    ) -> StrategyWeights {
        if let Some(weights) = call_override {
            return weights;
        }
        if strategy == Strategy::Balanced {
            if let Some(weights) = self.balanced_weights {
                return weights;
            }
        }
        StrategyWeights::for_strategy(strategy)
    }
}
