use modelmux_core::{
    Capability, CapabilitySet, EndpointId, ProviderResponse, Strategy, StrategyWeights, Turn,
    Workload,
};
use std::time::Duration;
use tokio::time::Instant;

/// Per-request cache behavior.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub enabled: bool,
    /// Overrides the cache's default TTL.
    pub ttl: Option<Duration>,
    /// Opt into aggressive prompt normalization for this call.
    pub aggressive_normalize: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: None,
            aggressive_normalize: false,
        }
    }
}

/// One routable request.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub workload: Workload,
    pub history: Vec<Turn>,
    /// Caller-provided estimate; derived from the history when absent.
    pub estimated_tokens: Option<u32>,
    pub capabilities: CapabilitySet,
    pub strategy: Strategy,
    /// Per-call strategy weight override.
    pub weights: Option<StrategyWeights>,
    pub deadline: Instant,
    /// Session key for tier stickiness across decisions.
    pub session: Option<String>,
    pub cache: CachePolicy,
    /// Marks summarization sub-requests so they never re-enter compaction.
    pub no_recursive_compact: bool,
}

impl RouteRequest {
    pub fn builder(workload: Workload) -> RouteRequestBuilder {
        RouteRequestBuilder::new(workload)
    }
}

/// Builder for [`RouteRequest`].
pub struct RouteRequestBuilder {
    workload: Workload,
    history: Vec<Turn>,
    estimated_tokens: Option<u32>,
    capabilities: CapabilitySet,
    strategy: Strategy,
    weights: Option<StrategyWeights>,
    deadline: Option<Instant>,
    session: Option<String>,
    cache: CachePolicy,
    no_recursive_compact: bool,
}

impl RouteRequestBuilder {
    /// Defaults: `Balanced` strategy, caching on, 30 s deadline.
    pub fn new(workload: Workload) -> Self {
        Self {
            workload,
            history: Vec::new(),
            estimated_tokens: None,
            capabilities: CapabilitySet::empty(),
            strategy: Strategy::Balanced,
            weights: None,
            deadline: None,
            session: None,
            cache: CachePolicy::default(),
            no_recursive_compact: false,
        }
    }

    /// Shorthand for a single user turn.
    pub fn prompt(mut self, text: impl Into<String>) -> Self {
        self.history = vec![Turn::user(text)];
        self
    }

    pub fn history(mut self, turns: Vec<Turn>) -> Self {
        self.history = turns;
        self
    }

    pub fn estimated_tokens(mut self, tokens: u32) -> Self {
        self.estimated_tokens = Some(tokens);
        self
    }

    pub fn capability(mut self, cap: Capability) -> Self {
        self.capabilities.insert(cap);
        self
    }

    pub fn capabilities(mut self, caps: CapabilitySet) -> Self {
        self.capabilities = caps;
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn weights(mut self, weights: StrategyWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn deadline_in(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.cache.enabled = false;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl = Some(ttl);
        self
    }

    pub fn aggressive_normalize(mut self) -> Self {
        self.cache.aggressive_normalize = true;
        self
    }

    /// Marks this request as a summarization sub-request.
    pub fn no_recursive_compact(mut self) -> Self {
        self.no_recursive_compact = true;
        self
    }

    pub fn build(self) -> RouteRequest {
        RouteRequest {
            workload: self.workload,
            history: self.history,
            estimated_tokens: self.estimated_tokens,
            capabilities: self.capabilities,
            strategy: self.strategy,
            weights: self.weights,
            deadline: self
                .deadline
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(30)),
            session: self.session,
            cache: self.cache,
            no_recursive_compact: self.no_recursive_compact,
        }
    }
}

/// A successful routing outcome.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    /// The endpoint that actually served the response.
    pub endpoint: EndpointId,
    pub response: ProviderResponse,
    /// Absent for cache hits, which never reach the router.
    pub decision_id: Option<String>,
    pub from_cache: bool,
}
