//! The composed router handle.
//!
//! [`Mux`] aggregates every component behind one entry point,
//! [`Mux::route_and_call`]. Per request the flow is: compact if the
//! history crosses the provider-class trigger, probe the cache along the
//! chain's models, and on a miss route + execute under single-flight so
//! concurrent identical misses share one upstream call.

use crate::adapter::{PoolConfig, ProviderAdapter};
use crate::catalog::{Catalog, MuxConfig};
use crate::error::RouteError;
use crate::executor::{self, ExecuteParams};
use crate::observe::{DecisionSink, ObservationSink};
use crate::request::{RouteOutcome, RouteRequest};
use crate::router::{self, DecideParams};
use async_trait::async_trait;
use hashbrown::HashMap;
use modelmux_cache::{
    CacheConfig, CacheKey, FlightError, NormalizeMode, ResponseCache, SingleFlight,
};
use modelmux_capacity::{CapacityConfig, CapacityRegistry};
use modelmux_compactor::{Compactor, SummarizeError, Summarizer};
use modelmux_core::{
    estimate_history_tokens, CapabilitySet, ProviderId, ProviderResponse, Role, Strategy,
    StrategyWeights, Turn, Workload,
};
use modelmux_breaker::{BreakerConfig, BreakerSet};
use modelmux_credentials::{CredentialOracle, CredentialSources};
use modelmux_ledger::{CostLedger, LedgerConfig};
use modelmux_limiter::{LimiterConfig, TokenBucketLimiter};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::Duration;

pub(crate) struct Inner {
    pub(crate) catalog: RwLock<Arc<Catalog>>,
    pub(crate) oracle: CredentialOracle,
    pub(crate) capacity: CapacityRegistry,
    pub(crate) breakers: BreakerSet,
    pub(crate) limiter: TokenBucketLimiter,
    pub(crate) ledger: CostLedger,
    pub(crate) cache: ResponseCache<ProviderResponse>,
    pub(crate) flight: SingleFlight<CacheKey, RouteOutcome, RouteError>,
    pub(crate) compactor: Compactor,
    pub(crate) adapters: RwLock<HashMap<ProviderId, Arc<dyn ProviderAdapter>>>,
    pub(crate) pool: PoolConfig,
    pub(crate) sinks: Vec<Arc<dyn ObservationSink>>,
    pub(crate) decision_sinks: Vec<Arc<dyn DecisionSink>>,
    pub(crate) sessions: Mutex<std::collections::HashMap<String, u8>>,
}

/// Builder for [`Mux`].
pub struct MuxBuilder {
    config: MuxConfig,
    credentials: CredentialSources,
    capacity: Option<CapacityRegistry>,
    breakers: Option<BreakerSet>,
    limiter: Option<TokenBucketLimiter>,
    ledger: Option<CostLedger>,
    cache: Option<ResponseCache<ProviderResponse>>,
    pool: PoolConfig,
    sinks: Vec<Arc<dyn ObservationSink>>,
    decision_sinks: Vec<Arc<dyn DecisionSink>>,
    summarization: bool,
}

impl MuxBuilder {
    pub fn new(config: MuxConfig) -> Self {
        Self {
            config,
            credentials: CredentialSources::default(),
            capacity: None,
            breakers: None,
            limiter: None,
            ledger: None,
            cache: None,
            pool: PoolConfig::default(),
            sinks: Vec::new(),
            decision_sinks: Vec::new(),
            summarization: false,
        }
    }

    pub fn credentials(mut self, sources: CredentialSources) -> Self {
        self.credentials = sources;
        self
    }

    pub fn capacity(mut self, registry: CapacityRegistry) -> Self {
        self.capacity = Some(registry);
        self
    }

    pub fn breakers(mut self, set: BreakerSet) -> Self {
        self.breakers = Some(set);
        self
    }

    pub fn limiter(mut self, limiter: TokenBucketLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn ledger(mut self, ledger: CostLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn cache(mut self, cache: ResponseCache<ProviderResponse>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn observation_sink(mut self, sink: Arc<dyn ObservationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn decision_sink(mut self, sink: Arc<dyn DecisionSink>) -> Self {
        self.decision_sinks.push(sink);
        self
    }

    /// Summarize compacted-away history through the `Librarian` chain.
    pub fn summarization(mut self, enabled: bool) -> Self {
        self.summarization = enabled;
        self
    }

    pub fn build(self) -> Result<Mux, RouteError> {
        let catalog = Catalog::build(&self.config)?;
        let capacity = self
            .capacity
            .unwrap_or_else(|| CapacityRegistry::new(CapacityConfig::default()));
        for endpoint in catalog.endpoints() {
            capacity.declare(endpoint);
        }
        let limiter = self
            .limiter
            .unwrap_or_else(|| TokenBucketLimiter::new(LimiterConfig::default()));
        limiter.replace_budgets(self.config.provider_budgets.clone());

        let inner = Arc::new(Inner {
            catalog: RwLock::new(Arc::new(catalog)),
            oracle: CredentialOracle::new(self.credentials),
            capacity,
            breakers: self
                .breakers
                .unwrap_or_else(|| BreakerSet::new(BreakerConfig::default())),
            limiter,
            ledger: self
                .ledger
                .unwrap_or_else(|| CostLedger::new(LedgerConfig::default())),
            cache: self
                .cache
                .unwrap_or_else(|| ResponseCache::new(CacheConfig::default())),
            flight: SingleFlight::new(),
            compactor: Compactor::new(),
            adapters: RwLock::new(HashMap::new()),
            pool: self.pool,
            sinks: self.sinks,
            decision_sinks: self.decision_sinks,
            sessions: Mutex::new(std::collections::HashMap::new()),
        });

        if self.summarization {
            inner.compactor.set_summarizer(Arc::new(ChainSummarizer {
                inner: Arc::downgrade(&inner),
            }));
        }

        Ok(Mux { inner })
    }
}

/// The routing core's public handle. Cheap to clone.
#[derive(Clone)]
pub struct Mux {
    inner: Arc<Inner>,
}

impl Mux {
    pub fn builder(config: MuxConfig) -> MuxBuilder {
        MuxBuilder::new(config)
    }

    /// Registers the adapter for one provider. The adapter receives the
    /// shared pool settings.
    pub fn register_adapter(
        &self,
        provider: impl Into<ProviderId>,
        adapter: Arc<dyn ProviderAdapter>,
    ) {
        self.inner.adapters.write().insert(provider.into(), adapter);
    }

    /// Pool settings handed to adapters.
    pub fn pool_config(&self) -> PoolConfig {
        self.inner.pool
    }

    /// The sole public entry point: compact, probe the cache, route, and
    /// execute with transparent failover.
    pub async fn route_and_call(&self, request: RouteRequest) -> Result<RouteOutcome, RouteError> {
        run(Arc::clone(&self.inner), request).await
    }

    /// Idempotent signal that credentials for `provider` changed.
    pub fn notify_credential_change(&self, provider: &ProviderId) {
        self.inner.oracle.invalidate(provider);
    }

    /// Atomically replaces the endpoint catalog, chains, budgets, and
    /// weights. Requests that began before this call finish against the
    /// catalog they started with.
    pub fn configure(&self, config: MuxConfig) -> Result<(), RouteError> {
        let catalog = Catalog::build(&config)?;
        for endpoint in catalog.endpoints() {
            self.inner.capacity.declare(endpoint);
        }
        self.inner
            .limiter
            .replace_budgets(config.provider_budgets.clone());
        *self.inner.catalog.write() = Arc::new(catalog);
        Ok(())
    }

    pub fn capacity(&self) -> &CapacityRegistry {
        &self.inner.capacity
    }

    pub fn breakers(&self) -> &BreakerSet {
        &self.inner.breakers
    }

    pub fn ledger(&self) -> &CostLedger {
        &self.inner.ledger
    }

    pub fn cache(&self) -> &ResponseCache<ProviderResponse> {
        &self.inner.cache
    }

    pub fn credentials(&self) -> &CredentialOracle {
        &self.inner.oracle
    }
}

struct ExecPlan {
    workload: Workload,
    history: Vec<Turn>,
    estimated_tokens: u32,
    capabilities: CapabilitySet,
    strategy: Strategy,
    weights: Option<StrategyWeights>,
    deadline: tokio::time::Instant,
    session: Option<String>,
}

struct CachePut {
    normalized: String,
    ttl: Option<Duration>,
}

async fn run(inner: Arc<Inner>, request: RouteRequest) -> Result<RouteOutcome, RouteError> {
    let catalog = Arc::clone(&inner.catalog.read());

    let chain = catalog
        .chain(request.workload)
        .ok_or_else(|| {
            RouteError::configuration(format!(
                "no chain configured for workload {}",
                request.workload
            ))
        })?
        .to_vec();
    if chain.is_empty() {
        return Err(RouteError::configuration(format!(
            "chain for workload {} is empty",
            request.workload
        )));
    }
    if request.history.is_empty() {
        return Err(RouteError::configuration("request history is empty"));
    }
    if !request.capabilities.is_empty()
        && !chain
            .iter()
            .filter_map(|id| catalog.endpoint(id))
            .any(|ep| ep.capabilities.is_superset(&request.capabilities))
    {
        return Err(RouteError::configuration(
            "no endpoint in the chain declares the required capabilities",
        ));
    }

    inner.capacity.tick(std::time::Instant::now());

    let mut history = request.history;
    if !request.no_recursive_compact {
        let budget = chain
            .iter()
            .find(|id| inner.oracle.is_usable(&id.provider))
            .map(|id| catalog.compaction_budget(&id.provider));
        if let Some(budget) = budget {
            if budget.should_compact(estimate_history_tokens(&history)) {
                // Summarization is itself a routed call; the caller's
                // deadline bounds it. On expiry fall back to the plain cut.
                let summarized = tokio::time::timeout_at(
                    request.deadline,
                    inner.compactor.compact_with_summary(&history, &budget),
                )
                .await;
                history = match summarized {
                    Ok((compacted, _saved)) => compacted,
                    Err(_elapsed) => inner.compactor.compact(&history, &budget).0,
                };
            }
        }
    }

    let estimated_tokens = request
        .estimated_tokens
        .unwrap_or_else(|| estimate_history_tokens(&history));

    let plan = ExecPlan {
        workload: request.workload,
        history,
        estimated_tokens,
        capabilities: request.capabilities,
        strategy: request.strategy,
        weights: request.weights,
        deadline: request.deadline,
        session: request.session,
    };

    if !request.cache.enabled {
        return route_and_execute(inner, catalog, plan, None).await;
    }

    let mode = if request.cache.aggressive_normalize {
        NormalizeMode::Aggressive
    } else {
        NormalizeMode::Standard
    };
    let normalized = inner.cache.normalize(&render_history(&plan.history), mode);

    // Probe the chain's models in order; a hit never touches the router.
    for id in &chain {
        let key = inner.cache.key(&normalized, id.model.as_str());
        if let Some(entry) = inner.cache.get(&key) {
            return Ok(RouteOutcome {
                endpoint: id.clone(),
                response: entry.value,
                decision_id: None,
                from_cache: true,
            });
        }
    }

    // Concurrent misses for the same normalized prompt coalesce onto one
    // route + execute; every waiter gets a clone of the same outcome.
    let flight_key = inner.cache.key(&normalized, plan.workload.as_str());
    let deadline = plan.deadline;
    let ttl = request.cache.ttl;
    let flight_inner = Arc::clone(&inner);
    let leader = inner.flight.run(flight_key, move || {
        route_and_execute(
            flight_inner,
            catalog,
            plan,
            Some(CachePut { normalized, ttl }),
        )
    });

    match tokio::time::timeout_at(deadline, leader).await {
        Err(_elapsed) => Err(RouteError::Cancelled),
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(FlightError::Compute(error))) => Err(error),
        Ok(Err(FlightError::LeaderGone)) => Err(RouteError::Cancelled),
    }
}

async fn route_and_execute(
    inner: Arc<Inner>,
    catalog: Arc<Catalog>,
    plan: ExecPlan,
    cache_put: Option<CachePut>,
) -> Result<RouteOutcome, RouteError> {
    let weights = catalog.weights(plan.strategy, plan.weights);
    let decision = router::decide(
        &inner,
        &catalog,
        &DecideParams {
            workload: plan.workload,
            estimated_tokens: plan.estimated_tokens,
            capabilities: &plan.capabilities,
            strategy: plan.strategy,
            weights,
            session: plan.session.as_deref(),
        },
    )?;
    for sink in &inner.decision_sinks {
        sink.record(&decision);
    }

    let (endpoint, response) = executor::execute(
        &inner,
        &catalog,
        &decision,
        &ExecuteParams {
            history: &plan.history,
            capabilities: plan.capabilities,
            deadline: plan.deadline,
            estimated_tokens: plan.estimated_tokens,
        },
    )
    .await?;

    if let Some(put) = cache_put {
        let key = inner.cache.key(&put.normalized, endpoint.model.as_str());
        inner
            .cache
            .put(key, response.clone(), response.usage, put.ttl);
    }
    if let Some(session) = &plan.session {
        if let Some(served) = catalog.endpoint(&endpoint) {
            inner.sessions.lock().insert(session.clone(), served.tier);
        }
    }

    Ok(RouteOutcome {
        endpoint,
        response,
        decision_id: Some(decision.id.to_string()),
        from_cache: false,
    })
}

fn render_history(turns: &[Turn]) -> String {
    let mut out = String::new();
    for turn in turns {
        let role = match turn.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        out.push_str(role);
        out.push_str(": ");
        out.push_str(&turn.content);
        for call in &turn.tool_calls {
            out.push_str(&format!(" [call {} {}]", call.name, call.arguments));
        }
        out.push('\n');
    }
    out
}

/// Summarizes compacted-away history by routing a `Librarian` request
/// through the core itself. The sub-request is marked so it can never
/// re-enter compaction, and it skips the cache: elided history is unique
/// per conversation.
struct ChainSummarizer {
    inner: Weak<Inner>,
}

#[async_trait]
impl Summarizer for ChainSummarizer {
    async fn summarize(&self, dropped: &[Turn]) -> Result<String, SummarizeError> {
        let inner = self
            .inner
            .upgrade()
            .ok_or_else(|| SummarizeError("router handle dropped".into()))?;

        let request = RouteRequest {
            workload: Workload::Librarian,
            history: vec![
                Turn::system(
                    "Condense the conversation below. Keep decisions, facts, \
                     file names, and open questions. Reply with the summary only.",
                ),
                Turn::user(render_history(dropped)),
            ],
            estimated_tokens: None,
            capabilities: CapabilitySet::empty(),
            strategy: Strategy::CostOptimized,
            weights: None,
            deadline: tokio::time::Instant::now() + Duration::from_secs(15),
            session: None,
            cache: crate::request::CachePolicy {
                enabled: false,
                ttl: None,
                aggressive_normalize: false,
            },
            no_recursive_compact: true,
        };

        match run(inner, request).await {
            Ok(outcome) => Ok(outcome.response.content),
            Err(error) => Err(SummarizeError(error.to_string())),
        }
    }
}
