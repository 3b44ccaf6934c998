//! LLM request routing and resilience core.
//!
//! modelmux decides which upstream `(provider, model)` endpoint serves each
//! request, transports it while respecting provider limits, and recovers
//! transparently when an endpoint is rate-limited, capacity-exhausted, or
//! failing. As long as one configured endpoint has capacity and
//! credentials, callers never observe a routable failure.
//!
//! # Architecture
//!
//! The [`Mux`] handle composes the component crates:
//!
//! - `modelmux-credentials` - is a provider usable right now?
//! - `modelmux-capacity` - per-endpoint token/request accounting and
//!   cooldowns driven by rate-limit headers
//! - `modelmux-breaker` - per-endpoint circuit breakers guarding
//!   reachability
//! - `modelmux-limiter` - proactive per-provider token-bucket admission
//! - `modelmux-ledger` - realized cost, budget alerts, spend anomalies
//! - `modelmux-cache` - normalized-prompt response cache with
//!   single-flight coalescing
//! - `modelmux-compactor` - provider-budgeted history compaction
//!
//! This crate adds the router (filter, gate, score, tie-break), the
//! failover executor (one attempt loop over the ranked chain), the
//! provider-adapter seam, and per-attempt observation sinks.
//!
//! # Example
//!
//! ```no_run
//! use modelmux::{Mux, MuxConfig, RouteRequest};
//! use modelmux_core::Workload;
//!
//! # async fn example(config: MuxConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let mux = Mux::builder(config).build()?;
//! // mux.register_adapter("anthropic", my_adapter);
//!
//! let outcome = mux
//!     .route_and_call(
//!         RouteRequest::builder(Workload::Coding)
//!             .prompt("write hello world")
//!             .deadline_in(std::time::Duration::from_secs(10))
//!             .build(),
//!     )
//!     .await?;
//! println!("{} answered: {}", outcome.endpoint, outcome.response.content);
//! # Ok(())
//! # }
//! ```

mod adapter;
mod catalog;
mod decision;
mod error;
mod executor;
mod mux;
mod observe;
mod request;
mod router;
mod score;

pub use adapter::{AdapterError, PoolConfig, ProviderAdapter, ProviderRequest};
pub use catalog::MuxConfig;
pub use decision::{DecisionId, ReasonCode, RoutingDecision};
pub use error::RouteError;
pub use mux::{Mux, MuxBuilder};
pub use observe::{
    AttemptOutcome, DecisionSink, JsonlDecisionLog, JsonlSink, MemorySink, Observation,
    ObservationSink,
};
pub use request::{CachePolicy, RouteOutcome, RouteRequest, RouteRequestBuilder};

pub use modelmux_core as core;
