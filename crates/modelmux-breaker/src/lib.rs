//! Circuit breakers guarding endpoint *reachability*.
//!
//! One three-state circuit per endpoint: `Closed` admits everything, `Open`
//! rejects until a recovery timeout has elapsed, `HalfOpen` admits a bounded
//! number of concurrent probes and closes again after enough consecutive
//! probe successes.
//!
//! The breaker trips on consecutive transport/fatal failures. Rate limits
//! never open it - capacity guards *allowance*, the breaker guards
//! reachability. Client-side deadline expirations are recorded separately:
//! they keep their own consecutive counter with its own (higher) threshold
//! so a slow caller does not blacken an otherwise healthy endpoint.

mod circuit;
mod config;
mod events;
mod set;

pub use circuit::{AdmitDecision, BreakerState, Outcome};
pub use config::{BreakerConfig, BreakerConfigBuilder};
pub use events::BreakerEvent;
pub use set::BreakerSet;
