//! Capacity registry: per-endpoint token/request accounting.
//!
//! The registry turns provider rate-limit headers (or, absent headers,
//! nominal ceilings debited by consumed tokens) into a derived
//! [`CapacityStatus`](modelmux_core::CapacityStatus). Rate-limit responses
//! place the endpoint - and its provider, on the shared-quota presumption -
//! into an exponentially growing cooldown. The router consults
//! [`CapacityRegistry::prefer_switch`] to step past degraded endpoints before
//! a failure ever occurs.

mod events;
mod headers;
mod registry;

pub use events::CapacityEvent;
pub use headers::RateLimitHeaders;
pub use registry::{
    CapacityConfig, CapacityConfigBuilder, CapacityRegistry, CapacitySnapshot, CooldownPolicy,
};
