//! Proactive per-provider admission: a per-minute token bucket and a
//! per-day request counter, refilled lazily on query.
//!
//! [`TokenBucketLimiter::check`] never sleeps. A `Throttle` answer tells the
//! router to prefer another endpoint; it does not mark the provider
//! unhealthy.

mod bucket;

pub use bucket::{
    CheckOutcome, LimiterConfig, LimiterConfigBuilder, ProviderBudget, TokenBucketLimiter,
};
