//! Response cache keyed by normalized prompts.
//!
//! Prompts are normalized (whitespace collapsed, boilerplate stripped,
//! selectively lowercased) and hashed together with the serving model id
//! into a [`CacheKey`]. Entries expire by TTL first and by LRU pressure
//! second. Concurrent misses for the same key coalesce onto one in-flight
//! computation through [`SingleFlight`]: all waiters receive the leader's
//! result and exactly one insert happens.

mod cache;
mod events;
mod flight;
mod key;
mod normalize;
mod store;

pub use cache::{CacheConfig, CacheConfigBuilder, CacheEntry, ResponseCache};
pub use events::CacheEvent;
pub use flight::{FlightError, SingleFlight};
pub use key::CacheKey;
pub use normalize::{NormalizeMode, Normalizer};
