use crate::events::CacheEvent;
use crate::key::CacheKey;
use crate::normalize::{NormalizeMode, Normalizer};
use crate::store::{Lookup, TtlLruStore};
use modelmux_core::{EventListeners, FnListener, TokenUsage};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Configuration for [`ResponseCache`].
pub struct CacheConfig {
    pub(crate) max_entries: usize,
    pub(crate) default_ttl: Duration,
    pub(crate) boilerplate_prefix: Option<String>,
    pub(crate) event_listeners: EventListeners<CacheEvent>,
    pub(crate) name: String,
}

impl CacheConfig {
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::new()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::builder().build_config()
    }
}

/// Builder for [`CacheConfig`].
pub struct CacheConfigBuilder {
    max_entries: usize,
    default_ttl: Duration,
    boilerplate_prefix: Option<String>,
    event_listeners: EventListeners<CacheEvent>,
    name: String,
}

impl CacheConfigBuilder {
    /// Defaults: 1024 entries, 5 minute TTL, no boilerplate prefix.
    pub fn new() -> Self {
        Self {
            max_entries: 1024,
            default_ttl: Duration::from_secs(300),
            boilerplate_prefix: None,
            event_listeners: EventListeners::new(),
            name: String::from("cache"),
        }
    }

    /// LRU capacity.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// TTL applied when a `put` does not carry its own.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Instruction boilerplate stripped during normalization.
    pub fn boilerplate_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.boilerplate_prefix = Some(prefix.into());
        self
    }

    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Register a callback for cache hits.
    pub fn on_hit<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CacheEvent| {
                if let CacheEvent::Hit { key } = event {
                    f(key);
                }
            }));
        self
    }

    pub(crate) fn build_config(self) -> CacheConfig {
        CacheConfig {
            max_entries: self.max_entries,
            default_ttl: self.default_ttl,
            boilerplate_prefix: self.boilerplate_prefix,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }

    pub fn build<V: Clone>(self) -> ResponseCache<V> {
        ResponseCache::new(self.build_config())
    }
}

impl Default for CacheConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A read-out cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub usage: TokenUsage,
    /// How many reads this entry has served.
    pub access_count: u64,
}

/// Normalized-prompt response cache: TTL first, LRU second.
pub struct ResponseCache<V: Clone> {
    config: CacheConfig,
    normalizer: Normalizer,
    store: Mutex<TtlLruStore<V>>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        let mut normalizer = Normalizer::new();
        if let Some(prefix) = &config.boilerplate_prefix {
            normalizer = normalizer.with_boilerplate_prefix(prefix.clone());
        }
        let store = TtlLruStore::new(config.max_entries);
        Self {
            config,
            normalizer,
            store: Mutex::new(store),
        }
    }

    /// The cache's configured name, used in logs and metrics labels.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Normalizes a prompt for keying. Aggressive mode is opt-in per call.
    pub fn normalize(&self, prompt: &str, mode: NormalizeMode) -> String {
        self.normalizer.normalize(prompt, mode)
    }

    /// Key for a normalized prompt under a scope (usually the model id).
    pub fn key(&self, normalized: &str, scope: &str) -> CacheKey {
        CacheKey::compute(normalized, scope)
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        let lookup = self.store.lock().get(key, Instant::now());
        match lookup {
            Lookup::Hit(value, usage, access_count) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(cache = %self.config.name, key = %key, "cache hit");

                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "modelmux_cache_hits_total",
                    "cache" => self.config.name.clone()
                )
                .increment(1);

                self.config.event_listeners.emit(&CacheEvent::Hit {
                    key: key.to_string(),
                });
                Some(CacheEntry {
                    value,
                    usage,
                    access_count,
                })
            }
            Lookup::Expired => {
                self.config.event_listeners.emit(&CacheEvent::Expired {
                    key: key.to_string(),
                });
                self.emit_miss(key);
                None
            }
            Lookup::Miss => {
                self.emit_miss(key);
                None
            }
        }
    }

    /// Inserts a value. Each key maps to at most one entry; re-putting a
    /// key replaces it.
    pub fn put(&self, key: CacheKey, value: V, usage: TokenUsage, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let evicted = self
            .store
            .lock()
            .insert(key.clone(), value, usage, ttl, Instant::now());

        if evicted {
            #[cfg(feature = "metrics")]
            metrics::counter!(
                "modelmux_cache_evictions_total",
                "cache" => self.config.name.clone()
            )
            .increment(1);

            self.config.event_listeners.emit(&CacheEvent::Evicted {
                key: key.to_string(),
            });
        }
        self.config.event_listeners.emit(&CacheEvent::Inserted {
            key: key.to_string(),
        });
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.store.lock().clear();
    }

    fn emit_miss(&self, key: &CacheKey) {
        #[cfg(feature = "metrics")]
        metrics::counter!(
            "modelmux_cache_misses_total",
            "cache" => self.config.name.clone()
        )
        .increment(1);

        self.config.event_listeners.emit(&CacheEvent::Miss {
            key: key.to_string(),
        });
    }
}
