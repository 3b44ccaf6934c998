use crate::events::CapacityEvent;
use crate::headers::RateLimitHeaders;
use hashbrown::HashMap;
use modelmux_core::{
    CapacityStatus, Endpoint, EndpointId, EventListeners, FnListener, ProviderId,
};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// How a rate-limited endpoint cools down.
///
/// A registry uses exactly one policy; the two forms are never mixed on a
/// single endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownPolicy {
    /// `base * 2^(n-1)` for the n-th consecutive rate limit, capped.
    Exponential { base: Duration, cap: Duration },
    /// The same fixed duration every time.
    Flat(Duration),
}

impl CooldownPolicy {
    pub(crate) fn duration_for(&self, consecutive: u32) -> Duration {
        match *self {
            CooldownPolicy::Exponential { base, cap } => {
                let multiplier = 2u32.saturating_pow(consecutive.saturating_sub(1));
                base.checked_mul(multiplier).unwrap_or(cap).min(cap)
            }
            CooldownPolicy::Flat(d) => d,
        }
    }
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        CooldownPolicy::Exponential {
            base: Duration::from_secs(60),
            cap: Duration::from_secs(600),
        }
    }
}

/// Configuration for the capacity registry.
pub struct CapacityConfig {
    pub(crate) window: Duration,
    pub(crate) cooldown: CooldownPolicy,
    pub(crate) event_listeners: EventListeners<CapacityEvent>,
    pub(crate) name: String,
}

impl CapacityConfig {
    pub fn builder() -> CapacityConfigBuilder {
        CapacityConfigBuilder::new()
    }
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self::builder().build_config()
    }
}

/// Builder for [`CapacityConfig`].
pub struct CapacityConfigBuilder {
    window: Duration,
    cooldown: CooldownPolicy,
    event_listeners: EventListeners<CapacityEvent>,
    name: String,
}

impl CapacityConfigBuilder {
    /// Defaults: 60 s accounting window, exponential 60 s - 600 s cooldown.
    pub fn new() -> Self {
        Self {
            window: Duration::from_secs(60),
            cooldown: CooldownPolicy::default(),
            event_listeners: EventListeners::new(),
            name: String::from("capacity"),
        }
    }

    /// Length of the accounting window used when a provider does not say.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn cooldown_policy(mut self, policy: CooldownPolicy) -> Self {
        self.cooldown = policy;
        self
    }

    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Register a callback for cooldown entry.
    pub fn on_cooldown_entered<F>(mut self, f: F) -> Self
    where
        F: Fn(&EndpointId, Duration) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CapacityEvent| {
                if let CapacityEvent::CooldownEntered {
                    endpoint, duration, ..
                } = event
                {
                    f(endpoint, *duration);
                }
            }));
        self
    }

    /// Register a callback for status changes.
    pub fn on_status_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(&EndpointId, CapacityStatus, CapacityStatus) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CapacityEvent| {
                if let CapacityEvent::StatusChanged { endpoint, from, to } = event {
                    f(endpoint, *from, *to);
                }
            }));
        self
    }

    pub(crate) fn build_config(self) -> CapacityConfig {
        CapacityConfig {
            window: self.window,
            cooldown: self.cooldown,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }

    pub fn build(self) -> CapacityRegistry {
        CapacityRegistry::new(self.build_config())
    }
}

impl Default for CapacityConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time capacity accounting for one endpoint.
#[derive(Debug, Clone)]
pub struct CapacitySnapshot {
    pub tokens_limit: u64,
    pub tokens_remaining: u64,
    pub requests_limit: u64,
    pub requests_remaining: u64,
    pub window_resets_at: Instant,
    pub last_observed_at: Option<Instant>,
    pub consecutive_429s: u32,
    pub cooldown_until: Option<Instant>,
}

impl CapacitySnapshot {
    fn fresh(now: Instant, window: Duration) -> Self {
        Self {
            tokens_limit: 0,
            tokens_remaining: 0,
            requests_limit: 0,
            requests_remaining: 0,
            window_resets_at: now + window,
            last_observed_at: None,
            consecutive_429s: 0,
            cooldown_until: None,
        }
    }

    fn usage_fraction(&self) -> f64 {
        fn frac(remaining: u64, limit: u64) -> f64 {
            if limit == 0 {
                0.0
            } else {
                1.0 - remaining as f64 / limit as f64
            }
        }
        frac(self.tokens_remaining, self.tokens_limit)
            .max(frac(self.requests_remaining, self.requests_limit))
    }

    /// Pure projection from the snapshot to a derived status.
    pub fn status_at(&self, now: Instant) -> CapacityStatus {
        if let Some(until) = self.cooldown_until {
            if now < until {
                return CapacityStatus::Cooldown;
            }
        }
        let usage = self.usage_fraction();
        if usage < 0.50 {
            CapacityStatus::Available
        } else if usage < 0.80 {
            CapacityStatus::Approaching
        } else if usage < 0.95 {
            CapacityStatus::Low
        } else {
            CapacityStatus::Exhausted
        }
    }
}

/// Per-endpoint capacity accounting, shared across concurrent requests.
pub struct CapacityRegistry {
    config: CapacityConfig,
    snapshots: Mutex<HashMap<EndpointId, CapacitySnapshot>>,
    provider_cooldowns: Mutex<HashMap<ProviderId, Instant>>,
}

impl CapacityRegistry {
    pub fn new(config: CapacityConfig) -> Self {
        Self {
            config,
            snapshots: Mutex::new(HashMap::new()),
            provider_cooldowns: Mutex::new(HashMap::new()),
        }
    }

    /// The registry's configured name, used in logs and metrics labels.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Seeds nominal ceilings from an endpoint's declared budgets.
    pub fn declare(&self, endpoint: &Endpoint) {
        let now = Instant::now();
        let mut snapshots = self.snapshots.lock();
        let entry = snapshots
            .entry(endpoint.id.clone())
            .or_insert_with(|| CapacitySnapshot::fresh(now, self.config.window));
        entry.tokens_limit = endpoint.tokens_per_minute;
        entry.tokens_remaining = endpoint.tokens_per_minute;
        entry.requests_limit = endpoint.requests_per_day;
        entry.requests_remaining = endpoint.requests_per_day;
    }

    /// Derived status; endpoints never observed are `Available`.
    pub fn status(&self, endpoint: &EndpointId) -> CapacityStatus {
        let now = Instant::now();
        self.snapshots
            .lock()
            .get(endpoint)
            .map(|s| s.status_at(now))
            .unwrap_or(CapacityStatus::Available)
    }

    /// Clone of the raw snapshot, if the endpoint has one.
    pub fn snapshot(&self, endpoint: &EndpointId) -> Option<CapacitySnapshot> {
        self.snapshots.lock().get(endpoint).cloned()
    }

    /// True when the router should step past this endpoint proactively.
    pub fn prefer_switch(&self, endpoint: &EndpointId) -> bool {
        self.status(endpoint).prefers_switch()
    }

    /// Records a successful response: clears the 429 run and updates
    /// counters from headers when present, otherwise debits nominal
    /// ceilings by the consumed tokens.
    pub fn observe_response(
        &self,
        endpoint: &EndpointId,
        headers: &RateLimitHeaders,
        input_tokens: u32,
        output_tokens: u32,
    ) {
        let now = Instant::now();
        let mut emitted = Vec::new();
        {
            let mut snapshots = self.snapshots.lock();
            let entry = snapshots
                .entry(endpoint.clone())
                .or_insert_with(|| CapacitySnapshot::fresh(now, self.config.window));
            let before = entry.status_at(now);

            if entry.cooldown_until.is_some() {
                emitted.push(CapacityEvent::CooldownCleared {
                    endpoint: endpoint.clone(),
                });
            }
            entry.consecutive_429s = 0;
            entry.cooldown_until = None;

            if headers.is_empty() {
                let consumed = u64::from(input_tokens) + u64::from(output_tokens);
                entry.tokens_remaining = entry.tokens_remaining.saturating_sub(consumed);
                entry.requests_remaining = entry.requests_remaining.saturating_sub(1);
            } else {
                if let Some(remaining) = headers.tokens_remaining {
                    entry.tokens_remaining = remaining;
                }
                if let Some(limit) = headers.tokens_limit {
                    entry.tokens_limit = limit;
                }
                if let Some(remaining) = headers.requests_remaining {
                    entry.requests_remaining = remaining;
                }
                if let Some(limit) = headers.requests_limit {
                    entry.requests_limit = limit;
                }
                if let Some(reset) = headers.reset_after {
                    entry.window_resets_at = now + reset;
                }
            }
            entry.last_observed_at = Some(now);

            let after = entry.status_at(now);
            if before != after {
                emitted.push(CapacityEvent::StatusChanged {
                    endpoint: endpoint.clone(),
                    from: before,
                    to: after,
                });
            }
        }
        self.provider_cooldowns.lock().remove(&endpoint.provider);
        for event in &emitted {
            self.config.event_listeners.emit(event);
        }
    }

    /// Records a rate-limit response: grows the 429 run and pushes the
    /// endpoint (and its provider) into cooldown. `cooldown_until` never
    /// moves backwards within a run.
    pub fn observe_rate_limit(&self, endpoint: &EndpointId) {
        let now = Instant::now();
        let event;
        {
            let mut snapshots = self.snapshots.lock();
            let entry = snapshots
                .entry(endpoint.clone())
                .or_insert_with(|| CapacitySnapshot::fresh(now, self.config.window));
            entry.consecutive_429s += 1;
            let duration = self.config.cooldown.duration_for(entry.consecutive_429s);
            let candidate = now + duration;
            entry.cooldown_until = Some(match entry.cooldown_until {
                Some(existing) => existing.max(candidate),
                None => candidate,
            });
            entry.last_observed_at = Some(now);

            let until = entry.cooldown_until.unwrap_or(candidate);
            let mut providers = self.provider_cooldowns.lock();
            let slot = providers.entry(endpoint.provider.clone()).or_insert(until);
            *slot = (*slot).max(until);

            event = CapacityEvent::CooldownEntered {
                endpoint: endpoint.clone(),
                consecutive_429s: entry.consecutive_429s,
                duration,
            };

            #[cfg(feature = "tracing")]
            tracing::warn!(
                endpoint = %endpoint,
                consecutive_429s = entry.consecutive_429s,
                cooldown_s = duration.as_secs_f64(),
                "endpoint rate limited, entering cooldown"
            );

            #[cfg(feature = "metrics")]
            metrics::counter!(
                "modelmux_capacity_cooldowns_total",
                "registry" => self.config.name.clone(),
                "endpoint" => endpoint.to_string()
            )
            .increment(1);
        }
        self.config.event_listeners.emit(&event);
    }

    /// Advances windows whose reset time has passed and clears elapsed
    /// cooldowns.
    pub fn tick(&self, now: Instant) {
        let mut emitted = Vec::new();
        {
            let mut snapshots = self.snapshots.lock();
            for (id, entry) in snapshots.iter_mut() {
                if entry.window_resets_at <= now {
                    entry.tokens_remaining = entry.tokens_limit;
                    entry.requests_remaining = entry.requests_limit;
                    entry.window_resets_at = now + self.config.window;
                    emitted.push(CapacityEvent::WindowRolled {
                        endpoint: id.clone(),
                    });
                }
                if let Some(until) = entry.cooldown_until {
                    if until <= now {
                        entry.cooldown_until = None;
                        emitted.push(CapacityEvent::CooldownCleared {
                            endpoint: id.clone(),
                        });
                    }
                }
            }
        }
        self.provider_cooldowns.lock().retain(|_, until| *until > now);
        for event in &emitted {
            self.config.event_listeners.emit(event);
        }
    }

    /// Cooldown deadline for a provider, if one is still in the future.
    ///
    /// Set whenever any endpoint of the provider is rate limited, on the
    /// presumption that sibling models share the provider's quota.
    pub fn provider_cooldown_until(&self, provider: &ProviderId) -> Option<Instant> {
        let now = Instant::now();
        self.provider_cooldowns
            .lock()
            .get(provider)
            .copied()
            .filter(|until| *until > now)
    }

    /// Earliest future instant at which some degraded endpoint expects
    /// relief, for `NoRoute` reporting.
    pub fn earliest_relief(&self) -> Option<Instant> {
        let now = Instant::now();
        let snapshots = self.snapshots.lock();
        snapshots
            .values()
            .flat_map(|entry| {
                let mut points = Vec::new();
                if let Some(until) = entry.cooldown_until {
                    if until > now {
                        points.push(until);
                    }
                }
                if entry.status_at(now) != CapacityStatus::Available
                    && entry.window_resets_at > now
                {
                    points.push(entry.window_resets_at);
                }
                points
            })
            .min()
    }
}
