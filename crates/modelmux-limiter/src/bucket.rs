use hashbrown::HashMap;
use modelmux_core::ProviderId;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Declared per-provider budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderBudget {
    pub tokens_per_minute: u64,
    pub requests_per_day: u64,
}

/// Outcome of a proactive admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Allow,
    /// The estimate does not fit the current window; `retry_after` is the
    /// time until the binding window rolls.
    Throttle { retry_after: Duration },
}

impl CheckOutcome {
    pub fn is_allow(&self) -> bool {
        matches!(self, CheckOutcome::Allow)
    }
}

/// Configuration for the limiter.
pub struct LimiterConfig {
    pub(crate) minute_window: Duration,
    pub(crate) day_window: Duration,
    pub(crate) name: String,
}

impl LimiterConfig {
    pub fn builder() -> LimiterConfigBuilder {
        LimiterConfigBuilder::new()
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self::builder().build_config()
    }
}

/// Builder for [`LimiterConfig`].
pub struct LimiterConfigBuilder {
    minute_window: Duration,
    day_window: Duration,
    name: String,
}

impl LimiterConfigBuilder {
    /// Defaults: 60 s token window, 24 h request window.
    pub fn new() -> Self {
        Self {
            minute_window: Duration::from_secs(60),
            day_window: Duration::from_secs(24 * 60 * 60),
            name: String::from("limiter"),
        }
    }

    /// Length of the token window.
    pub fn minute_window(mut self, d: Duration) -> Self {
        self.minute_window = d;
        self
    }

    /// Length of the request window.
    pub fn day_window(mut self, d: Duration) -> Self {
        self.day_window = d;
        self
    }

    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    pub(crate) fn build_config(self) -> LimiterConfig {
        LimiterConfig {
            minute_window: self.minute_window,
            day_window: self.day_window,
            name: self.name,
        }
    }

    pub fn build(self) -> TokenBucketLimiter {
        TokenBucketLimiter::new(self.build_config())
    }
}

impl Default for LimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct Bucket {
    tokens_in_window: u64,
    window_started_at: Instant,
    requests_today: u64,
    day_started_at: Instant,
}

impl Bucket {
    fn new(now: Instant) -> Self {
        Self {
            tokens_in_window: 0,
            window_started_at: now,
            requests_today: 0,
            day_started_at: now,
        }
    }

    fn refill(&mut self, config: &LimiterConfig, now: Instant) {
        if now.duration_since(self.window_started_at) >= config.minute_window {
            self.tokens_in_window = 0;
            self.window_started_at = now;
        }
        if now.duration_since(self.day_started_at) >= config.day_window {
            self.requests_today = 0;
            self.day_started_at = now;
        }
    }
}

/// Per-provider admission over declared budgets.
///
/// Providers without a configured budget are unlimited.
pub struct TokenBucketLimiter {
    config: LimiterConfig,
    budgets: RwLock<HashMap<ProviderId, ProviderBudget>>,
    buckets: Mutex<HashMap<ProviderId, Bucket>>,
}

impl TokenBucketLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            budgets: RwLock::new(HashMap::new()),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// The limiter's configured name, used in logs and metrics labels.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Installs (or replaces) the budget for a provider.
    pub fn set_budget(&self, provider: ProviderId, budget: ProviderBudget) {
        self.budgets.write().insert(provider, budget);
    }

    /// Replaces all budgets, for atomic reconfiguration.
    pub fn replace_budgets(&self, budgets: impl IntoIterator<Item = (ProviderId, ProviderBudget)>) {
        *self.budgets.write() = budgets.into_iter().collect();
    }

    /// Proactive admission: does `estimated_tokens` fit the provider's
    /// current windows? Never sleeps.
    pub fn check(&self, provider: &ProviderId, estimated_tokens: u32) -> CheckOutcome {
        let budget = match self.budgets.read().get(provider) {
            Some(budget) => *budget,
            None => return CheckOutcome::Allow,
        };

        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(provider.clone())
            .or_insert_with(|| Bucket::new(now));
        bucket.refill(&self.config, now);

        let mut retry_after = Duration::ZERO;
        if bucket.tokens_in_window + u64::from(estimated_tokens) > budget.tokens_per_minute {
            retry_after = retry_after.max(
                self.config
                    .minute_window
                    .saturating_sub(now.duration_since(bucket.window_started_at)),
            );
        }
        if bucket.requests_today + 1 > budget.requests_per_day {
            retry_after = retry_after.max(
                self.config
                    .day_window
                    .saturating_sub(now.duration_since(bucket.day_started_at)),
            );
        }

        if retry_after.is_zero() {
            CheckOutcome::Allow
        } else {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                provider = %provider,
                estimated_tokens,
                retry_after_s = retry_after.as_secs_f64(),
                "limiter throttled"
            );

            #[cfg(feature = "metrics")]
            metrics::counter!(
                "modelmux_limiter_throttles_total",
                "limiter" => self.config.name.clone(),
                "provider" => provider.to_string()
            )
            .increment(1);

            CheckOutcome::Throttle { retry_after }
        }
    }

    /// Debits realized usage from the provider's windows.
    pub fn record(&self, provider: &ProviderId, input_tokens: u32, output_tokens: u32) {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(provider.clone())
            .or_insert_with(|| Bucket::new(now));
        bucket.refill(&self.config, now);
        bucket.tokens_in_window += u64::from(input_tokens) + u64::from(output_tokens);
        bucket.requests_today += 1;
    }

    /// Tokens already consumed in the current window, for observability.
    pub fn tokens_in_window(&self, provider: &ProviderId) -> u64 {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        match buckets.get_mut(provider) {
            Some(bucket) => {
                bucket.refill(&self.config, now);
                bucket.tokens_in_window
            }
            None => 0,
        }
    }
}
