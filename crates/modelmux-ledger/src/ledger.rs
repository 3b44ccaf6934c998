use crate::events::{AlertLevel, LedgerEvent, SpendWindow};
use hashbrown::{HashMap, HashSet};
use modelmux_core::{EventListeners, FnListener, ProviderId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

const SECS_PER_HOUR: u64 = 3600;
const SECS_PER_DAY: u64 = 86_400;
/// Months are 30-day buckets; calendar precision is not needed for
/// budget alerting.
const DAYS_PER_MONTH: u64 = 30;

/// How many completed hourly samples feed the anomaly baseline.
const BASELINE_HOURS: usize = 24;
/// Minimum samples before anomaly detection engages.
const BASELINE_MIN_SAMPLES: usize = 3;

/// Per-provider spend limits in USD. `None` disables alerting for that
/// window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpendLimits {
    pub hourly_usd: Option<f64>,
    pub daily_usd: Option<f64>,
    pub monthly_usd: Option<f64>,
}

/// Configuration for the cost ledger.
pub struct LedgerConfig {
    pub(crate) limits: HashMap<ProviderId, SpendLimits>,
    pub(crate) event_listeners: EventListeners<LedgerEvent>,
    pub(crate) name: String,
}

impl LedgerConfig {
    pub fn builder() -> LedgerConfigBuilder {
        LedgerConfigBuilder::new()
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::builder().build_config()
    }
}

/// Builder for [`LedgerConfig`].
pub struct LedgerConfigBuilder {
    limits: HashMap<ProviderId, SpendLimits>,
    event_listeners: EventListeners<LedgerEvent>,
    name: String,
}

impl LedgerConfigBuilder {
    pub fn new() -> Self {
        Self {
            limits: HashMap::new(),
            event_listeners: EventListeners::new(),
            name: String::from("ledger"),
        }
    }

    /// Configure spend limits for one provider.
    pub fn limit(mut self, provider: impl Into<ProviderId>, limits: SpendLimits) -> Self {
        self.limits.insert(provider.into(), limits);
        self
    }

    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Register a callback for budget alerts.
    pub fn on_alert<F>(mut self, f: F) -> Self
    where
        F: Fn(&ProviderId, SpendWindow, AlertLevel) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &LedgerEvent| {
                if let LedgerEvent::Alert {
                    provider,
                    window,
                    level,
                    ..
                } = event
                {
                    f(provider, *window, *level);
                }
            }));
        self
    }

    /// Register a callback for spend anomalies.
    pub fn on_anomaly<F>(mut self, f: F) -> Self
    where
        F: Fn(&ProviderId, f64) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &LedgerEvent| {
                if let LedgerEvent::Anomaly {
                    provider, spend_usd, ..
                } = event
                {
                    f(provider, *spend_usd);
                }
            }));
        self
    }

    pub(crate) fn build_config(self) -> LedgerConfig {
        LedgerConfig {
            limits: self.limits,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }

    pub fn build(self) -> CostLedger {
        CostLedger::new(self.build_config())
    }
}

impl Default for LedgerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct ProviderSpend {
    hour_bucket: u64,
    hour_spend: f64,
    day_bucket: u64,
    day_spend: f64,
    month_bucket: u64,
    month_spend: f64,
    fired: HashSet<(SpendWindow, AlertLevel)>,
    /// Completed hourly spends, newest at the back, capped at
    /// [`BASELINE_HOURS`].
    hourly_history: VecDeque<f64>,
    records: u64,
}

impl ProviderSpend {
    fn new(epoch_s: u64) -> Self {
        Self {
            hour_bucket: epoch_s / SECS_PER_HOUR,
            hour_spend: 0.0,
            day_bucket: epoch_s / SECS_PER_DAY,
            day_spend: 0.0,
            month_bucket: epoch_s / SECS_PER_DAY / DAYS_PER_MONTH,
            month_spend: 0.0,
            fired: HashSet::new(),
            hourly_history: VecDeque::new(),
            records: 0,
        }
    }
}

/// Realized-cost accounting per provider.
pub struct CostLedger {
    config: LedgerConfig,
    spends: Mutex<HashMap<ProviderId, ProviderSpend>>,
}

impl CostLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            spends: Mutex::new(HashMap::new()),
        }
    }

    /// The ledger's configured name, used in logs and metrics labels.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Records realized spend at the current wall-clock time.
    pub fn record(&self, provider: &ProviderId, cost_usd: f64) {
        let epoch_s = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.record_at(provider, cost_usd, epoch_s);
    }

    /// Records realized spend at an explicit epoch timestamp.
    pub fn record_at(&self, provider: &ProviderId, cost_usd: f64, epoch_s: u64) {
        let mut emitted = Vec::new();
        {
            let mut spends = self.spends.lock();
            let entry = spends
                .entry(provider.clone())
                .or_insert_with(|| ProviderSpend::new(epoch_s));

            roll_windows(provider, entry, epoch_s, &mut emitted);

            entry.hour_spend += cost_usd;
            entry.day_spend += cost_usd;
            entry.month_spend += cost_usd;
            entry.records += 1;

            #[cfg(feature = "metrics")]
            metrics::gauge!(
                "modelmux_ledger_hour_spend_usd",
                "ledger" => self.config.name.clone(),
                "provider" => provider.to_string()
            )
            .set(entry.hour_spend);

            if let Some(limits) = self.config.limits.get(provider) {
                check_alerts(provider, entry, limits, &mut emitted);
            }
        }

        for event in &emitted {
            #[cfg(feature = "tracing")]
            if let LedgerEvent::Alert {
                provider,
                window,
                level,
                spend_usd,
                limit_usd,
            } = event
            {
                tracing::warn!(
                    provider = %provider,
                    window = window.as_str(),
                    threshold = level.threshold(),
                    spend_usd,
                    limit_usd,
                    "spend alert"
                );
            }
            self.config.event_listeners.emit(event);
        }
    }

    /// Spend in the provider's current window, as of the last record.
    pub fn spend(&self, provider: &ProviderId, window: SpendWindow) -> f64 {
        self.spends
            .lock()
            .get(provider)
            .map(|entry| match window {
                SpendWindow::Hour => entry.hour_spend,
                SpendWindow::Day => entry.day_spend,
                SpendWindow::Month => entry.month_spend,
            })
            .unwrap_or(0.0)
    }

    /// Number of records accepted for a provider.
    pub fn record_count(&self, provider: &ProviderId) -> u64 {
        self.spends
            .lock()
            .get(provider)
            .map(|entry| entry.records)
            .unwrap_or(0)
    }
}

fn roll_windows(
    provider: &ProviderId,
    entry: &mut ProviderSpend,
    epoch_s: u64,
    emitted: &mut Vec<LedgerEvent>,
) {
    let hour = epoch_s / SECS_PER_HOUR;
    let day = epoch_s / SECS_PER_DAY;
    let month = day / DAYS_PER_MONTH;

    if hour != entry.hour_bucket {
        let completed = entry.hour_spend;
        if let Some(anomaly) = baseline_anomaly(provider, &entry.hourly_history, completed) {
            emitted.push(anomaly);
        }
        entry.hourly_history.push_back(completed);
        // Hours with no traffic contribute zero samples.
        let gap = hour.saturating_sub(entry.hour_bucket).saturating_sub(1);
        for _ in 0..gap.min(BASELINE_HOURS as u64) {
            entry.hourly_history.push_back(0.0);
        }
        while entry.hourly_history.len() > BASELINE_HOURS {
            entry.hourly_history.pop_front();
        }
        entry.hour_bucket = hour;
        entry.hour_spend = 0.0;
        entry.fired.retain(|(w, _)| *w != SpendWindow::Hour);
    }
    if day != entry.day_bucket {
        entry.day_bucket = day;
        entry.day_spend = 0.0;
        entry.fired.retain(|(w, _)| *w != SpendWindow::Day);
    }
    if month != entry.month_bucket {
        entry.month_bucket = month;
        entry.month_spend = 0.0;
        entry.fired.retain(|(w, _)| *w != SpendWindow::Month);
    }
}

fn baseline_anomaly(
    provider: &ProviderId,
    history: &VecDeque<f64>,
    completed_hour: f64,
) -> Option<LedgerEvent> {
    if history.len() < BASELINE_MIN_SAMPLES {
        return None;
    }
    let n = history.len() as f64;
    let mean = history.iter().sum::<f64>() / n;
    let variance = history.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    if completed_hour > mean + 3.0 * stddev {
        Some(LedgerEvent::Anomaly {
            provider: provider.clone(),
            spend_usd: completed_hour,
            baseline_mean: mean,
            baseline_stddev: stddev,
        })
    } else {
        None
    }
}

fn check_alerts(
    provider: &ProviderId,
    entry: &mut ProviderSpend,
    limits: &SpendLimits,
    emitted: &mut Vec<LedgerEvent>,
) {
    let windows = [
        (SpendWindow::Hour, entry.hour_spend, limits.hourly_usd),
        (SpendWindow::Day, entry.day_spend, limits.daily_usd),
        (SpendWindow::Month, entry.month_spend, limits.monthly_usd),
    ];
    for (window, spend, limit) in windows {
        let Some(limit) = limit else { continue };
        for level in AlertLevel::ASCENDING {
            if spend >= level.threshold() * limit && entry.fired.insert((window, level)) {
                emitted.push(LedgerEvent::Alert {
                    provider: provider.clone(),
                    window,
                    level,
                    spend_usd: spend,
                    limit_usd: limit,
                });
            }
        }
    }
}
