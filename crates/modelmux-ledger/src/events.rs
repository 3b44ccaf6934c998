use modelmux_core::{CoreEvent, ProviderId};

/// Accounting window granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpendWindow {
    Hour,
    Day,
    Month,
}

impl SpendWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            SpendWindow::Hour => "hour",
            SpendWindow::Day => "day",
            SpendWindow::Month => "month",
        }
    }
}

/// Alert severity, as a fraction of the configured limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlertLevel {
    Half,
    ThreeQuarters,
    Ninety,
    Full,
}

impl AlertLevel {
    pub const ASCENDING: [AlertLevel; 4] = [
        AlertLevel::Half,
        AlertLevel::ThreeQuarters,
        AlertLevel::Ninety,
        AlertLevel::Full,
    ];

    /// The fraction of the limit at which this level fires.
    pub fn threshold(self) -> f64 {
        match self {
            AlertLevel::Half => 0.50,
            AlertLevel::ThreeQuarters => 0.75,
            AlertLevel::Ninety => 0.90,
            AlertLevel::Full => 1.00,
        }
    }
}

/// Events emitted by the cost ledger.
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    /// Spend crossed an alert threshold for a configured limit. Fires at
    /// most once per (provider, window, level) until the window rolls.
    Alert {
        provider: ProviderId,
        window: SpendWindow,
        level: AlertLevel,
        spend_usd: f64,
        limit_usd: f64,
    },
    /// A completed hour's spend exceeded the rolling baseline by more than
    /// three standard deviations.
    Anomaly {
        provider: ProviderId,
        spend_usd: f64,
        baseline_mean: f64,
        baseline_stddev: f64,
    },
}

impl CoreEvent for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::Alert { .. } => "alert",
            LedgerEvent::Anomaly { .. } => "anomaly",
        }
    }

    fn component(&self) -> &str {
        "ledger"
    }
}
