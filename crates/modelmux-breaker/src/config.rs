use crate::circuit::BreakerState;
use crate::events::BreakerEvent;
use modelmux_core::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration shared by every circuit in a [`BreakerSet`](crate::BreakerSet).
pub struct BreakerConfig {
    pub(crate) failure_threshold: u32,
    pub(crate) timeout_threshold: u32,
    pub(crate) recovery_timeout: Duration,
    pub(crate) half_open_successes: u32,
    pub(crate) half_open_max_calls: u32,
    pub(crate) event_listeners: EventListeners<BreakerEvent>,
    pub(crate) name: String,
}

impl BreakerConfig {
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::new()
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::builder().build_config()
    }
}

/// Builder for [`BreakerConfig`].
pub struct BreakerConfigBuilder {
    failure_threshold: u32,
    timeout_threshold: u32,
    recovery_timeout: Duration,
    half_open_successes: u32,
    half_open_max_calls: u32,
    event_listeners: EventListeners<BreakerEvent>,
    name: String,
}

impl BreakerConfigBuilder {
    /// Defaults: 5 consecutive failures open the circuit, 3 consecutive
    /// timeouts open it, 30 s recovery, 3 half-open successes close it,
    /// 3 concurrent half-open probes.
    pub fn new() -> Self {
        Self {
            failure_threshold: 5,
            timeout_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            half_open_successes: 3,
            half_open_max_calls: 3,
            event_listeners: EventListeners::new(),
            name: String::from("breaker"),
        }
    }

    /// Consecutive transport/fatal failures that open the circuit.
    ///
    /// Default: 5
    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    /// Consecutive deadline expirations that open the circuit.
    ///
    /// Default: 3
    pub fn timeout_threshold(mut self, n: u32) -> Self {
        self.timeout_threshold = n;
        self
    }

    /// How long an open circuit waits before admitting probes.
    ///
    /// Default: 30 seconds
    pub fn recovery_timeout(mut self, d: Duration) -> Self {
        self.recovery_timeout = d;
        self
    }

    /// Consecutive half-open successes required to close.
    ///
    /// Default: 3
    pub fn half_open_successes(mut self, n: u32) -> Self {
        self.half_open_successes = n;
        self
    }

    /// Concurrent probes admitted while half-open; extra attempts are
    /// rejected as though the circuit were open.
    ///
    /// Default: 3
    pub fn half_open_max_calls(mut self, n: u32) -> Self {
        self.half_open_max_calls = n;
        self
    }

    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Register a callback for state transitions.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(BreakerState, BreakerState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &BreakerEvent| {
                if let BreakerEvent::StateTransition { from, to, .. } = event {
                    f(*from, *to);
                }
            }));
        self
    }

    /// Register a callback for rejected calls.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &BreakerEvent| {
                if matches!(event, BreakerEvent::CallRejected { .. }) {
                    f();
                }
            }));
        self
    }

    pub(crate) fn build_config(self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            timeout_threshold: self.timeout_threshold,
            recovery_timeout: self.recovery_timeout,
            half_open_successes: self.half_open_successes,
            half_open_max_calls: self.half_open_max_calls,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }

    /// Builds the config and wraps it in a per-endpoint set.
    pub fn build(self) -> crate::BreakerSet {
        crate::BreakerSet::new(self.build_config())
    }
}

impl Default for BreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
