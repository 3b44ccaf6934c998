use crate::circuit::{AdmitDecision, BreakerState, Circuit, Outcome, Transition};
use crate::config::BreakerConfig;
use crate::events::BreakerEvent;
use hashbrown::HashMap;
use modelmux_core::EndpointId;
use parking_lot::Mutex;
use std::time::Instant;

/// Per-endpoint circuits behind one shared config.
///
/// Circuits are created lazily on first use and start `Closed`.
pub struct BreakerSet {
    config: BreakerConfig,
    circuits: Mutex<HashMap<EndpointId, Circuit>>,
}

impl BreakerSet {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    /// The set's configured name, used in logs and metrics labels.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Admission gate for one attempt. `Proceed` may consume a half-open
    /// probe permit; the permit is released by the matching
    /// [`record`](Self::record).
    pub fn admit(&self, endpoint: &EndpointId) -> AdmitDecision {
        let now = Instant::now();
        let (decision, transition) = {
            let mut circuits = self.circuits.lock();
            let circuit = circuits.entry(endpoint.clone()).or_insert_with(Circuit::new);
            circuit.admit(&self.config, now)
        };

        if let Some(t) = transition {
            self.emit_transition(endpoint, &t);
        }
        match decision {
            AdmitDecision::Proceed => {
                self.config.event_listeners.emit(&BreakerEvent::CallPermitted {
                    endpoint: endpoint.clone(),
                    state: self.state(endpoint),
                });
            }
            AdmitDecision::Reject => {
                self.config.event_listeners.emit(&BreakerEvent::CallRejected {
                    endpoint: endpoint.clone(),
                });

                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "modelmux_breaker_rejections_total",
                    "breaker" => self.config.name.clone(),
                    "endpoint" => endpoint.to_string()
                )
                .increment(1);
            }
        }
        decision
    }

    /// Non-consuming admission check, used by the router's filter step so
    /// that ranking does not burn half-open probe permits.
    pub fn admittable(&self, endpoint: &EndpointId) -> bool {
        let now = Instant::now();
        let circuits = self.circuits.lock();
        circuits
            .get(endpoint)
            .map(|c| c.admittable(&self.config, now))
            .unwrap_or(true)
    }

    /// Records the outcome of an admitted attempt.
    pub fn record(&self, endpoint: &EndpointId, outcome: Outcome) {
        let now = Instant::now();
        let transition = {
            let mut circuits = self.circuits.lock();
            let circuit = circuits.entry(endpoint.clone()).or_insert_with(Circuit::new);
            circuit.record(&self.config, outcome, now)
        };

        let state = self.state(endpoint);
        let event = match outcome {
            Outcome::Success => BreakerEvent::SuccessRecorded {
                endpoint: endpoint.clone(),
                state,
            },
            Outcome::Failure | Outcome::Timeout => BreakerEvent::FailureRecorded {
                endpoint: endpoint.clone(),
                state,
            },
        };
        self.config.event_listeners.emit(&event);

        if let Some(t) = transition {
            self.emit_transition(endpoint, &t);
        }
    }

    /// Releases an admitted permit without recording an outcome, for
    /// failures that are not reachability evidence.
    pub fn release(&self, endpoint: &EndpointId) {
        let mut circuits = self.circuits.lock();
        if let Some(circuit) = circuits.get_mut(endpoint) {
            circuit.release();
        }
    }

    /// Current state; endpoints never seen are `Closed`.
    pub fn state(&self, endpoint: &EndpointId) -> BreakerState {
        self.circuits
            .lock()
            .get(endpoint)
            .map(Circuit::state)
            .unwrap_or(BreakerState::Closed)
    }

    /// Forces one circuit open, e.g. from an operator control channel.
    pub fn force_open(&self, endpoint: &EndpointId) {
        let now = Instant::now();
        let transition = {
            let mut circuits = self.circuits.lock();
            let circuit = circuits.entry(endpoint.clone()).or_insert_with(Circuit::new);
            circuit.force_open(now)
        };
        if let Some(t) = transition {
            self.emit_transition(endpoint, &t);
        }
    }

    /// Resets one circuit to `Closed`.
    pub fn reset(&self, endpoint: &EndpointId) {
        let transition = {
            let mut circuits = self.circuits.lock();
            let circuit = circuits.entry(endpoint.clone()).or_insert_with(Circuit::new);
            circuit.reset()
        };
        if let Some(t) = transition {
            self.emit_transition(endpoint, &t);
        }
    }

    fn emit_transition(&self, endpoint: &EndpointId, transition: &Transition) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            endpoint = %endpoint,
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            "breaker state transition"
        );

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "modelmux_breaker_transitions_total",
            "breaker" => self.config.name.clone(),
            "from" => transition.from.as_str(),
            "to" => transition.to.as_str()
        )
        .increment(1);

        self.config
            .event_listeners
            .emit(&BreakerEvent::StateTransition {
                endpoint: endpoint.clone(),
                from: transition.from,
                to: transition.to,
            });
    }
}
