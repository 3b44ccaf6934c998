use crate::config::BreakerConfig;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Reachability state of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Calls are admitted.
    Closed,
    /// Calls are rejected until the recovery timeout elapses.
    Open,
    /// A bounded number of probes is admitted.
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// What the caller observed for one admitted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// A transport or fatal failure.
    Failure,
    /// The caller's deadline expired before the endpoint answered.
    Timeout,
}

/// Whether an attempt may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitDecision {
    Proceed,
    Reject,
}

/// One endpoint's circuit. Owned by a [`BreakerSet`](crate::BreakerSet);
/// all methods are called under the set's lock.
#[derive(Debug)]
pub(crate) struct Circuit {
    state: BreakerState,
    opened_at: Option<Instant>,
    consecutive_failures: u32,
    consecutive_timeouts: u32,
    half_open_successes: u32,
    half_open_in_flight: u32,
}

pub(crate) struct Transition {
    pub from: BreakerState,
    pub to: BreakerState,
}

impl Circuit {
    pub(crate) fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            opened_at: None,
            consecutive_failures: 0,
            consecutive_timeouts: 0,
            half_open_successes: 0,
            half_open_in_flight: 0,
        }
    }

    pub(crate) fn state(&self) -> BreakerState {
        self.state
    }

    /// Admission with side effects: an elapsed open circuit flips to
    /// half-open, and half-open admissions consume a probe permit.
    pub(crate) fn admit(
        &mut self,
        config: &BreakerConfig,
        now: Instant,
    ) -> (AdmitDecision, Option<Transition>) {
        match self.state {
            BreakerState::Closed => (AdmitDecision::Proceed, None),
            BreakerState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|at| now.duration_since(at) >= config.recovery_timeout)
                    .unwrap_or(true);
                if elapsed {
                    let transition = self.transition_to(BreakerState::HalfOpen);
                    self.half_open_in_flight = 1;
                    (AdmitDecision::Proceed, transition)
                } else {
                    (AdmitDecision::Reject, None)
                }
            }
            BreakerState::HalfOpen => {
                if self.half_open_in_flight < config.half_open_max_calls {
                    self.half_open_in_flight += 1;
                    (AdmitDecision::Proceed, None)
                } else {
                    (AdmitDecision::Reject, None)
                }
            }
        }
    }

    /// Non-consuming view of whether an attempt would currently be admitted.
    pub(crate) fn admittable(&self, config: &BreakerConfig, now: Instant) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::Open => self
                .opened_at
                .map(|at| now.duration_since(at) >= config.recovery_timeout)
                .unwrap_or(true),
            BreakerState::HalfOpen => self.half_open_in_flight < config.half_open_max_calls,
        }
    }

    pub(crate) fn record(
        &mut self,
        config: &BreakerConfig,
        outcome: Outcome,
        now: Instant,
    ) -> Option<Transition> {
        if self.state == BreakerState::HalfOpen {
            self.half_open_in_flight = self.half_open_in_flight.saturating_sub(1);
        }

        match outcome {
            Outcome::Success => {
                self.consecutive_failures = 0;
                self.consecutive_timeouts = 0;
                if self.state == BreakerState::HalfOpen {
                    self.half_open_successes += 1;
                    if self.half_open_successes >= config.half_open_successes {
                        return self.transition_to(BreakerState::Closed);
                    }
                }
                None
            }
            Outcome::Failure => {
                self.consecutive_failures += 1;
                if self.state == BreakerState::HalfOpen
                    || self.consecutive_failures >= config.failure_threshold
                {
                    return self.open(now);
                }
                None
            }
            Outcome::Timeout => {
                self.consecutive_timeouts += 1;
                if self.state == BreakerState::HalfOpen
                    || self.consecutive_timeouts >= config.timeout_threshold
                {
                    return self.open(now);
                }
                None
            }
        }
    }

    /// Releases an admitted probe permit without counting an outcome.
    /// Used for outcomes (rate limits, auth failures) that say nothing
    /// about reachability.
    pub(crate) fn release(&mut self) {
        if self.state == BreakerState::HalfOpen {
            self.half_open_in_flight = self.half_open_in_flight.saturating_sub(1);
        }
    }

    pub(crate) fn force_open(&mut self, now: Instant) -> Option<Transition> {
        self.open(now)
    }

    pub(crate) fn reset(&mut self) -> Option<Transition> {
        self.transition_to(BreakerState::Closed)
    }

    fn open(&mut self, now: Instant) -> Option<Transition> {
        let transition = self.transition_to(BreakerState::Open);
        self.opened_at = Some(now);
        transition
    }

    fn transition_to(&mut self, to: BreakerState) -> Option<Transition> {
        if self.state == to {
            return None;
        }
        let from = self.state;
        self.state = to;
        self.opened_at = None;
        self.consecutive_failures = 0;
        self.consecutive_timeouts = 0;
        self.half_open_successes = 0;
        self.half_open_in_flight = 0;
        Some(Transition { from, to })
    }
}
