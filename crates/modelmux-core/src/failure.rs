//! Classification of upstream error manifestations.
//!
//! Adapters translate provider-specific errors into a [`FailureClass`] before
//! the executor sees them; the executor's recovery policy dispatches on the
//! class alone.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Body markers that mean "capacity exhausted" even when the status code
/// does not say 429.
const CAPACITY_MARKERS: &[&str] = &[
    "MODEL_CAPACITY_EXHAUSTED",
    "No capacity available",
    "RESOURCE_EXHAUSTED",
    "quota exceeded",
    "rate limit",
];

/// How an upstream failure manifested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// HTTP 429, capacity-exhausted 503, or provider quota text.
    RateLimit,
    /// Malformed response or tool-call syntax violation.
    Format,
    /// Connection reset, DNS failure, or timeout.
    Transport,
    /// 401/403 while a credential was believed valid.
    Auth,
    /// Non-recoverable server error.
    Fatal,
}

impl FailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureClass::RateLimit => "rate_limit",
            FailureClass::Format => "format",
            FailureClass::Transport => "transport",
            FailureClass::Auth => "auth",
            FailureClass::Fatal => "fatal",
        }
    }

    /// True if the executor recovers from this class by advancing within the
    /// chain rather than surfacing it immediately.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, FailureClass::Fatal)
    }

    /// True for the classes recorded against the circuit breaker.
    ///
    /// Rate limits go through the capacity cooldown path and auth failures
    /// through credential invalidation; neither says anything about
    /// reachability.
    pub fn counts_toward_breaker(self) -> bool {
        matches!(self, FailureClass::Transport | FailureClass::Fatal)
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True if `body` carries one of the known capacity-exhaustion markers.
pub fn is_capacity_marker(body: &str) -> bool {
    let lowered = body.to_ascii_lowercase();
    CAPACITY_MARKERS
        .iter()
        .any(|m| body.contains(m) || lowered.contains(&m.to_ascii_lowercase()))
}

/// Classifies an HTTP response that the adapter could not parse into a
/// success.
///
/// Adapters are free to classify directly when they know better (e.g. a
/// connection reset is [`FailureClass::Transport`] with no status at all);
/// this helper covers the common status/body table.
pub fn classify_http(status: u16, body: &str) -> FailureClass {
    match status {
        429 => FailureClass::RateLimit,
        401 | 403 => FailureClass::Auth,
        503 => {
            if is_capacity_marker(body) {
                FailureClass::RateLimit
            } else {
                FailureClass::Transport
            }
        }
        s if s >= 500 => {
            if is_capacity_marker(body) {
                FailureClass::RateLimit
            } else {
                FailureClass::Fatal
            }
        }
        _ => {
            if is_capacity_marker(body) {
                FailureClass::RateLimit
            } else {
                FailureClass::Format
            }
        }
    }
}
