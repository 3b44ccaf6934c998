use modelmux_core::FailureClass;
use std::time::Duration;
use thiserror::Error;

/// Terminal outcomes surfaced to the caller of
/// [`route_and_call`](crate::Mux::route_and_call).
///
/// Clonable so that coalesced callers can share one failure.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RouteError {
    /// Every endpoint was filtered out before any attempt. The caller may
    /// wait `retry_after` and try again, or surface the error.
    #[error("no routable endpoint{}", retry_hint(.retry_after))]
    NoRoute { retry_after: Option<Duration> },

    /// The chain was walked and every attempt failed.
    #[error("all endpoints exhausted; last error: {last_error}")]
    Exhausted { last_error: FailureClass },

    /// The caller's deadline elapsed.
    #[error("cancelled: deadline elapsed")]
    Cancelled,

    /// The request referenced an unknown workload or an impossible
    /// capability set, or the configuration itself was invalid.
    #[error("configuration error: {detail}")]
    Configuration { detail: String },
}

impl RouteError {
    pub fn configuration(detail: impl Into<String>) -> Self {
        RouteError::Configuration {
            detail: detail.into(),
        }
    }

    /// True for outcomes the caller can retry after waiting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RouteError::NoRoute { .. } | RouteError::Exhausted { .. } | RouteError::Cancelled
        )
    }
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {:.1}s)", d.as_secs_f64()),
        None => String::new(),
    }
}
