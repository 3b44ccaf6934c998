//! The provider adapter seam.
//!
//! Each upstream provider gets one adapter translating its wire protocol
//! into [`ProviderResponse`] and its failures into a [`FailureClass`]
//! before the executor ever sees them. Everything above this seam is
//! connection- and protocol-oblivious.

use async_trait::async_trait;
use modelmux_core::{classify_http, CapabilitySet, FailureClass, ModelId, ProviderResponse, Turn};
use std::time::Duration;
use thiserror::Error;

/// Connection-pool settings handed to adapters at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum concurrent connections per provider.
    pub max_connections: usize,
    pub keep_alive: Duration,
    /// Prefer HTTP/2 where the provider supports it.
    pub prefer_http2: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            keep_alive: Duration::from_secs(90),
            prefer_http2: true,
        }
    }
}

/// A classified upstream failure.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{class}: {message}")]
pub struct AdapterError {
    pub class: FailureClass,
    pub message: String,
    /// Provider-suggested wait, if it sent one.
    pub retry_after: Option<Duration>,
}

impl AdapterError {
    pub fn new(class: FailureClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Classifies an HTTP error response by status code and body markers.
    pub fn from_http(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            class: classify_http(status, &body),
            message: format!("upstream returned {status}: {body}"),
            retry_after: None,
        }
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(FailureClass::RateLimit, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureClass::Transport, message)
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

/// The payload an adapter sends upstream.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub model: ModelId,
    pub turns: Vec<Turn>,
    pub capabilities: CapabilitySet,
    pub max_output_tokens: u32,
}

/// One upstream provider.
///
/// Implementations own their connection pool (sized by [`PoolConfig`]) and
/// are expected to honor cooperative cancellation: the executor drops the
/// returned future when the caller's deadline expires.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn call(&self, request: ProviderRequest) -> Result<ProviderResponse, AdapterError>;
}
