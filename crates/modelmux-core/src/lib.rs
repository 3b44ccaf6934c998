//! Core vocabulary for modelmux.
//!
//! This crate provides the pieces shared across all modelmux components:
//! - Endpoint, workload, and capability types
//! - Failure classification for upstream errors
//! - The message/turn model used by compaction and routing
//! - Event system for observability

pub mod events;
pub mod failure;
pub mod message;
pub mod response;
pub mod types;

pub use events::{CoreEvent, EventListener, EventListeners, FnListener};
pub use failure::{classify_http, FailureClass};
pub use message::{estimate_history_tokens, estimate_tokens, Role, ToolCall, Turn};
pub use response::{ProviderResponse, TokenUsage};
pub use types::{
    Capability, CapabilitySet, CapacityStatus, Endpoint, EndpointId, ModelId, ProviderId,
    Strategy, StrategyWeights, Workload,
};
