use modelmux_core::{CapacityStatus, CoreEvent, EndpointId};
use std::time::Duration;

/// Events emitted by the capacity registry.
#[derive(Debug, Clone)]
pub enum CapacityEvent {
    /// Derived status changed between two observations.
    StatusChanged {
        endpoint: EndpointId,
        from: CapacityStatus,
        to: CapacityStatus,
    },
    /// A rate-limit observation placed the endpoint in cooldown.
    CooldownEntered {
        endpoint: EndpointId,
        consecutive_429s: u32,
        duration: Duration,
    },
    /// A tick or a successful response cleared the cooldown.
    CooldownCleared { endpoint: EndpointId },
    /// The accounting window rolled over.
    WindowRolled { endpoint: EndpointId },
}

impl CoreEvent for CapacityEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CapacityEvent::StatusChanged { .. } => "status_changed",
            CapacityEvent::CooldownEntered { .. } => "cooldown_entered",
            CapacityEvent::CooldownCleared { .. } => "cooldown_cleared",
            CapacityEvent::WindowRolled { .. } => "window_rolled",
        }
    }

    fn component(&self) -> &str {
        "capacity"
    }
}
