use crate::circuit::BreakerState;
use modelmux_core::{CoreEvent, EndpointId};

/// Events emitted by a breaker set.
#[derive(Debug, Clone)]
pub enum BreakerEvent {
    StateTransition {
        endpoint: EndpointId,
        from: BreakerState,
        to: BreakerState,
    },
    CallPermitted {
        endpoint: EndpointId,
        state: BreakerState,
    },
    CallRejected {
        endpoint: EndpointId,
    },
    SuccessRecorded {
        endpoint: EndpointId,
        state: BreakerState,
    },
    FailureRecorded {
        endpoint: EndpointId,
        state: BreakerState,
    },
}

impl CoreEvent for BreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BreakerEvent::StateTransition { .. } => "state_transition",
            BreakerEvent::CallPermitted { .. } => "call_permitted",
            BreakerEvent::CallRejected { .. } => "call_rejected",
            BreakerEvent::SuccessRecorded { .. } => "success_recorded",
            BreakerEvent::FailureRecorded { .. } => "failure_recorded",
        }
    }

    fn component(&self) -> &str {
        "breaker"
    }
}
