use modelmux_core::{CoreEvent, ProviderId};

/// Events emitted by the credential oracle.
#[derive(Debug, Clone)]
pub enum CredentialEvent {
    /// Cached usability for `provider` was dropped; routing filters should
    /// be reconsidered.
    Invalidated { provider: ProviderId },
    /// The whole cache was dropped.
    InvalidatedAll,
}

impl CoreEvent for CredentialEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CredentialEvent::Invalidated { .. } => "invalidated",
            CredentialEvent::InvalidatedAll => "invalidated_all",
        }
    }

    fn component(&self) -> &str {
        "credentials"
    }
}
