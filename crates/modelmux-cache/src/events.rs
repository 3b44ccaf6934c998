use modelmux_core::CoreEvent;

/// Events emitted by the response cache. Keys are hex digests, safe to log.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    Hit { key: String },
    Miss { key: String },
    Inserted { key: String },
    Evicted { key: String },
    Expired { key: String },
}

impl CoreEvent for CacheEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::Hit { .. } => "hit",
            CacheEvent::Miss { .. } => "miss",
            CacheEvent::Inserted { .. } => "inserted",
            CacheEvent::Evicted { .. } => "evicted",
            CacheEvent::Expired { .. } => "expired",
        }
    }

    fn component(&self) -> &str {
        "cache"
    }
}
