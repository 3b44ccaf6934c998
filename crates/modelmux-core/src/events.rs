//! Event system shared by all modelmux components.
//!
//! Every stateful component (capacity registry, breaker set, ledger, cache)
//! emits typed events through [`EventListeners`]. Listeners are isolated from
//! each other: a panicking listener never prevents the remaining listeners
//! from observing the event.

use std::fmt;
use std::sync::Arc;

/// Trait implemented by every component event enum.
pub trait CoreEvent: Send + Sync + fmt::Debug {
    /// Short machine-readable kind, e.g. `"state_transition"`.
    fn event_type(&self) -> &'static str;

    /// Name of the component instance that emitted the event.
    fn component(&self) -> &str;
}

/// Trait for receiving component events.
pub trait EventListener<E: CoreEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

/// A set of listeners attached to one component instance.
#[derive(Clone)]
pub struct EventListeners<E: CoreEvent> {
    listeners: Vec<Arc<dyn EventListener<E>>>,
}

impl<E: CoreEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Attaches a listener.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Delivers `event` to every listener, isolating panics.
    pub fn emit(&self, event: &E) {
        for listener in &self.listeners {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));

            if outcome.is_err() {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    component = event.component(),
                    event_type = event.event_type(),
                    "event listener panicked"
                );

                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "modelmux_event_listener_panics_total",
                    "component" => event.component().to_string(),
                    "event_type" => event.event_type().to_string()
                )
                .increment(1);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: CoreEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Closure-backed listener, the common case for `on_*` builder hooks.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _event: std::marker::PhantomData<E>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _event: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: CoreEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
