//! Single-flight coalescing of concurrent identical computations.
//!
//! The first caller for a key becomes the leader and runs the computation;
//! later callers subscribe to the leader's broadcast channel and receive a
//! clone of the result. A leader that is dropped mid-flight (cancellation)
//! closes the channel, so waiters fail fast instead of hanging.

use hashbrown::HashMap;
use parking_lot::Mutex;
use std::future::Future;
use std::hash::Hash;
use thiserror::Error;
use tokio::sync::broadcast;

/// Error surfaced to single-flight callers.
#[derive(Debug, Error)]
pub enum FlightError<E> {
    /// The computation itself failed; every coalesced caller sees a clone.
    #[error("computation failed: {0}")]
    Compute(E),
    /// The leader was cancelled before producing a result.
    #[error("in-flight leader was cancelled")]
    LeaderGone,
}

impl<E: Clone> Clone for FlightError<E> {
    fn clone(&self) -> Self {
        match self {
            FlightError::Compute(e) => FlightError::Compute(e.clone()),
            FlightError::LeaderGone => FlightError::LeaderGone,
        }
    }
}

/// Coalesces concurrent computations by key.
pub struct SingleFlight<K, V, E> {
    in_flight: Mutex<HashMap<K, broadcast::Sender<Result<V, E>>>>,
}

impl<K, V, E> SingleFlight<K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Number of keys currently in flight.
    pub fn len(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.lock().is_empty()
    }

    /// Runs `compute` as the leader for `key`, or waits for an existing
    /// leader's result.
    pub async fn run<F, Fut>(&self, key: K, compute: F) -> Result<V, FlightError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(mut rx) = self.try_join(key.clone()) {
            return match rx.recv().await {
                Ok(result) => result.map_err(FlightError::Compute),
                Err(_) => Err(FlightError::LeaderGone),
            };
        }

        let mut guard = LeaderGuard {
            flight: self,
            key: Some(key),
        };
        let result = compute().await;
        guard.finish(result.clone());
        result.map_err(FlightError::Compute)
    }

    /// Returns a receiver if another caller is already leading this key.
    fn try_join(&self, key: K) -> Option<broadcast::Receiver<Result<V, E>>> {
        let mut in_flight = self.in_flight.lock();
        if let Some(sender) = in_flight.get(&key) {
            Some(sender.subscribe())
        } else {
            let (tx, _rx) = broadcast::channel(1);
            in_flight.insert(key, tx);
            None
        }
    }

    fn complete(&self, key: &K, result: Result<V, E>) {
        let sender = self.in_flight.lock().remove(key);
        if let Some(sender) = sender {
            let _ = sender.send(result);
        }
    }

    fn cancel(&self, key: &K) {
        self.in_flight.lock().remove(key);
    }
}

impl<K, V, E> Default for SingleFlight<K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Removes the leader's slot on drop so waiters do not hang if the leader
/// future is cancelled mid-computation.
struct LeaderGuard<'a, K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    flight: &'a SingleFlight<K, V, E>,
    key: Option<K>,
}

impl<K, V, E> LeaderGuard<'_, K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    fn finish(&mut self, result: Result<V, E>) {
        if let Some(key) = self.key.take() {
            self.flight.complete(&key, result);
        }
    }
}

impl<K, V, E> Drop for LeaderGuard<'_, K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.flight.cancel(&key);
        }
    }
}
