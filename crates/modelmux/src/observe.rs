//! Per-attempt observations and append-only JSONL persistence.
//!
//! Neither file is load-bearing: a cold start begins with empty registries
//! and recovers nominally. Sink failures are logged and never fail the
//! request being observed.

use crate::decision::RoutingDecision;
use modelmux_breaker::BreakerState;
use modelmux_core::{CapacityStatus, EndpointId, FailureClass, Workload};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Terminal state of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure(FailureClass),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }
}

/// One structured record per attempt, emitted to every registered sink.
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub decision_id: String,
    pub endpoint: EndpointId,
    pub workload: Workload,
    pub outcome: AttemptOutcome,
    pub latency_ms: u64,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub capacity_status: CapacityStatus,
    pub breaker_state: BreakerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Receives per-attempt observations.
pub trait ObservationSink: Send + Sync {
    fn record(&self, observation: &Observation);
}

/// Receives routing decisions for post-hoc replay.
pub trait DecisionSink: Send + Sync {
    fn record(&self, decision: &RoutingDecision);
}

/// Append-only JSONL writer shared by the usage and decision logs.
struct JsonlWriter {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlWriter {
    fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn append<T: Serialize>(&self, record: &T) {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_err, "failed to serialize jsonl record");
                return;
            }
        };
        let mut writer = self.writer.lock();
        let result = writeln!(writer, "{line}").and_then(|()| writer.flush());
        if let Err(_err) = result {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %_err, "failed to append jsonl record");
        }
    }
}

/// Appends one JSON object per completed attempt to a usage ledger file.
pub struct JsonlSink {
    inner: JsonlWriter,
}

impl JsonlSink {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self {
            inner: JsonlWriter::open(path.as_ref())?,
        })
    }
}

impl ObservationSink for JsonlSink {
    fn record(&self, observation: &Observation) {
        self.inner.append(observation);
    }
}

/// Appends one JSON object per routing decision for replay.
pub struct JsonlDecisionLog {
    inner: JsonlWriter,
}

impl JsonlDecisionLog {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self {
            inner: JsonlWriter::open(path.as_ref())?,
        })
    }
}

impl DecisionSink for JsonlDecisionLog {
    fn record(&self, decision: &RoutingDecision) {
        self.inner.append(decision);
    }
}

/// In-memory sink for tests and introspection.
#[derive(Default)]
pub struct MemorySink {
    observations: Mutex<Vec<Observation>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.observations.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.observations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObservationSink for MemorySink {
    fn record(&self, observation: &Observation) {
        self.observations.lock().push(observation.clone());
    }
}
