//! Cost ledger: realized spend per provider per hour/day/month, with
//! multi-level budget alerts and a rolling anomaly baseline.

mod events;
mod ledger;

pub use events::{AlertLevel, LedgerEvent, SpendWindow};
pub use ledger::{CostLedger, LedgerConfig, LedgerConfigBuilder, SpendLimits};
