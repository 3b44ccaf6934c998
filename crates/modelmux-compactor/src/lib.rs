//! Context compaction: shrink a message history to a provider-specific
//! budget while keeping the system preamble, the most recent exchanges, and
//! every retained tool-call/tool-result pair intact.
//!
//! An *exchange* is a user turn together with everything up to the next
//! user turn. Compaction keeps whole exchanges from the tail, then drops
//! any tool-result whose matching tool-call was evicted - an orphan result
//! confuses providers more than a missing one.

mod budget;
mod compactor;

pub use budget::CompactionBudget;
pub use compactor::{Compactor, SummarizeError, Summarizer};
