//! Credential oracle: answers "is provider P usable right now?".
//!
//! A provider is usable iff either an environment secret exists under one of
//! its accepted alias names, or a token file under the configured plugin
//! directory holds a non-empty, unexpired access token. Probe results are
//! cached in memory until [`CredentialOracle::invalidate`] drops them, which
//! also notifies subscribers so routing filters are reconsidered immediately.
//!
//! The oracle itself never fails a request: any I/O error while probing a
//! credential store is reported as a conservative `false`.

mod events;
mod oracle;

pub use events::CredentialEvent;
pub use oracle::{CredentialOracle, CredentialSources, CredentialSourcesBuilder};
