//! Lease-guarded slot buffers.
//!
//! One buffer per named data type. Stream buffers are rings with a total
//! commit order; service buffers are keyed by version string. All payload
//! access goes through a [`ReadLease`] or [`WriteLease`]; the table lock is
//! held only for lease bookkeeping, never across I/O.

mod lease;
mod service;
mod slot;
mod stream;

pub use lease::ReadLease;
pub use lease::WriteLease;
pub use service::ServiceBuffer;
pub use stream::StreamBuffer;
pub use stream::StreamCursor;

#[cfg(test)]
mod service_test;

use std::collections::HashMap;

/// Lock-free view of each service type's current version.
///
/// Every service commit updates it via rcu; every stream commit snapshots it,
/// so stream slots carry the service versions that were current at commit
/// time. Shared between the registry and all buffers it creates.
pub type CurrentVersions = arc_swap::ArcSwap<HashMap<String, String>>;

/// Emitted on every commit; drained by the local dispatch loop.
#[derive(Debug, Clone)]
pub struct CommitEvent {
    pub data_type: String,
    pub kind: CommitKind,
    pub version: String,
    pub seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitKind {
    Stream,
    Service,
}
