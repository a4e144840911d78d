use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

pub(crate) type SlotId = u64;

/// Bookkeeping for one storage location.
///
/// Invariant: `writer_active` and `readers > 0` are mutually exclusive.
/// `valid` is set only when a write lease is released after at least one
/// write; an aborted write leaves the slot invalid and reusable.
#[derive(Debug, Default)]
pub(crate) struct SlotState {
    pub payload: Bytes,
    pub version: String,
    /// Commit order within the owning buffer; 0 = never committed
    pub seq: u64,
    pub readers: usize,
    pub writer_active: bool,
    pub valid: bool,
    /// Service versions current at commit time (stream slots only)
    pub services: Arc<HashMap<String, String>>,
}

impl SlotState {
    pub fn for_writer() -> Self {
        Self {
            writer_active: true,
            ..Default::default()
        }
    }

    /// No lease of either mode is outstanding
    pub fn idle(&self) -> bool {
        self.readers == 0 && !self.writer_active
    }

    /// Committed, visible to readers, and safe to reclaim for a new write
    pub fn reclaimable(&self) -> bool {
        self.valid && self.idle()
    }

    pub fn readable(&self) -> bool {
        self.valid && !self.writer_active
    }

    /// Hand the slot to a new writer, wiping the published content.
    ///
    /// Callers must have checked `idle()` under the table lock; in-flight
    /// read leases keep their own refcounted payload handle, so wiping here
    /// never invalidates them.
    pub fn begin_write(&mut self) {
        debug_assert!(self.idle());
        self.payload = Bytes::new();
        self.version.clear();
        self.seq = 0;
        self.valid = false;
        self.writer_active = true;
        self.services = Arc::default();
    }
}
