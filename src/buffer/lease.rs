//! RAII lease guards.
//!
//! A lease is the only way to touch a slot's payload. Releasing is automatic
//! on scope exit: dropping a [`WriteLease`] with data written commits the
//! slot, dropping it untouched aborts, dropping a [`ReadLease`] decrements
//! the reader count. Nothing can unwind across a lease without releasing it.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use bytes::BytesMut;

use super::slot::SlotId;
use crate::BufferError;

/// Release-side contract a buffer offers its leases.
pub(crate) trait SlotHost: Send + Sync {
    fn data_type(&self) -> &str;
    fn retain_read(
        &self,
        slot: SlotId,
    );
    fn release_read(
        &self,
        slot: SlotId,
    );
    fn finish_write(
        &self,
        slot: SlotId,
        outcome: WriteOutcome,
    );
}

pub(crate) enum WriteOutcome {
    Commit {
        payload: Bytes,
        version: Option<String>,
    },
    Abort,
}

/// Shared read access to one committed slot.
///
/// Cloning increments the slot's reader count. The payload handle is a
/// refcounted view frozen at acquisition: it stays intact even if the slot
/// is recycled for a new writer after this lease is released.
pub struct ReadLease {
    pub(crate) host: Arc<dyn SlotHost>,
    pub(crate) slot: SlotId,
    pub(crate) payload: Bytes,
    pub(crate) version: String,
    pub(crate) seq: u64,
    pub(crate) services: Arc<HashMap<String, String>>,
}

impl ReadLease {
    pub fn data_type(&self) -> &str {
        self.host.data_type()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Commit order within the owning buffer
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Service versions that were current when this slot was committed.
    ///
    /// Empty for service buffer leases.
    pub fn service_snapshot(&self) -> &HashMap<String, String> {
        &self.services
    }
}

impl Clone for ReadLease {
    fn clone(&self) -> Self {
        self.host.retain_read(self.slot);
        Self {
            host: self.host.clone(),
            slot: self.slot,
            payload: self.payload.clone(),
            version: self.version.clone(),
            seq: self.seq,
            services: self.services.clone(),
        }
    }
}

impl Drop for ReadLease {
    fn drop(&mut self) {
        self.host.release_read(self.slot);
    }
}

impl std::fmt::Debug for ReadLease {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ReadLease")
            .field("data_type", &self.data_type())
            .field("version", &self.version)
            .field("seq", &self.seq)
            .field("len", &self.payload.len())
            .finish()
    }
}

/// Exclusive write access to one slot.
///
/// Releasing the lease publishes: if at least one byte was written the slot
/// is committed atomically, otherwise the write is aborted and the slot
/// stays invisible to readers. Service buffer writes must carry a version
/// tag via [`set_version`](Self::set_version) before release.
pub struct WriteLease {
    pub(crate) host: Arc<dyn SlotHost>,
    pub(crate) slot: SlotId,
    pub(crate) buf: BytesMut,
    pub(crate) version: Option<String>,
    pub(crate) max_chunk_bytes: usize,
}

impl WriteLease {
    /// Append chunk bytes, bounded by the buffer's configured chunk size.
    pub fn write(
        &mut self,
        src: &[u8],
    ) -> std::result::Result<(), BufferError> {
        let requested = self.buf.len() + src.len();
        if requested > self.max_chunk_bytes {
            return Err(BufferError::ChunkTooLarge {
                data_type: self.host.data_type().to_string(),
                requested,
                limit: self.max_chunk_bytes,
            });
        }
        self.buf.extend_from_slice(src);
        Ok(())
    }

    pub fn set_version(
        &mut self,
        version: impl Into<String>,
    ) {
        self.version = Some(version.into());
    }

    pub fn written(&self) -> usize {
        self.buf.len()
    }

    /// Publish the slot. Equivalent to dropping the lease; named for call
    /// sites where the release is the point.
    pub fn commit(self) {
        drop(self);
    }

    /// Discard everything written and release without publishing.
    pub fn abort(mut self) {
        self.buf.clear();
        self.version = None;
    }
}

impl Drop for WriteLease {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        let outcome = if buf.is_empty() {
            WriteOutcome::Abort
        } else {
            WriteOutcome::Commit {
                payload: buf.freeze(),
                version: self.version.take(),
            }
        };
        self.host.finish_write(self.slot, outcome);
    }
}

impl std::fmt::Debug for WriteLease {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WriteLease")
            .field("data_type", &self.host.data_type())
            .field("written", &self.buf.len())
            .finish()
    }
}
