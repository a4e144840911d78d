//! Ring buffer for high-rate transient stream chunks.
//!
//! The newest committed slot is "current". The slot table grows lazily
//! under pressure up to the configured bound, then reclaims the
//! oldest-committed unreferenced slot; past that, writers fail fast and
//! drop the chunk. Ingest is never stalled by readers.

use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::error;
use tracing::trace;

use super::lease::ReadLease;
use super::lease::SlotHost;
use super::lease::WriteLease;
use super::lease::WriteOutcome;
use super::slot::SlotId;
use super::slot::SlotState;
use super::CommitEvent;
use super::CommitKind;
use super::CurrentVersions;
use crate::config::BufferCapacity;
use crate::BufferError;

/// Per-consumer read position in one stream buffer.
///
/// `next` advances strictly forward in commit order and never re-delivers a
/// slot, unless the cursor is explicitly reset.
#[derive(Debug, Clone, Default)]
pub struct StreamCursor {
    last_seq: u64,
}

impl StreamCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewind to before the oldest retained commit.
    pub fn reset(&mut self) {
        self.last_seq = 0;
    }

    /// Commit sequence of the last slot delivered to this cursor
    pub fn position(&self) -> u64 {
        self.last_seq
    }
}

pub struct StreamBuffer {
    name: String,
    capacity: BufferCapacity,
    /// Registry-shared current service versions, snapshotted at commit
    snapshot: Arc<CurrentVersions>,
    events: mpsc::UnboundedSender<CommitEvent>,
    inner: Mutex<StreamInner>,
}

struct StreamInner {
    slots: Vec<SlotState>,
    next_seq: u64,
}

impl StreamBuffer {
    pub(crate) fn new(
        name: impl Into<String>,
        capacity: BufferCapacity,
        snapshot: Arc<CurrentVersions>,
        events: mpsc::UnboundedSender<CommitEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            capacity,
            snapshot,
            events,
            inner: Mutex::new(StreamInner {
                slots: Vec::new(),
                next_seq: 1,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> BufferCapacity {
        self.capacity
    }

    /// Claim a slot for one chunk of up to `size` bytes. Never blocks.
    ///
    /// Fails if `size` exceeds the per-chunk bound, or every slot is
    /// referenced and the table is at its slot bound. Callers drop the
    /// chunk and retry with the next one.
    pub fn get_writable(
        self: &Arc<Self>,
        size: usize,
    ) -> std::result::Result<WriteLease, BufferError> {
        if size > self.capacity.max_chunk_bytes {
            return Err(BufferError::ChunkTooLarge {
                data_type: self.name.clone(),
                requested: size,
                limit: self.capacity.max_chunk_bytes,
            });
        }

        let slot = {
            let mut inner = self.inner.lock();
            self.claim_slot(&mut inner)?
        };

        trace!(buffer = %self.name, slot, "stream write lease issued");
        Ok(WriteLease {
            host: self.clone(),
            slot,
            buf: BytesMut::with_capacity(size),
            version: None,
            max_chunk_bytes: self.capacity.max_chunk_bytes,
        })
    }

    /// Deliver the next committed slot after the cursor, oldest first.
    ///
    /// `None` when the cursor has caught up with the writer or nothing has
    /// been committed yet.
    pub fn next(
        self: &Arc<Self>,
        cursor: &mut StreamCursor,
    ) -> Option<ReadLease> {
        let mut inner = self.inner.lock();
        let idx = inner
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.readable() && s.seq > cursor.last_seq)
            .min_by_key(|(_, s)| s.seq)
            .map(|(idx, _)| idx)?;

        let slot = &mut inner.slots[idx];
        slot.readers += 1;
        cursor.last_seq = slot.seq;
        Some(self.lease_for(idx as SlotId, slot))
    }

    /// The most recently committed slot, independent of any cursor.
    pub fn get_current(self: &Arc<Self>) -> Option<ReadLease> {
        let mut inner = self.inner.lock();
        let idx = inner
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.readable())
            .max_by_key(|(_, s)| s.seq)
            .map(|(idx, _)| idx)?;

        let slot = &mut inner.slots[idx];
        slot.readers += 1;
        Some(self.lease_for(idx as SlotId, slot))
    }

    fn lease_for(
        self: &Arc<Self>,
        id: SlotId,
        slot: &SlotState,
    ) -> ReadLease {
        ReadLease {
            host: self.clone(),
            slot: id,
            payload: slot.payload.clone(),
            version: slot.version.clone(),
            seq: slot.seq,
            services: slot.services.clone(),
        }
    }

    /// Slot selection order: a never-committed idle slot, then lazy growth,
    /// then reclaiming the oldest committed unreferenced slot.
    fn claim_slot(
        &self,
        inner: &mut StreamInner,
    ) -> std::result::Result<SlotId, BufferError> {
        if let Some(idx) = inner.slots.iter().position(|s| !s.valid && s.idle()) {
            inner.slots[idx].begin_write();
            return Ok(idx as SlotId);
        }

        if inner.slots.len() < self.capacity.max_slots {
            inner.slots.push(SlotState::for_writer());
            return Ok((inner.slots.len() - 1) as SlotId);
        }

        if let Some(idx) = inner
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.reclaimable())
            .min_by_key(|(_, s)| s.seq)
            .map(|(idx, _)| idx)
        {
            trace!(buffer = %self.name, evicted_seq = inner.slots[idx].seq, "recycling oldest slot");
            inner.slots[idx].begin_write();
            return Ok(idx as SlotId);
        }

        Err(BufferError::Saturated {
            data_type: self.name.clone(),
            max_slots: self.capacity.max_slots,
        })
    }
}

impl SlotHost for StreamBuffer {
    fn data_type(&self) -> &str {
        &self.name
    }

    fn retain_read(
        &self,
        slot: SlotId,
    ) {
        let mut inner = self.inner.lock();
        inner.slots[slot as usize].readers += 1;
    }

    fn release_read(
        &self,
        slot: SlotId,
    ) {
        let mut inner = self.inner.lock();
        let state = &mut inner.slots[slot as usize];
        if state.readers == 0 {
            error!(
                "{}",
                BufferError::LeaseConflict {
                    data_type: self.name.clone(),
                    slot,
                }
            );
            return;
        }
        state.readers -= 1;
    }

    fn finish_write(
        &self,
        slot: SlotId,
        outcome: WriteOutcome,
    ) {
        let event = {
            let mut inner = self.inner.lock();
            match outcome {
                WriteOutcome::Abort => {
                    inner.slots[slot as usize].writer_active = false;
                    trace!(buffer = %self.name, slot, "stream write aborted");
                    None
                }
                WriteOutcome::Commit { payload, version } => {
                    let seq = inner.next_seq;
                    inner.next_seq += 1;
                    // Stream slots default to their commit sequence as tag
                    let version = version.unwrap_or_else(|| seq.to_string());
                    let services = self.snapshot.load_full();

                    let state = &mut inner.slots[slot as usize];
                    state.writer_active = false;
                    state.seq = seq;
                    state.payload = payload;
                    state.version = version.clone();
                    state.valid = true;
                    state.services = services;
                    Some(CommitEvent {
                        data_type: self.name.clone(),
                        kind: CommitKind::Stream,
                        version,
                        seq,
                    })
                }
            }
        };

        if let Some(event) = event {
            trace!(buffer = %self.name, seq = event.seq, "stream slot committed");
            // Dispatch may already be gone during shutdown
            let _ = self.events.send(event);
        }
    }
}

impl std::fmt::Debug for StreamBuffer {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("StreamBuffer").field("name", &self.name).finish()
    }
}
