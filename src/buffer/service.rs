//! Version-keyed buffer for slowly-changing service records.
//!
//! Each commit creates a new version and atomically becomes "current".
//! Superseded versions stay addressable while any reader holds them and are
//! reclaimed lazily at the next commit once unreferenced; a retired version
//! is gone for good, never silently substituted.

use std::collections::HashMap;
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

pub struct ServiceBuffer {
    name: String,
    capacity: BufferCapacity,
    /// Registry-shared current-version map, rcu-updated on every commit
    current_versions: Arc<CurrentVersions>,
    events: mpsc::UnboundedSender<CommitEvent>,
    inner: Mutex<ServiceInner>,
}

struct ServiceInner {
    slots: HashMap<SlotId, SlotState>,
    by_version: HashMap<String, SlotId>,
    current: Option<SlotId>,
    next_id: u64,
    next_seq: u64,
}

impl ServiceBuffer {
    pub(crate) fn new(
        name: impl Into<String>,
        capacity: BufferCapacity,
        current_versions: Arc<CurrentVersions>,
        events: mpsc::UnboundedSender<CommitEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            capacity,
            current_versions,
            events,
            inner: Mutex::new(ServiceInner {
                slots: HashMap::new(),
                by_version: HashMap::new(),
                current: None,
                next_id: 1,
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

    /// Claim a slot for a new version of up to `size` bytes. Never blocks.
    ///
    /// The version tag must be set on the lease before release; an untagged
    /// commit is a chunker bug and aborts that write only.
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
            if inner.slots.len() >= self.capacity.max_slots && !Self::retire_one(&mut inner) {
                return Err(BufferError::Saturated {
                    data_type: self.name.clone(),
                    max_slots: self.capacity.max_slots,
                });
            }
            let id = inner.next_id;
            inner.next_id += 1;
            inner.slots.insert(id, SlotState::for_writer());
            id
        };

        trace!(buffer = %self.name, slot, "service write lease issued");
        Ok(WriteLease {
            host: self.clone(),
            slot,
            buf: BytesMut::with_capacity(size),
            version: None,
            max_chunk_bytes: self.capacity.max_chunk_bytes,
        })
    }

    /// The current version, if any commit has happened yet.
    pub fn get_current(self: &Arc<Self>) -> Option<ReadLease> {
        let mut inner = self.inner.lock();
        let id = inner.current?;
        let slot = inner.slots.get_mut(&id)?;
        slot.readers += 1;
        Some(self.lease_for(id, slot))
    }

    /// Exact-version lookup; fails if `version` was retired or never existed.
    pub fn get_version(
        self: &Arc<Self>,
        version: &str,
    ) -> std::result::Result<ReadLease, BufferError> {
        let mut inner = self.inner.lock();
        let id = match inner.by_version.get(version) {
            Some(id) => *id,
            None => {
                return Err(BufferError::VersionRetired {
                    data_type: self.name.clone(),
                    version: version.to_string(),
                })
            }
        };
        let slot = match inner.slots.get_mut(&id) {
            Some(slot) => slot,
            None => {
                return Err(BufferError::VersionRetired {
                    data_type: self.name.clone(),
                    version: version.to_string(),
                })
            }
        };
        slot.readers += 1;
        Ok(self.lease_for(id, slot))
    }

    pub fn current_version(&self) -> Option<String> {
        let inner = self.inner.lock();
        let id = inner.current?;
        inner.slots.get(&id).map(|s| s.version.clone())
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

    /// Remove one retirable version to make room. True if a slot was freed.
    fn retire_one(inner: &mut ServiceInner) -> bool {
        let candidate = inner
            .slots
            .iter()
            .filter(|(id, s)| s.valid && s.idle() && inner.current != Some(**id))
            .map(|(id, s)| (*id, s.seq))
            .min_by_key(|(_, seq)| *seq);

        match candidate {
            Some((id, _)) => {
                Self::remove_slot(inner, id);
                true
            }
            None => false,
        }
    }

    /// Lazy retirement pass run at each commit: every superseded version
    /// with no outstanding readers is reclaimed.
    fn retire_stale(
        &self,
        inner: &mut ServiceInner,
    ) {
        let retired: Vec<SlotId> = inner
            .slots
            .iter()
            .filter(|(id, s)| s.valid && s.idle() && inner.current != Some(**id))
            .map(|(id, _)| *id)
            .collect();

        for id in retired {
            if let Some(version) = inner.slots.get(&id).map(|s| s.version.clone()) {
                trace!(buffer = %self.name, %version, "service version retired");
            }
            Self::remove_slot(inner, id);
        }
    }

    fn remove_slot(
        inner: &mut ServiceInner,
        id: SlotId,
    ) {
        if let Some(state) = inner.slots.remove(&id) {
            if inner.by_version.get(&state.version) == Some(&id) {
                inner.by_version.remove(&state.version);
            }
        }
    }

    /// Publish `version` as this type's current entry in the shared map.
    fn publish_current(
        &self,
        version: &str,
    ) {
        self.current_versions.rcu(|map| {
            let mut map = HashMap::clone(map);
            map.insert(self.name.clone(), version.to_string());
            map
        });
    }
}

impl SlotHost for ServiceBuffer {
    fn data_type(&self) -> &str {
        &self.name
    }

    fn retain_read(
        &self,
        slot: SlotId,
    ) {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.slots.get_mut(&slot) {
            state.readers += 1;
        }
    }

    fn release_read(
        &self,
        slot: SlotId,
    ) {
        let mut inner = self.inner.lock();
        match inner.slots.get_mut(&slot) {
            Some(state) if state.readers > 0 => state.readers -= 1,
            _ => error!(
                "{}",
                BufferError::LeaseConflict {
                    data_type: self.name.clone(),
                    slot,
                }
            ),
        }
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
                    inner.slots.remove(&slot);
                    trace!(buffer = %self.name, slot, "service write aborted");
                    None
                }
                WriteOutcome::Commit { version: None, .. } => {
                    inner.slots.remove(&slot);
                    error!(
                        "{}",
                        BufferError::UntaggedCommit {
                            data_type: self.name.clone(),
                        }
                    );
                    None
                }
                WriteOutcome::Commit {
                    payload,
                    version: Some(version),
                } => {
                    let seq = inner.next_seq;
                    inner.next_seq += 1;

                    if let Some(state) = inner.slots.get_mut(&slot) {
                        state.writer_active = false;
                        state.seq = seq;
                        state.payload = payload;
                        state.version = version.clone();
                        state.valid = true;
                    }
                    inner.by_version.insert(version.clone(), slot);
                    inner.current = Some(slot);
                    // Opportunistic retirement once the table is at its slot
                    // bound; below it, superseded versions stay resolvable
                    // for stream slots whose snapshot still names them
                    if inner.slots.len() >= self.capacity.max_slots {
                        self.retire_stale(&mut inner);
                    }
                    // Publish under the table lock so the shared map follows
                    // commit order
                    self.publish_current(&version);

                    Some(CommitEvent {
                        data_type: self.name.clone(),
                        kind: CommitKind::Service,
                        version,
                        seq,
                    })
                }
            }
        };

        if let Some(event) = event {
            trace!(buffer = %self.name, version = %event.version, "service slot committed");
            let _ = self.events.send(event);
        }
    }
}

impl std::fmt::Debug for ServiceBuffer {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ServiceBuffer").field("name", &self.name).finish()
    }
}
