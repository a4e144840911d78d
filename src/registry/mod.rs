//! Process-wide type→buffer registry.
//!
//! One registry per process, constructed before any receiver or session
//! starts and shared by every component. Buffers are created lazily on first
//! reference, read or write alike, and live for the process lifetime.
//!
//! The registry also owns the one cross-buffer consistency primitive: a
//! lock-free map of each service type's current version, rcu-updated on
//! every service commit and snapshotted into every stream slot at commit
//! time, so a consumer reading a stream slot can request the exactly
//! matching service versions rather than whatever is current by then.


use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::buffer::CommitEvent;
use crate::buffer::CurrentVersions;
use crate::buffer::ReadLease;
use crate::buffer::ServiceBuffer;
use crate::buffer::StreamBuffer;
use crate::buffer::StreamCursor;
use crate::config::BufferSettings;
use crate::BufferError;
use crate::DataSpec;

pub struct DataRegistry {
    settings: BufferSettings,
    streams: DashMap<String, Arc<StreamBuffer>>,
    services: DashMap<String, Arc<ServiceBuffer>>,
    current_versions: Arc<CurrentVersions>,
    events_tx: mpsc::UnboundedSender<CommitEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<CommitEvent>>>,
}

impl DataRegistry {
    pub fn new(settings: BufferSettings) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            settings,
            streams: DashMap::new(),
            services: DashMap::new(),
            current_versions: Arc::new(CurrentVersions::from_pointee(HashMap::new())),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        })
    }

    /// Get or lazily create the stream buffer for `data_type`. Idempotent.
    pub fn stream_buffer(
        &self,
        data_type: &str,
    ) -> Arc<StreamBuffer> {
        self.streams
            .entry(data_type.to_string())
            .or_insert_with(|| {
                debug!(%data_type, "creating stream buffer");
                StreamBuffer::new(
                    data_type,
                    self.settings.capacity_for(data_type),
                    self.current_versions.clone(),
                    self.events_tx.clone(),
                )
            })
            .clone()
    }

    /// Get or lazily create the service buffer for `data_type`. Idempotent.
    pub fn service_buffer(
        &self,
        data_type: &str,
    ) -> Arc<ServiceBuffer> {
        self.services
            .entry(data_type.to_string())
            .or_insert_with(|| {
                debug!(%data_type, "creating service buffer");
                ServiceBuffer::new(
                    data_type,
                    self.settings.capacity_for(data_type),
                    self.current_versions.clone(),
                    self.events_tx.clone(),
                )
            })
            .clone()
    }

    /// Every type name the registry currently holds, for admission checks.
    pub fn available(&self) -> DataSpec {
        let mut spec = DataSpec::new();
        for entry in self.streams.iter() {
            spec.add_stream(entry.key().clone());
        }
        for entry in self.services.iter() {
            spec.add_service(entry.key().clone());
        }
        spec
    }

    /// Commit event stream for the dispatch loop. Yields the receiver once.
    pub fn take_commit_events(&self) -> Option<mpsc::UnboundedReceiver<CommitEvent>> {
        self.events_rx.lock().take()
    }

    /// Compose the next stream read with its associated service snapshot.
    ///
    /// `Ok(None)` when the cursor has caught up (nothing ready, not an
    /// error). A required service type whose snapshot version was already
    /// retired, or that had no current version when the slot was committed,
    /// is a stale read and fails the whole composition rather than silently
    /// substituting the current version.
    pub fn next_for_consumer(
        &self,
        stream_type: &str,
        cursor: &mut StreamCursor,
        required_services: &BTreeSet<String>,
    ) -> std::result::Result<Option<(ReadLease, Vec<ReadLease>)>, BufferError> {
        let stream = self.stream_buffer(stream_type);
        let lease = match stream.next(cursor) {
            Some(lease) => lease,
            None => return Ok(None),
        };
        let services = self.resolve_snapshot(&lease, required_services)?;
        Ok(Some((lease, services)))
    }

    /// Exact service version lookup for remote service requests.
    pub fn service_version(
        &self,
        data_type: &str,
        version: &str,
    ) -> std::result::Result<ReadLease, BufferError> {
        self.service_buffer(data_type).get_version(version)
    }

    fn resolve_snapshot(
        &self,
        stream_lease: &ReadLease,
        required_services: &BTreeSet<String>,
    ) -> std::result::Result<Vec<ReadLease>, BufferError> {
        let snapshot = stream_lease.service_snapshot();
        let mut leases = Vec::with_capacity(required_services.len());
        for data_type in required_services {
            let version = snapshot.get(data_type).ok_or_else(|| BufferError::NoVersion {
                data_type: data_type.clone(),
            })?;
            leases.push(self.service_buffer(data_type).get_version(version)?);
        }
        Ok(leases)
    }
}

impl std::fmt::Debug for DataRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("DataRegistry")
            .field("streams", &self.streams.len())
            .field("services", &self.services.len())
            .finish()
    }
}
