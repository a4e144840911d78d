//! Local consumer fan-out.
//!
//! One task drains the registry's commit events. For each stream commit,
//! every compatible consumer runs in registration order (a fan-out, not a
//! first-match-wins dispatch), each with its own cursor per stream type so
//! no consumer sees a slot twice or misses one another consumer took.


use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::buffer::CommitEvent;
use crate::buffer::CommitKind;
use crate::buffer::ReadLease;
use crate::buffer::StreamCursor;
use crate::registry::DataRegistry;
use crate::DataSpec;
use crate::Result;

/// A pipeline stage fed by the local dispatch loop.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DataConsumer: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> String;

    /// Stream and service types this consumer needs before it can run
    fn requirement(&self) -> DataSpec;

    /// Handle one committed stream slot plus its associated service data.
    ///
    /// Errors are logged and abort this invocation only; the loop and the
    /// other consumers keep running.
    async fn process(
        &self,
        stream: ReadLease,
        services: Vec<ReadLease>,
    ) -> Result<()>;
}

pub struct DispatchLoop {
    registry: Arc<DataRegistry>,
    consumers: Vec<Arc<dyn DataConsumer>>,
    /// One cursor per (consumer, stream type)
    cursors: HashMap<(usize, String), StreamCursor>,
    shutdown: watch::Receiver<()>,
}

impl DispatchLoop {
    pub fn new(
        registry: Arc<DataRegistry>,
        consumers: Vec<Arc<dyn DataConsumer>>,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        Self {
            registry,
            consumers,
            cursors: HashMap::new(),
            shutdown,
        }
    }

    pub fn spawn(
        self,
        events: mpsc::UnboundedReceiver<CommitEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<CommitEvent>,
    ) {
        debug!(consumers = self.consumers.len(), "dispatch loop started");
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    debug!("dispatch loop stopped");
                    return;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        debug!("commit event channel closed");
                        return;
                    }
                }
            }
        }
    }

    async fn handle_event(
        &mut self,
        event: CommitEvent,
    ) {
        if event.kind != CommitKind::Stream {
            trace!(data_type = %event.data_type, "service commit; no stream dispatch");
            return;
        }

        let available = self.registry.available();
        for idx in 0..self.consumers.len() {
            let consumer = self.consumers[idx].clone();
            let requirement = consumer.requirement();
            if !requirement.streams().contains(&event.data_type) {
                continue;
            }
            if !requirement.is_compatible(&available) {
                trace!(consumer = %consumer.name(), "requirement not yet satisfiable");
                continue;
            }

            let cursor = self.cursors.entry((idx, event.data_type.clone())).or_default();
            // Drain everything pending for this cursor, not just one slot;
            // events can outpace a slow consumer and the ring forgets
            loop {
                match self.registry.next_for_consumer(&event.data_type, cursor, requirement.services()) {
                    Ok(Some((stream, services))) => {
                        if let Err(e) = consumer.process(stream, services).await {
                            warn!(consumer = %consumer.name(), error = %e, "consumer failed; continuing");
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(consumer = %consumer.name(), error = %e, "stale service snapshot; slot skipped");
                        break;
                    }
                }
            }
        }
    }
}
