//! Builder for assembling a [`Broker`].
//!
//! Chunkers and consumers are registered up front; `build()` constructs the
//! registry and hands back a broker that owns everything it will run. All
//! tasks share one watch channel for cooperative shutdown.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use super::Broker;
use crate::config::BrokerConfig;
use crate::dispatch::DataConsumer;
use crate::ingest::Chunker;
use crate::registry::DataRegistry;

pub struct BrokerBuilder {
    config: BrokerConfig,
    chunkers: Vec<Arc<dyn Chunker>>,
    consumers: Vec<Arc<dyn DataConsumer>>,
    shutdown: watch::Receiver<()>,
}

impl BrokerBuilder {
    pub fn new(
        config: BrokerConfig,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        Self {
            config,
            chunkers: Vec::new(),
            consumers: Vec::new(),
            shutdown,
        }
    }

    /// Register one external source. One receiver task is spawned per
    /// chunker; the chunker is owned by that receiver alone.
    pub fn register_chunker(
        mut self,
        chunker: Arc<dyn Chunker>,
    ) -> Self {
        info!(chunker = %chunker.name(), "chunker registered");
        self.chunkers.push(chunker);
        self
    }

    /// Register one local pipeline stage. Dispatch order is registration
    /// order.
    pub fn register_consumer(
        mut self,
        consumer: Arc<dyn DataConsumer>,
    ) -> Self {
        info!(consumer = %consumer.name(), "consumer registered");
        self.consumers.push(consumer);
        self
    }

    pub fn build(self) -> Broker {
        let registry = DataRegistry::new(self.config.buffers.clone());
        Broker::assemble(
            Arc::new(self.config),
            registry,
            self.chunkers,
            self.consumers,
            self.shutdown,
        )
    }
}
