//! The assembled broker process.
//!
//! Owns the registry and every background task's join handle. `run()` spawns
//! one receiver per chunker plus the dispatch loop, serves connections on
//! the current task until shutdown, then joins what it spawned.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::config::BrokerConfig;
use crate::dispatch::DataConsumer;
use crate::dispatch::DispatchLoop;
use crate::ingest::Chunker;
use crate::ingest::Receiver;
use crate::registry::DataRegistry;
use crate::server::BrokerServer;
use crate::Error;
use crate::Result;

pub struct Broker {
    config: Arc<BrokerConfig>,
    registry: Arc<DataRegistry>,
    chunkers: Vec<Arc<dyn Chunker>>,
    consumers: Vec<Arc<dyn DataConsumer>>,
    shutdown: watch::Receiver<()>,
}

impl Broker {
    pub(super) fn assemble(
        config: Arc<BrokerConfig>,
        registry: Arc<DataRegistry>,
        chunkers: Vec<Arc<dyn Chunker>>,
        consumers: Vec<Arc<dyn DataConsumer>>,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        Self {
            config,
            registry,
            chunkers,
            consumers,
            shutdown,
        }
    }

    /// Shared registry handle, e.g. for embedding the broker in a larger
    /// process that reads buffers directly.
    pub fn registry(&self) -> Arc<DataRegistry> {
        self.registry.clone()
    }

    /// Run until the shutdown signal fires.
    pub async fn run(self) -> Result<()> {
        let mut handles: Vec<(String, JoinHandle<()>)> = Vec::new();

        for chunker in &self.chunkers {
            let label = chunker.name();
            let receiver = Receiver::new(
                chunker.clone(),
                self.registry.clone(),
                &self.config.ingest,
                self.shutdown.clone(),
            );
            handles.push((format!("receiver:{label}"), receiver.spawn()));
        }

        let events = self
            .registry
            .take_commit_events()
            .ok_or_else(|| Error::Fatal("commit event channel already taken".into()))?;
        let dispatch = DispatchLoop::new(self.registry.clone(), self.consumers, self.shutdown.clone());
        handles.push(("dispatch".into(), dispatch.spawn(events)));

        info!(receivers = handles.len() - 1, "broker started");

        let server = BrokerServer::new(self.registry.clone(), self.config.clone(), self.shutdown.clone());
        let served = server.serve().await;
        match &served {
            // The shutdown signal has fired; collect the background tasks
            Ok(()) => {
                for (label, handle) in handles {
                    if let Err(e) = handle.await {
                        warn!(task = %label, error = %e, "background task panicked");
                    }
                }
            }
            // The server died without a shutdown signal; the background
            // tasks would wait on it forever
            Err(e) => {
                error!(error = %e, "server exited with error; aborting background tasks");
                for (_, handle) in handles {
                    handle.abort();
                }
            }
        }

        info!("broker stopped");
        served
    }
}
