use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use super::ChunkSource;
use super::Chunker;
use crate::config::IngestConfig;
use crate::registry::DataRegistry;
use crate::IngestError;

/// Receiver lifecycle. Terminal only on explicit shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Disconnected,
    Connecting,
    Streaming,
}

/// Dedicated task driving one chunker.
///
/// `Disconnected → Connecting → Streaming → (I/O error) → Disconnected`.
/// Reconnects are unlimited, since a dropped source link is expected to be
/// transient, with a jittered delay so a flapping link cannot spin.
pub struct Receiver {
    chunker: Arc<dyn Chunker>,
    registry: Arc<DataRegistry>,
    backoff: (u64, u64),
    shutdown: watch::Receiver<()>,
}

impl Receiver {
    pub fn new(
        chunker: Arc<dyn Chunker>,
        registry: Arc<DataRegistry>,
        config: &IngestConfig,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        Self {
            chunker,
            registry,
            backoff: config.backoff_range(),
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    #[instrument(skip_all, fields(chunker = %self.chunker.name()))]
    pub async fn run(mut self) {
        let mut state = ReceiverState::Disconnected;
        let mut source: Option<ChunkSource> = None;
        let mut reconnects: u64 = 0;

        loop {
            match state {
                ReceiverState::Disconnected => {
                    // No delay on the very first connect attempt
                    if reconnects > 0 {
                        let delay = self.reconnect_delay();
                        debug!(?delay, "waiting before reconnect");
                        tokio::select! {
                            _ = self.shutdown.changed() => {
                                debug!("receiver stopped while waiting to reconnect");
                                return;
                            }
                            _ = sleep(delay) => {}
                        }
                    }
                    state = ReceiverState::Connecting;
                }
                ReceiverState::Connecting => {
                    match self.chunker.new_handle().await {
                        Some(handle) => {
                            info!("chunk source connected");
                            source = Some(handle);
                            state = ReceiverState::Streaming;
                        }
                        None => {
                            // Misconfigured chunker: no retry loop to spin,
                            // park until the process shuts down
                            let e = IngestError::NoSource(self.chunker.name());
                            error!(error = %e, "parking until shutdown");
                            let _ = self.shutdown.changed().await;
                            return;
                        }
                    }
                }
                ReceiverState::Streaming => {
                    let handle = match source.as_mut() {
                        Some(handle) => handle,
                        None => {
                            state = ReceiverState::Connecting;
                            continue;
                        }
                    };
                    tokio::select! {
                        _ = self.shutdown.changed() => {
                            debug!("receiver stopped");
                            return;
                        }
                        result = self.chunker.consume(handle, &self.registry) => {
                            if let Err(e) = result {
                                warn!(error = %e, "chunk source failed; reconnecting");
                                // Release the handle before reconnecting
                                source = None;
                                reconnects += 1;
                                state = ReceiverState::Disconnected;
                            }
                        }
                    }
                }
            }
        }
    }

    fn reconnect_delay(&self) -> Duration {
        let (min, max) = self.backoff;
        let millis = rand::thread_rng().gen_range(min..max);
        Duration::from_millis(millis)
    }
}
