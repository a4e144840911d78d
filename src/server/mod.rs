//! Client-facing server surface.
//!
//! A plain TCP accept loop: one spawned [`Session`] per connection, each
//! serving exactly one request over the length-delimited bincode protocol.

pub mod protocol;

mod session;

pub use session::Session;

#[cfg(test)]
mod session_test;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::BrokerConfig;
use crate::registry::DataRegistry;
use crate::NetworkError;
use crate::Result;

pub struct BrokerServer {
    registry: Arc<DataRegistry>,
    config: Arc<BrokerConfig>,
    shutdown: watch::Receiver<()>,
}

impl BrokerServer {
    pub fn new(
        registry: Arc<DataRegistry>,
        config: Arc<BrokerConfig>,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        Self {
            registry,
            config,
            shutdown,
        }
    }

    /// Accept until the shutdown signal fires.
    ///
    /// Session failures stay inside their task; only bind errors abort the
    /// server itself.
    pub async fn serve(mut self) -> Result<()> {
        let addr = self.config.server.listen_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| NetworkError::Bind { addr, source: e })?;
        info!(%addr, "broker listening");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    info!("server stopped");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "connection accepted");
                        let session = Session::new(self.registry.clone(), self.config.clone());
                        tokio::spawn(session.handle(stream));
                    }
                    Err(e) => {
                        warn!(error = %NetworkError::Accept(e), "accept failed");
                    }
                }
            }
        }
    }
}
