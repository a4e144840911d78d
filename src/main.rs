use std::path::PathBuf;

use acqbroker::Broker;
use acqbroker::BrokerBuilder;
use acqbroker::BrokerConfig;
use acqbroker::Error;
use acqbroker::NetworkError;
use acqbroker::Result;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let config = BrokerConfig::new()?.validate()?;

    // Initializing Logs
    let _guard = init_observability(&config.server.log_dir)?;

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    // Build Broker. Chunkers and consumers are deployment-specific; the bare
    // binary serves the network surface over an initially empty registry.
    let broker: Broker = BrokerBuilder::new(config, graceful_rx).build();

    info!("Broker started. Waiting for CTRL+C signal...");
    // Listen on Shutdown Signal
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    // Run Broker
    if let Err(e) = broker.run().await {
        error!("broker stops: {:?}", e);
    }

    println!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| Error::Fatal(format!("Failed to install SIGINT handler: {e}")))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| Error::Fatal(format!("Failed to install SIGTERM handler: {e}")))?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::Network(NetworkError::SignalClosed(format!(
            "Failed to send shutdown signal: {}",
            e
        )))
    })?;

    info!("Shutdown completed");
    Ok(())
}

fn init_observability(log_dir: &PathBuf) -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::never(log_dir, "broker.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
