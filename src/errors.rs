//! Broker Error Hierarchy
//!
//! Defines error types for the data-acquisition broker, categorized by the
//! layer where they occur. Everything except `Fatal` is recoverable at the
//! component boundary that produced it.

use std::net::SocketAddr;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Slot buffer admission, lease and version failures
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// Ingest-side chunker/source failures
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// Wire protocol encode/decode failures
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Server socket and task plumbing failures
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    /// Requested chunk exceeds the configured per-chunk bound
    #[error("Chunk of {requested} bytes exceeds the {limit} byte limit for '{data_type}'")]
    ChunkTooLarge {
        data_type: String,
        requested: usize,
        limit: usize,
    },

    /// Every slot is referenced; the writer must drop the chunk and retry
    #[error("Buffer '{data_type}' is saturated ({max_slots} slots all referenced)")]
    Saturated { data_type: String, max_slots: usize },

    /// Exact-version lookup found the version already reclaimed
    #[error("Version '{version}' of '{data_type}' has been retired")]
    VersionRetired { data_type: String, version: String },

    /// A stream slot carries no snapshot entry for a required service type
    #[error("No version of '{data_type}' was current when the stream chunk was committed")]
    NoVersion { data_type: String },

    /// A write lease was released without a version tag
    #[error("Service commit on '{data_type}' is missing a version tag")]
    UntaggedCommit { data_type: String },

    /// Conflicting lease acquisition; indicates a bug in a chunker or consumer
    #[error("Lease conflict on slot {slot} of '{data_type}'")]
    LeaseConflict { data_type: String, slot: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Source read failures; the receiver reconnects on these
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Peer closed the connection mid-stream
    #[error("Chunk source closed by peer")]
    SourceClosed,

    /// Chunker could not produce a source handle; treated as misconfiguration
    #[error("Chunker '{0}' returned no source handle")]
    NoSource(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Undecodable request/response body
    #[error("Decode failed: {0}")]
    Decode(#[source] bincode::Error),

    /// Unencodable response body
    #[error("Encode failed: {0}")]
    Encode(#[source] bincode::Error),

    /// Connection dropped before a full frame arrived
    #[error("Connection closed before a complete frame was read")]
    UnexpectedEof,

    /// Frame-level I/O failure
    #[error("Frame transport error: {0}")]
    Frame(#[from] std::io::Error),

    /// Well-formed frame carrying a request the broker cannot serve
    #[error("Bad request: {0}")]
    BadRequest(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("Shutdown signal channel closed: {0}")]
    SignalClosed(String),
}

// ============== Conversion Implementations ============== //
impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        ProtocolError::Decode(e).into()
    }
}

impl From<JoinError> for Error {
    fn from(e: JoinError) -> Self {
        NetworkError::TaskFailed(e).into()
    }
}
