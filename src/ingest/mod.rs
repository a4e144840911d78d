//! Background ingest.
//!
//! One [`Receiver`] task per external source. The receiver owns its
//! [`Chunker`] exclusively and keeps the buffers fed, reconnecting on I/O
//! failure without ever propagating the error further.

mod chunker;
mod receiver;

pub use chunker::ChunkSource;
pub use chunker::Chunker;
pub use receiver::Receiver;
pub use receiver::ReceiverState;

#[cfg(test)]
pub(crate) use chunker::MockChunker;
