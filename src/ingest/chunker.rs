use std::io;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::io::AsyncRead;
use tokio::io::ReadBuf;

use crate::registry::DataRegistry;
use crate::Result;

/// One external source's byte stream, owned by a single receiver.
pub struct ChunkSource {
    inner: Box<dyn AsyncRead + Send + Unpin>,
}

impl ChunkSource {
    pub fn new(io: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self { inner: Box::new(io) }
    }
}

impl AsyncRead for ChunkSource {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl std::fmt::Debug for ChunkSource {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ChunkSource").finish()
    }
}

/// Contract between a receiver and the format-specific source it drives.
///
/// Implementations split a raw byte stream into chunks and push them into
/// the registry's buffers; the byte-level record format is theirs alone.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Chunker: Send + Sync + 'static {
    /// Name used in logs and task labels
    fn name(&self) -> String;

    /// Produce a fresh source handle.
    ///
    /// `None` means the chunker cannot ever connect (misconfiguration); the
    /// receiver logs once and parks instead of spinning.
    async fn new_handle(&self) -> Option<ChunkSource>;

    /// Drive bytes from `source` into the appropriate buffer(s), calling
    /// `get_writable`/`commit` zero or more times per call.
    ///
    /// I/O failures (including a clean peer close) surface as errors; the
    /// receiver drops the handle and reconnects. A full buffer is not an
    /// I/O failure: drop the chunk and return `Ok`.
    async fn consume(
        &self,
        source: &mut ChunkSource,
        registry: &DataRegistry,
    ) -> Result<()>;
}
