//! Per-connection request resolution.
//!
//! One session per accepted connection, one request per session. Leases are
//! scoped to the resolution step: records carry refcounted payload views, so
//! every lease is released before the response frame is written out.

use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use futures::StreamExt;
use nanoid::nanoid;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::codec::LengthDelimitedCodec;
use tracing::debug;
use tracing::instrument;
use tracing::trace;
use tracing::warn;

use super::protocol::decode_request;
use super::protocol::encode_response;
use super::protocol::framed;
use super::protocol::DataRecord;
use super::protocol::ServerRequest;
use super::protocol::ServerResponse;
use super::protocol::ServiceVersionRequest;
use crate::buffer::ReadLease;
use crate::buffer::StreamCursor;
use crate::config::BrokerConfig;
use crate::registry::DataRegistry;
use crate::DataSpec;
use crate::ProtocolError;
use crate::Result;

pub struct Session {
    registry: Arc<DataRegistry>,
    config: Arc<BrokerConfig>,
    id: String,
}

impl Session {
    pub fn new(
        registry: Arc<DataRegistry>,
        config: Arc<BrokerConfig>,
    ) -> Self {
        Self {
            registry,
            config,
            id: nanoid!(10),
        }
    }

    /// Serve exactly one request on `io`, then drop the connection.
    ///
    /// Malformed input and resolution failures become error responses on the
    /// same connection; they never escape the session task.
    #[instrument(skip_all, fields(session = %self.id))]
    pub async fn handle<S>(
        self,
        io: S,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        if let Err(e) = self.serve(io).await {
            warn!(error = %e, "session ended with error");
        }
    }

    async fn serve<S>(
        &self,
        io: S,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut framed = framed(io, self.config.server.max_frame_bytes);
        let wait = Duration::from_millis(self.config.server.request_timeout_in_ms);

        let frame = match timeout(wait, framed.next()).await {
            Err(_) => {
                debug!("no request within timeout; closing");
                return Ok(());
            }
            Ok(None) => {
                debug!("peer closed before sending a request");
                return Ok(());
            }
            Ok(Some(Err(e))) => {
                // Oversized or torn frame: answer once, then give up on the
                // stream since framing sync is lost
                let response = ServerResponse::Error(format!("bad frame: {e}"));
                Self::send(&mut framed, &response).await?;
                return Err(ProtocolError::Frame(e).into());
            }
            Ok(Some(Ok(frame))) => frame,
        };

        let response = match decode_request(&frame) {
            Err(e) => {
                debug!(error = %e, "undecodable request");
                ServerResponse::Error(format!("malformed request: {e}"))
            }
            Ok(request) => {
                trace!(?request, "request received");
                self.resolve(request)
            }
        };

        Self::send(&mut framed, &response).await
    }

    async fn send<S>(
        framed: &mut Framed<S, LengthDelimitedCodec>,
        response: &ServerResponse,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        // All leases are gone by now: resolution converts them into
        // refcounted payload views and drops them before encoding
        let body = encode_response(response)?;
        framed.send(body).await.map_err(|e| ProtocolError::Frame(e).into())
    }

    fn resolve(
        &self,
        request: ServerRequest,
    ) -> ServerResponse {
        match request {
            ServerRequest::Acknowledge => ServerResponse::Acknowledge,
            ServerRequest::StreamData { alternatives } => self.resolve_stream(alternatives),
            ServerRequest::ServiceData { wants } => self.resolve_service(wants),
        }
    }

    /// Try each alternative in order; the first compatible one that yields
    /// data wins. Incompatible or empty alternatives fall through; running
    /// out of alternatives is a valid empty response, not an error.
    fn resolve_stream(
        &self,
        alternatives: Vec<DataSpec>,
    ) -> ServerResponse {
        let available = self.registry.available();

        for alternative in alternatives {
            if alternative.is_empty() || !alternative.is_compatible(&available) {
                trace!(?alternative, "alternative not satisfiable; falling through");
                continue;
            }

            let mut records = Vec::new();
            for stream_type in alternative.streams() {
                // Sessions are single-request: a fresh cursor per type
                let mut cursor = StreamCursor::new();
                match self.registry.next_for_consumer(stream_type, &mut cursor, alternative.services()) {
                    Ok(Some((stream, services))) => {
                        records.push(record_from(&stream));
                        records.extend(services.iter().map(record_from));
                    }
                    Ok(None) => {}
                    // Stale snapshot: surface the named error so the client
                    // can retry with fresh requirements
                    Err(e) => return ServerResponse::Error(e.to_string()),
                }
            }

            if !records.is_empty() {
                return ServerResponse::Records(records);
            }
        }

        // Nothing is ready yet
        ServerResponse::Records(Vec::new())
    }

    /// All-or-nothing exact resolution: any missing version fails the whole
    /// request with an error naming the type and version.
    fn resolve_service(
        &self,
        wants: Vec<ServiceVersionRequest>,
    ) -> ServerResponse {
        let mut records = Vec::with_capacity(wants.len());
        for want in &wants {
            match self.registry.service_version(&want.data_type, &want.version) {
                Ok(lease) => records.push(record_from(&lease)),
                Err(e) => return ServerResponse::Error(e.to_string()),
            }
        }
        ServerResponse::Records(records)
    }
}

fn record_from(lease: &ReadLease) -> DataRecord {
    DataRecord {
        data_type: lease.data_type().to_string(),
        version: lease.version().to_string(),
        payload: lease.payload().clone(),
    }
}
