//! Wire protocol for remote clients.
//!
//! Length-delimited frames carrying bincode-encoded bodies. Type names are
//! plain strings; the protocol itself is unversioned.

use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio_util::codec::Framed;
use tokio_util::codec::LengthDelimitedCodec;

use crate::DataSpec;
use crate::ProtocolError;

/// One request per connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerRequest {
    /// Liveness probe; answered without touching any buffer
    Acknowledge,
    /// Alternative requirement sets, tried in order; the first compatible
    /// alternative that yields data wins
    StreamData { alternatives: Vec<DataSpec> },
    /// Exact version lookups, resolved all-or-nothing
    ServiceData { wants: Vec<ServiceVersionRequest> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceVersionRequest {
    pub data_type: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerResponse {
    Acknowledge,
    /// Resolved records; empty means "nothing is ready yet", not an error
    Records(Vec<DataRecord>),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    pub data_type: String,
    pub version: String,
    pub payload: Bytes,
}

/// Length-delimited framing over any byte stream, bounded per config.
pub fn framed<S>(
    io: S,
    max_frame_bytes: usize,
) -> Framed<S, LengthDelimitedCodec>
where
    S: AsyncRead + AsyncWrite,
{
    Framed::new(
        io,
        LengthDelimitedCodec::builder()
            .max_frame_length(max_frame_bytes)
            .new_codec(),
    )
}

pub fn encode_request(request: &ServerRequest) -> std::result::Result<Bytes, ProtocolError> {
    bincode::serialize(request).map(Bytes::from).map_err(ProtocolError::Encode)
}

pub fn decode_request(frame: &[u8]) -> std::result::Result<ServerRequest, ProtocolError> {
    bincode::deserialize(frame).map_err(ProtocolError::Decode)
}

pub fn encode_response(response: &ServerResponse) -> std::result::Result<Bytes, ProtocolError> {
    bincode::serialize(response).map(Bytes::from).map_err(ProtocolError::Encode)
}

pub fn decode_response(frame: &[u8]) -> std::result::Result<ServerResponse, ProtocolError> {
    bincode::deserialize(frame).map_err(ProtocolError::Decode)
}
