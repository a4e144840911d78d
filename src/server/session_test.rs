use std::sync::Arc;

use bytes::Bytes;
use futures::SinkExt;
use futures::StreamExt;

use super::protocol::*;
use super::Session;
use crate::config::BrokerConfig;
use crate::config::BufferSettings;
use crate::registry::DataRegistry;
use crate::DataSpec;

fn registry_with_defaults() -> Arc<DataRegistry> {
    DataRegistry::new(BufferSettings::default())
}

fn commit_stream_chunk(
    registry: &DataRegistry,
    data_type: &str,
    payload: &[u8],
) {
    let buffer = registry.stream_buffer(data_type);
    let mut lease = buffer.get_writable(payload.len()).unwrap();
    lease.write(payload).unwrap();
    lease.commit();
}

fn commit_service_version(
    registry: &DataRegistry,
    data_type: &str,
    version: &str,
    payload: &[u8],
) {
    let buffer = registry.service_buffer(data_type);
    let mut lease = buffer.get_writable(payload.len()).unwrap();
    lease.write(payload).unwrap();
    lease.set_version(version);
    lease.commit();
}

/// Run one session over an in-memory connection and return its response.
async fn roundtrip_raw(
    registry: Arc<DataRegistry>,
    body: Bytes,
) -> ServerResponse {
    let config = Arc::new(BrokerConfig::default());
    let (client, server) = tokio::io::duplex(1024 * 1024);

    let session = Session::new(registry, config.clone());
    let task = tokio::spawn(session.handle(server));

    let mut framed = framed(client, config.server.max_frame_bytes);
    framed.send(body).await.unwrap();
    let frame = framed.next().await.expect("a response frame").unwrap();
    task.await.unwrap();

    decode_response(&frame).unwrap()
}

async fn roundtrip(
    registry: Arc<DataRegistry>,
    request: ServerRequest,
) -> ServerResponse {
    roundtrip_raw(registry, encode_request(&request).unwrap()).await
}

#[tokio::test]
async fn test_acknowledge_needs_no_buffers() {
    let response = roundtrip(registry_with_defaults(), ServerRequest::Acknowledge).await;
    assert_eq!(response, ServerResponse::Acknowledge);
}

#[tokio::test]
async fn test_stream_request_before_any_commit_succeeds_empty() {
    let registry = registry_with_defaults();
    registry.stream_buffer("vis");

    let request = ServerRequest::StreamData {
        alternatives: vec![DataSpec::new().with_stream("vis")],
    };

    // "Nothing is ready yet" is a valid response, not an error
    assert_eq!(roundtrip(registry, request).await, ServerResponse::Records(Vec::new()));
}

#[tokio::test]
async fn test_stream_request_returns_chunk_with_its_service_snapshot() {
    let registry = registry_with_defaults();
    commit_service_version(&registry, "positions", "v1", &[1, 2, 3]);
    commit_stream_chunk(&registry, "vis", &[9, 9]);
    commit_service_version(&registry, "positions", "v2", &[4, 5, 6]);

    let request = ServerRequest::StreamData {
        alternatives: vec![DataSpec::new().with_stream("vis").with_service("positions")],
    };

    let response = roundtrip(registry, request).await;
    let records = match response {
        ServerResponse::Records(records) => records,
        other => panic!("expected records, got {other:?}"),
    };

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].data_type, "vis");
    assert_eq!(records[0].payload.as_ref(), &[9, 9]);
    // The snapshot version, not the current one
    assert_eq!(records[1].data_type, "positions");
    assert_eq!(records[1].version, "v1");
    assert_eq!(records[1].payload.as_ref(), &[1, 2, 3]);
}

#[tokio::test]
async fn test_incompatible_alternative_falls_through_to_the_next() {
    let registry = registry_with_defaults();
    commit_stream_chunk(&registry, "vis", &[7]);

    let request = ServerRequest::StreamData {
        alternatives: vec![
            // Not offered at all: skipped, not fatal
            DataSpec::new().with_stream("weights"),
            DataSpec::new().with_stream("vis"),
        ],
    };

    let response = roundtrip(registry, request).await;
    match response {
        ServerResponse::Records(records) => {
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].data_type, "vis");
        }
        other => panic!("expected records, got {other:?}"),
    }
}

#[tokio::test]
async fn test_service_request_for_unknown_version_is_a_named_error() {
    let registry = registry_with_defaults();
    commit_service_version(&registry, "positions", "v2", &[1]);

    let request = ServerRequest::ServiceData {
        wants: vec![ServiceVersionRequest {
            data_type: "positions".to_string(),
            version: "v9".to_string(),
        }],
    };

    match roundtrip(registry, request).await {
        ServerResponse::Error(message) => {
            assert!(message.contains("positions"));
            assert!(message.contains("v9"));
        }
        other => panic!("expected an error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_service_request_is_all_or_nothing() {
    let registry = registry_with_defaults();
    commit_service_version(&registry, "positions", "v1", &[1]);

    let request = ServerRequest::ServiceData {
        wants: vec![
            ServiceVersionRequest {
                data_type: "positions".to_string(),
                version: "v1".to_string(),
            },
            ServiceVersionRequest {
                data_type: "weights".to_string(),
                version: "v9".to_string(),
            },
        ],
    };

    // No partial responses: the resolvable "positions" must not leak out
    assert!(matches!(roundtrip(registry, request).await, ServerResponse::Error(_)));
}

#[tokio::test]
async fn test_service_request_resolves_exact_versions() {
    let registry = registry_with_defaults();
    commit_service_version(&registry, "positions", "v1", &[1, 2, 3]);
    commit_service_version(&registry, "positions", "v2", &[4, 5, 6]);

    let request = ServerRequest::ServiceData {
        wants: vec![ServiceVersionRequest {
            data_type: "positions".to_string(),
            version: "v1".to_string(),
        }],
    };

    match roundtrip(registry, request).await {
        ServerResponse::Records(records) => {
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].version, "v1");
            assert_eq!(records[0].payload.as_ref(), &[1, 2, 3]);
        }
        other => panic!("expected records, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_request_becomes_an_error_response() {
    let response = roundtrip_raw(registry_with_defaults(), Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef])).await;

    match response {
        ServerResponse::Error(message) => assert!(message.contains("malformed")),
        other => panic!("expected an error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_silent_peer_gets_dropped_after_timeout() {
    let registry = registry_with_defaults();
    let mut config = BrokerConfig::default();
    config.server.request_timeout_in_ms = 20;

    let (client, server) = tokio::io::duplex(1024);
    let session = Session::new(registry, Arc::new(config));
    let task = tokio::spawn(session.handle(server));

    // Send nothing: the session gives up and closes cleanly
    task.await.unwrap();

    let mut framed = framed(client, 1024);
    assert!(framed.next().await.is_none());
}
