use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::*;
use crate::config::BufferCapacity;
use crate::BufferError;

fn test_buffer(
    max_slots: usize
) -> (
    Arc<ServiceBuffer>,
    mpsc::UnboundedReceiver<CommitEvent>,
    Arc<CurrentVersions>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let current = Arc::new(CurrentVersions::from_pointee(HashMap::new()));
    let buffer = ServiceBuffer::new(
        "positions",
        BufferCapacity {
            max_slots,
            max_chunk_bytes: 1024,
        },
        current.clone(),
        tx,
    );
    (buffer, rx, current)
}

fn commit_version(
    buffer: &Arc<ServiceBuffer>,
    version: &str,
    payload: &[u8],
) {
    let mut lease = buffer.get_writable(payload.len()).expect("writable slot");
    lease.write(payload).expect("within chunk bound");
    lease.set_version(version);
    lease.commit();
}

/// # Case: superseded version stays exact while a reader holds it
#[test]
fn test_version_exactness_while_reader_holds_old_version() {
    let (buffer, _rx, _current) = test_buffer(4);

    commit_version(&buffer, "v1", &[1, 2, 3]);
    let held = buffer.get_version("v1").expect("current version");

    commit_version(&buffer, "v2", &[4, 5, 6]);

    // Exact bytes, never a substitution
    let v1 = buffer.get_version("v1").expect("still resolvable");
    assert_eq!(v1.payload().as_ref(), &[1, 2, 3]);
    assert_eq!(v1.version(), "v1");

    let current = buffer.get_current().expect("current version");
    assert_eq!(current.version(), "v2");
    assert_eq!(current.payload().as_ref(), &[4, 5, 6]);

    drop(held);
}

#[test]
fn test_superseded_version_is_retired_under_pressure() {
    let (buffer, _rx, _current) = test_buffer(2);

    commit_version(&buffer, "v1", &[1]);
    commit_version(&buffer, "v2", &[2]);

    // The table was at its bound when v2 committed; unreferenced v1 is gone
    assert!(matches!(
        buffer.get_version("v1"),
        Err(BufferError::VersionRetired { .. })
    ));
    assert_eq!(buffer.current_version().as_deref(), Some("v2"));
}

#[test]
fn test_held_version_survives_pressure_until_released() {
    let (buffer, _rx, _current) = test_buffer(2);

    commit_version(&buffer, "v1", &[1]);
    let held = buffer.get_version("v1").unwrap();

    commit_version(&buffer, "v2", &[2]);

    // Retirement skipped the referenced version
    assert_eq!(buffer.get_version("v1").unwrap().payload().as_ref(), &[1]);

    drop(held);

    // Released and superseded: the next write reclaims it for room
    commit_version(&buffer, "v3", &[3]);
    assert!(buffer.get_version("v1").is_err());
    assert_eq!(buffer.current_version().as_deref(), Some("v3"));
}

#[test]
fn test_writer_fails_fast_when_nothing_is_retirable() {
    let (buffer, _rx, _current) = test_buffer(2);

    commit_version(&buffer, "v1", &[1]);
    let held = buffer.get_version("v1").unwrap();
    commit_version(&buffer, "v2", &[2]);

    // v1 is referenced, v2 is current: no room and no blocking
    assert!(matches!(
        buffer.get_writable(8),
        Err(BufferError::Saturated { max_slots: 2, .. })
    ));

    drop(held);
    assert!(buffer.get_writable(8).is_ok());
}

#[test]
fn test_version_that_never_existed_is_an_error() {
    let (buffer, _rx, _current) = test_buffer(4);

    assert!(matches!(
        buffer.get_version("v9"),
        Err(BufferError::VersionRetired { ref version, .. }) if version == "v9"
    ));
    assert!(buffer.get_current().is_none());
}

#[test]
fn test_untagged_commit_aborts_that_write_only() {
    let (buffer, mut rx, current) = test_buffer(4);

    let mut lease = buffer.get_writable(8).unwrap();
    lease.write(&[1]).unwrap();
    // No set_version: a chunker bug, aborted on release
    drop(lease);

    assert!(buffer.get_current().is_none());
    assert!(rx.try_recv().is_err());
    assert!(current.load().is_empty());

    // The buffer itself is unharmed
    commit_version(&buffer, "v1", &[1]);
    assert_eq!(buffer.current_version().as_deref(), Some("v1"));
}

#[test]
fn test_commits_publish_current_version_to_shared_map() {
    let (buffer, mut rx, current) = test_buffer(4);

    commit_version(&buffer, "v1", &[1]);
    assert_eq!(current.load().get("positions").map(String::as_str), Some("v1"));

    commit_version(&buffer, "v2", &[2]);
    assert_eq!(current.load().get("positions").map(String::as_str), Some("v2"));

    let event = rx.try_recv().expect("event for v1");
    assert_eq!(event.kind, CommitKind::Service);
    assert_eq!(event.version, "v1");
    assert_eq!(rx.try_recv().expect("event for v2").version, "v2");
}

#[test]
fn test_recommitting_a_version_replaces_its_payload() {
    let (buffer, _rx, _current) = test_buffer(4);

    commit_version(&buffer, "v1", &[1]);
    commit_version(&buffer, "v1", &[2]);

    let lease = buffer.get_version("v1").unwrap();
    assert_eq!(lease.payload().as_ref(), &[2]);
    assert_eq!(buffer.current_version().as_deref(), Some("v1"));
}
