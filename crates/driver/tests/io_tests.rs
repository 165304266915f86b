//! Transfer Path Integration Tests
//!
//! Exercises the blocking read path and the fire-and-forget write path
//! against the mock bus device:
//! - Short reads, timeouts, request clamping, mid-read disconnect
//! - Read serialization on the shared staging buffer
//! - Write immediacy, transport buffer lifecycle, submission failure
//! - Completion error accounting
//!
//! Run with: `cargo test -p driver --test io_tests`

use common::DriverEvent;
use common::test_utils::MockLinker;
use driver::{DeviceTable, LinkerRegistry, READ_TIMEOUT};
use hostbus::{BusDevice, DriverError, FileHandle, TransferError};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Rig {
    registry: Arc<LinkerRegistry>,
    device: Arc<MockLinker>,
    handle: FileHandle,
    _events: async_channel::Receiver<DriverEvent>,
}

fn open_linker() -> Rig {
    let (event_tx, event_rx) = async_channel::unbounded();
    let registry = Arc::new(LinkerRegistry::new(event_tx, DeviceTable::default()));
    let device = MockLinker::flash_advance();

    let minor = registry.attach(device.clone()).unwrap();
    let handle = registry.open(minor).unwrap();

    Rig {
        registry,
        device,
        handle,
        _events: event_rx,
    }
}

// ============================================================================
// Read path
// ============================================================================

#[test]
fn test_short_read_is_success() {
    let rig = open_linker();
    rig.device.queue_read(vec![0xCD; 5]);

    let data = rig.registry.read(rig.handle, 64).unwrap();

    assert_eq!(data, vec![0xCD; 5]);
}

#[test]
fn test_read_timeout_surfaces_transfer_failed() {
    let rig = open_linker();
    rig.device.queue_read_error(TransferError::Timeout);

    assert_eq!(
        rig.registry.read(rig.handle, 64),
        Err(DriverError::TransferFailed(TransferError::Timeout))
    );

    // The fixed 3-second bound went down to the bus unchanged
    let requests = rig.device.read_requests();
    assert_eq!(requests[0].timeout, READ_TIMEOUT);
    assert_eq!(READ_TIMEOUT, Duration::from_secs(3));
}

#[test]
fn test_read_requests_min_of_capacity_and_count() {
    let rig = open_linker();
    rig.device.queue_read(vec![0; 64]);
    rig.device.queue_read(vec![0; 64]);

    // Caller asks for more than the staging capacity: clamped to 64
    rig.registry.read(rig.handle, 1024).unwrap();
    // Caller asks for less: the smaller count is requested
    rig.registry.read(rig.handle, 16).unwrap();

    let requests = rig.device.read_requests();
    assert_eq!(requests[0].requested, 64);
    assert_eq!(requests[1].requested, 16);
}

#[test]
fn test_disconnect_mid_read_is_transfer_failed() {
    let rig = open_linker();
    rig.device.queue_read_error(TransferError::Disconnected);

    assert_eq!(
        rig.registry.read(rig.handle, 64),
        Err(DriverError::TransferFailed(TransferError::Disconnected))
    );
}

#[test]
fn test_overlapping_reads_are_serialized() {
    let rig = open_linker();
    let delay = Duration::from_millis(50);
    rig.device.queue_read_delayed(vec![1; 8], delay);
    rig.device.queue_read_delayed(vec![2; 8], delay);

    let started = Instant::now();
    let first = {
        let registry = rig.registry.clone();
        let handle = rig.handle;
        std::thread::spawn(move || registry.read(handle, 8))
    };
    let second = {
        let registry = rig.registry.clone();
        let handle = rig.handle;
        std::thread::spawn(move || registry.read(handle, 8))
    };

    assert!(first.join().unwrap().is_ok());
    assert!(second.join().unwrap().is_ok());

    // Never two transfers against the staging buffer at once; the second
    // read waited for the first
    assert_eq!(rig.device.max_concurrent_reads(), 1);
    assert!(started.elapsed() >= delay * 2);
}

// ============================================================================
// Write path
// ============================================================================

#[test]
fn test_write_returns_before_completion() {
    let rig = open_linker();
    let stats = rig.registry.stats();

    assert_eq!(rig.registry.write(rig.handle, &[0xEE; 24]).unwrap(), 24);

    // Submission accounted, completion still outstanding
    assert_eq!(stats.writes_submitted(), 1);
    assert_eq!(stats.writes_completed(), 0);
    assert_eq!(rig.device.pending_write_count(), 1);
    assert_eq!(rig.device.submitted_payloads(), vec![vec![0xEE; 24]]);
}

#[test]
fn test_write_buffer_released_exactly_once_per_completion() {
    let rig = open_linker();
    let stats = rig.registry.stats();

    rig.registry.write(rig.handle, &[1; 4]).unwrap();
    rig.registry.write(rig.handle, &[2; 4]).unwrap();
    assert_eq!(rig.device.pending_write_count(), 2);

    // One completion per submission, success or failure, never a second
    assert!(rig.device.complete_next_write(Ok(0)));
    assert!(rig.device.complete_next_write(Err(TransferError::Io)));
    assert!(!rig.device.complete_next_write(Ok(0)));

    assert_eq!(stats.writes_submitted(), 2);
    assert_eq!(stats.writes_completed(), 2);
}

#[test]
fn test_write_completion_errors_are_counted_not_surfaced() {
    let rig = open_linker();
    let stats = rig.registry.stats();

    // The write call itself has already succeeded by the time the bus
    // reports anything
    assert_eq!(rig.registry.write(rig.handle, &[7; 10]).unwrap(), 10);
    assert!(rig.device.complete_next_write(Err(TransferError::Stall)));
    assert_eq!(stats.write_errors(), 1);

    // Unlink statuses are benign
    rig.registry.write(rig.handle, &[8; 10]).unwrap();
    assert!(rig.device.complete_next_write(Err(TransferError::Cancelled)));
    rig.registry.write(rig.handle, &[9; 10]).unwrap();
    assert!(rig.device.complete_next_write(Err(TransferError::Shutdown)));

    assert_eq!(stats.write_errors(), 1);
    assert_eq!(stats.writes_completed(), 3);
}

#[test]
fn test_submit_failure_releases_transport_buffer() {
    let rig = open_linker();
    let stats = rig.registry.stats();
    rig.device.fail_submissions_with(TransferError::Disconnected);

    assert_eq!(
        rig.registry.write(rig.handle, &[3; 12]),
        Err(DriverError::SubmitFailed(TransferError::Disconnected))
    );

    // Nothing parked, nothing counted as submitted
    assert_eq!(rig.device.pending_write_count(), 0);
    assert_eq!(stats.writes_submitted(), 0);
}

#[test]
fn test_writes_after_detach_fail_but_pending_completions_drain() {
    let rig = open_linker();
    let stats = rig.registry.stats();

    rig.registry.write(rig.handle, &[4; 6]).unwrap();
    rig.registry
        .detach(rig.device.info().interface_id())
        .unwrap();

    assert_eq!(
        rig.registry.write(rig.handle, &[5; 6]),
        Err(DriverError::DeviceGone)
    );

    // The transfer submitted before detach finishes on its own buffer
    assert!(rig.device.complete_next_write(Ok(0)));
    assert_eq!(stats.writes_completed(), 1);
}
