//! Driver Bridge Integration Tests
//!
//! Tests for the async channel bridge between the tokio runtime and the
//! driver worker thread.
//!
//! # Test Scenarios
//! - Channel creation and basic communication
//! - Command/event message flow
//! - Worker thread lifecycle
//!
//! Run with: `cargo test -p common --test bridge_tests`

use common::test_utils::{DEFAULT_TEST_TIMEOUT, with_timeout};
use common::{DriverCommand, DriverEvent, create_driver_bridge};
use hostbus::{DriverError, FileHandle, LinkerInfo};
use std::thread;
use tokio::sync::oneshot;

fn sample_info(minor: u8) -> LinkerInfo {
    LinkerInfo {
        minor,
        node: format!("fax{}", minor.saturating_sub(192)),
        vendor_id: 0x5655,
        product_id: 0x4144,
        bus_number: 1,
        address: 4,
        bulk_in: 0x81,
        bulk_out: 0x02,
        bulk_in_capacity: 64,
        references: 1,
    }
}

// ============================================================================
// Command Flow Tests
// ============================================================================

#[tokio::test]
async fn test_list_command_round_trip() {
    let (bridge, worker) = create_driver_bridge();

    let handle = thread::spawn(move || {
        if let Ok(DriverCommand::ListLinkers { response }) = worker.recv_command() {
            let _ = response.send(vec![sample_info(192), sample_info(193)]);
        }
    });

    let (tx, rx) = oneshot::channel();
    bridge
        .send_command(DriverCommand::ListLinkers { response: tx })
        .await
        .expect("Failed to send command");

    let linkers = with_timeout(DEFAULT_TEST_TIMEOUT, rx)
        .await
        .expect("Timed out waiting for response")
        .expect("Worker dropped response channel");

    assert_eq!(linkers.len(), 2);
    assert_eq!(linkers[0].node, "fax0");
    assert_eq!(linkers[1].node, "fax1");

    handle.join().expect("Worker thread panicked");
}

#[tokio::test]
async fn test_open_error_round_trip() {
    let (bridge, worker) = create_driver_bridge();

    let handle = thread::spawn(move || {
        if let Ok(DriverCommand::Open { minor, response }) = worker.recv_command() {
            assert_eq!(minor, 200);
            let _ = response.send(Err(DriverError::NoSuchDevice));
        }
    });

    let (tx, rx) = oneshot::channel();
    bridge
        .send_command(DriverCommand::Open {
            minor: 200,
            response: tx,
        })
        .await
        .expect("Failed to send command");

    let result = rx.await.expect("Worker dropped response channel");
    assert_eq!(result, Err(DriverError::NoSuchDevice));

    handle.join().expect("Worker thread panicked");
}

#[tokio::test]
async fn test_write_command_carries_payload() {
    let (bridge, worker) = create_driver_bridge();

    let handle = thread::spawn(move || {
        if let Ok(DriverCommand::Write {
            handle,
            data,
            response,
        }) = worker.recv_command()
        {
            assert_eq!(handle, FileHandle(7));
            assert_eq!(data, vec![0xDE, 0xAD, 0xBE, 0xEF]);
            let _ = response.send(Ok(data.len()));
        }
    });

    let (tx, rx) = oneshot::channel();
    bridge
        .send_command(DriverCommand::Write {
            handle: FileHandle(7),
            data: vec![0xDE, 0xAD, 0xBE, 0xEF],
            response: tx,
        })
        .await
        .expect("Failed to send command");

    assert_eq!(rx.await.unwrap(), Ok(4));
    handle.join().expect("Worker thread panicked");
}

// ============================================================================
// Event Flow Tests
// ============================================================================

#[tokio::test]
async fn test_attach_event_reaches_bridge() {
    let (bridge, worker) = create_driver_bridge();

    let handle = thread::spawn(move || {
        worker
            .event_tx
            .send_blocking(DriverEvent::LinkerAttached {
                info: sample_info(192),
            })
            .expect("Failed to send event");
    });

    let event = with_timeout(DEFAULT_TEST_TIMEOUT, bridge.recv_event())
        .await
        .expect("Timed out waiting for event")
        .expect("Event channel closed");

    match event {
        DriverEvent::LinkerAttached { info } => {
            assert_eq!(info.minor, 192);
            assert_eq!(info.vendor_id, 0x5655);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    handle.join().expect("Event thread panicked");
}

#[tokio::test]
async fn test_shutdown_ends_worker_loop() {
    let (bridge, worker) = create_driver_bridge();

    let handle = thread::spawn(move || {
        let mut commands = 0;
        loop {
            match worker.recv_command() {
                Ok(DriverCommand::Shutdown) | Err(_) => break,
                Ok(_) => commands += 1,
            }
        }
        commands
    });

    let (tx, _rx) = oneshot::channel();
    bridge
        .send_command(DriverCommand::ListLinkers { response: tx })
        .await
        .unwrap();
    bridge.send_command(DriverCommand::Shutdown).await.unwrap();

    assert_eq!(handle.join().expect("Worker thread panicked"), 1);
}
