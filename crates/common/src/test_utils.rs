//! Test utilities for falink
//!
//! Provides the in-memory mock bus device and helper constructors used by
//! the driver and daemon test suites.
//!
//! # Example
//!
//! ```
//! use common::test_utils::MockLinker;
//!
//! let linker = MockLinker::flash_advance();
//! linker.queue_read(vec![0xAA; 12]);
//! ```

use hostbus::{
    BusDevice, BusDeviceInfo, EndpointDescriptor, TransferError, TransferKind, WriteCompletion,
};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Bulk IN endpoint address used by the stock mock linker
pub const TEST_BULK_IN: u8 = 0x81;
/// Bulk OUT endpoint address used by the stock mock linker
pub const TEST_BULK_OUT: u8 = 0x02;
/// wMaxPacketSize of the stock mock linker's bulk IN endpoint
pub const TEST_PACKET_SIZE: u16 = 64;

/// Build a bulk IN endpoint descriptor.
pub fn bulk_in_endpoint(address: u8, max_packet_size: u16) -> EndpointDescriptor {
    EndpointDescriptor {
        address,
        transfer: TransferKind::Bulk,
        max_packet_size,
    }
}

/// Build a bulk OUT endpoint descriptor.
pub fn bulk_out_endpoint(address: u8) -> EndpointDescriptor {
    EndpointDescriptor {
        address,
        transfer: TransferKind::Bulk,
        max_packet_size: 64,
    }
}

/// Build an interrupt endpoint descriptor (ignored by discovery).
pub fn interrupt_endpoint(address: u8) -> EndpointDescriptor {
    EndpointDescriptor {
        address,
        transfer: TransferKind::Interrupt,
        max_packet_size: 8,
    }
}

/// One recorded bulk IN request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub endpoint: u8,
    pub requested: usize,
    pub timeout: Duration,
}

enum ReadScript {
    Data {
        payload: Vec<u8>,
        delay: Option<Duration>,
    },
    Fail(TransferError),
}

struct PendingWrite {
    endpoint: u8,
    data: Vec<u8>,
    on_complete: WriteCompletion,
}

/// Scriptable in-memory [`BusDevice`].
///
/// Reads are served from a queue of scripted results; write submissions are
/// parked until the test runs their completion with
/// [`MockLinker::complete_next_write`]. Every request is recorded so tests
/// can assert on endpoints, lengths, and the timeout the driver passed
/// down.
pub struct MockLinker {
    info: BusDeviceInfo,
    endpoints: Vec<EndpointDescriptor>,
    reads: Mutex<VecDeque<ReadScript>>,
    read_log: Mutex<Vec<ReadRequest>>,
    pending_writes: Mutex<VecDeque<PendingWrite>>,
    submitted: Mutex<Vec<Vec<u8>>>,
    fail_submit: Mutex<Option<TransferError>>,
    reads_in_flight: AtomicUsize,
    max_reads_in_flight: AtomicUsize,
}

impl MockLinker {
    /// A mock with the given identity and endpoint list at bus 1, address 4.
    pub fn new(vendor_id: u16, product_id: u16, endpoints: Vec<EndpointDescriptor>) -> Arc<Self> {
        Self::at_location(vendor_id, product_id, 1, 4, endpoints)
    }

    /// A mock at an explicit bus location, for multi-device tests.
    pub fn at_location(
        vendor_id: u16,
        product_id: u16,
        bus_number: u8,
        address: u8,
        endpoints: Vec<EndpointDescriptor>,
    ) -> Arc<Self> {
        Arc::new(Self {
            info: BusDeviceInfo {
                vendor_id,
                product_id,
                bus_number,
                address,
            },
            endpoints,
            reads: Mutex::new(VecDeque::new()),
            read_log: Mutex::new(Vec::new()),
            pending_writes: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
            fail_submit: Mutex::new(None),
            reads_in_flight: AtomicUsize::new(0),
            max_reads_in_flight: AtomicUsize::new(0),
        })
    }

    /// A stock Visoly Flash Advance Xtreme: bulk IN 0x81 (64 bytes max
    /// packet) and bulk OUT 0x02.
    pub fn flash_advance() -> Arc<Self> {
        Self::new(
            0x5655,
            0x4144,
            vec![
                bulk_in_endpoint(TEST_BULK_IN, TEST_PACKET_SIZE),
                bulk_out_endpoint(TEST_BULK_OUT),
            ],
        )
    }

    /// Queue a successful read serving `payload`.
    pub fn queue_read(&self, payload: Vec<u8>) {
        self.reads.lock().unwrap().push_back(ReadScript::Data {
            payload,
            delay: None,
        });
    }

    /// Queue a successful read that holds the bus for `delay` first.
    pub fn queue_read_delayed(&self, payload: Vec<u8>, delay: Duration) {
        self.reads.lock().unwrap().push_back(ReadScript::Data {
            payload,
            delay: Some(delay),
        });
    }

    /// Queue a failing read.
    pub fn queue_read_error(&self, error: TransferError) {
        self.reads.lock().unwrap().push_back(ReadScript::Fail(error));
    }

    /// Make every subsequent write submission fail with `error`.
    pub fn fail_submissions_with(&self, error: TransferError) {
        *self.fail_submit.lock().unwrap() = Some(error);
    }

    /// Run the oldest parked write completion with `status`.
    ///
    /// Returns false if no write is pending. The transport buffer moves
    /// into the completion, so after this call the mock no longer holds it.
    pub fn complete_next_write(&self, status: Result<usize, TransferError>) -> bool {
        let pending = self.pending_writes.lock().unwrap().pop_front();
        match pending {
            Some(write) => {
                let status = status.map(|_| write.data.len());
                (write.on_complete)(status, write.data);
                true
            }
            None => false,
        }
    }

    /// Number of submitted writes whose completion has not run yet.
    pub fn pending_write_count(&self) -> usize {
        self.pending_writes.lock().unwrap().len()
    }

    /// Endpoint of the oldest parked write, if any.
    pub fn pending_write_endpoint(&self) -> Option<u8> {
        self.pending_writes.lock().unwrap().front().map(|w| w.endpoint)
    }

    /// Copies of every payload ever submitted, in order.
    pub fn submitted_payloads(&self) -> Vec<Vec<u8>> {
        self.submitted.lock().unwrap().clone()
    }

    /// Every bulk IN request seen so far.
    pub fn read_requests(&self) -> Vec<ReadRequest> {
        self.read_log.lock().unwrap().clone()
    }

    /// High-water mark of concurrently executing bulk IN transfers.
    pub fn max_concurrent_reads(&self) -> usize {
        self.max_reads_in_flight.load(Ordering::SeqCst)
    }
}

impl BusDevice for MockLinker {
    fn info(&self) -> BusDeviceInfo {
        self.info
    }

    fn endpoints(&self) -> Vec<EndpointDescriptor> {
        self.endpoints.clone()
    }

    fn bulk_in(
        &self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransferError> {
        let in_flight = self.reads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_reads_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        self.read_log.lock().unwrap().push(ReadRequest {
            endpoint,
            requested: buf.len(),
            timeout,
        });

        let script = self.reads.lock().unwrap().pop_front();
        let result = match script {
            Some(ReadScript::Data { payload, delay }) => {
                if let Some(delay) = delay {
                    std::thread::sleep(delay);
                }
                let n = payload.len().min(buf.len());
                buf[..n].copy_from_slice(&payload[..n]);
                Ok(n)
            }
            Some(ReadScript::Fail(error)) => Err(error),
            // Nothing scripted: the device has no data, the request times out
            None => Err(TransferError::Timeout),
        };

        self.reads_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn submit_bulk_out(
        &self,
        endpoint: u8,
        data: Vec<u8>,
        on_complete: WriteCompletion,
    ) -> Result<(), TransferError> {
        if let Some(error) = *self.fail_submit.lock().unwrap() {
            // Buffer and completion are dropped here, mirroring the
            // contract that a failed submission releases both
            return Err(error);
        }

        self.submitted.lock().unwrap().push(data.clone());
        self.pending_writes.lock().unwrap().push_back(PendingWrite {
            endpoint,
            data,
            on_complete,
        });
        Ok(())
    }
}

/// Timeout wrapper for async tests.
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out.
#[derive(Debug)]
pub struct TimeoutError {
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}
