//! Bulk transfer paths
//!
//! The read path is a blocking copy-through: one bulk IN transfer into the
//! record's staging buffer, then a copy out to the caller. The write path
//! is fire-and-forget: the caller's bytes are copied into a transport
//! buffer whose ownership passes to the in-flight transfer, and the call
//! returns as soon as the submission is accepted.

use crate::record::DeviceRecord;
use hostbus::{DriverError, TransferError, WriteCompletion};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fixed timeout for blocking bulk reads.
pub const READ_TIMEOUT: Duration = Duration::from_secs(3);

impl DeviceRecord {
    /// Blocking bulk read into `dest`.
    ///
    /// Requests `min(bulk_in_capacity, dest.len())` bytes from the bulk IN
    /// endpoint with the fixed 3-second timeout and returns the count
    /// actually received; a short read is success. Overlapping reads on
    /// the same record are serialized on the staging buffer; the second
    /// caller waits, it is never rejected.
    pub fn read(&self, dest: &mut [u8]) -> Result<usize, DriverError> {
        if dest.is_empty() {
            return Ok(0);
        }

        let device = self.live_device()?;

        let mut staging = self.staging.lock().unwrap();
        let want = staging.len().min(dest.len());
        let got = device
            .bulk_in(self.bulk_in, &mut staging[..want], READ_TIMEOUT)
            .map_err(|code| {
                debug!(
                    minor = self.minor(),
                    "bulk read of {} bytes failed: {}", want, code
                );
                DriverError::TransferFailed(code)
            })?;

        // A transport that reports more than it was asked for must not be
        // allowed to overrun the caller's buffer
        if got > want {
            return Err(DriverError::CopyFault);
        }

        dest[..got].copy_from_slice(&staging[..got]);
        Ok(got)
    }

    /// Fire-and-forget bulk write of `src`.
    ///
    /// Returns `src.len()` as soon as the submission is accepted; nothing
    /// about completion is ever reported back here. The transport buffer
    /// belongs to the in-flight transfer from submission until its
    /// completion runs, which releases it by dropping it. Completion
    /// failures are logged and counted in [`crate::TransferStats`], never
    /// surfaced to the caller.
    pub fn write(&self, src: &[u8]) -> Result<usize, DriverError> {
        if src.is_empty() {
            return Ok(0);
        }

        let device = self.live_device()?;

        let mut transport = Vec::new();
        transport
            .try_reserve_exact(src.len())
            .map_err(|_| DriverError::OutOfMemory)?;
        transport.extend_from_slice(src);

        let stats = Arc::clone(&self.stats);
        let minor = self.minor();
        let completion: WriteCompletion = Box::new(move |status, transport| {
            match status {
                Ok(_) => stats.note_completed(false),
                // Unlink statuses aren't errors: the transfer was taken
                // back on purpose, at detach or controller shutdown
                Err(TransferError::Cancelled) | Err(TransferError::Shutdown) => {
                    stats.note_completed(false);
                }
                Err(code) => {
                    debug!(minor, "nonzero write bulk status received: {}", code);
                    stats.note_completed(true);
                }
            }
            // Transport buffer released here, exactly once
            drop(transport);
        });

        device
            .submit_bulk_out(self.bulk_out, transport, completion)
            .map_err(|code| {
                warn!(minor, "failed to submit write of {} bytes: {}", src.len(), code);
                DriverError::SubmitFailed(code)
            })?;

        self.stats.note_submitted();
        Ok(src.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TransferStats;
    use common::test_utils::{MockLinker, TEST_BULK_IN, TEST_BULK_OUT};
    use hostbus::BusDevice;

    fn record_with(device: Arc<MockLinker>) -> DeviceRecord {
        let endpoints = crate::discovery::discover_endpoints(&device.endpoints()).unwrap();
        let staging = vec![0u8; endpoints.bulk_in_capacity];
        DeviceRecord::new(
            192,
            "fax0".to_string(),
            device,
            endpoints,
            staging,
            Arc::new(TransferStats::default()),
        )
    }

    #[test]
    fn test_read_addresses_bulk_in_endpoint() {
        let device = MockLinker::flash_advance();
        let record = record_with(device.clone());
        device.queue_read(vec![7; 16]);

        let mut dest = [0u8; 32];
        let n = record.read(&mut dest).unwrap();

        assert_eq!(n, 16);
        let requests = device.read_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].endpoint, TEST_BULK_IN);
        assert_eq!(requests[0].timeout, READ_TIMEOUT);
    }

    #[test]
    fn test_write_addresses_bulk_out_endpoint() {
        let device = MockLinker::flash_advance();
        let record = record_with(device.clone());

        assert_eq!(record.write(&[1, 2, 3]).unwrap(), 3);
        assert_eq!(device.pending_write_endpoint(), Some(TEST_BULK_OUT));
    }

    #[test]
    fn test_zero_length_write_is_a_noop() {
        let device = MockLinker::flash_advance();
        let record = record_with(device.clone());

        assert_eq!(record.write(&[]).unwrap(), 0);
        assert_eq!(device.pending_write_count(), 0);
        assert_eq!(record.stats.writes_submitted(), 0);
    }

    #[test]
    fn test_zero_length_read_is_a_noop() {
        let device = MockLinker::flash_advance();
        let record = record_with(device.clone());

        let mut dest = [0u8; 0];
        assert_eq!(record.read(&mut dest).unwrap(), 0);
        assert!(device.read_requests().is_empty());
    }
}
