//! The bus device trait
//!
//! [`BusDevice`] is the seam between the driver core and the host USB
//! stack. The driver holds attached devices as `Arc<dyn BusDevice>` and
//! performs every transfer through this trait, so the core is testable
//! without hardware and the rusb dependency stays confined to the daemon.

use crate::error::TransferError;
use crate::types::{BusDeviceInfo, EndpointDescriptor};
use std::time::Duration;

/// Completion callback for an asynchronous bulk-out submission.
///
/// Invoked exactly once when the bus signals completion, success or
/// failure. The transport buffer is handed back so the callback can release
/// it; dropping it is the release. The callback must not assume any driver
/// state is still alive; it may run after the originating device record
/// has been destroyed.
pub type WriteCompletion = Box<dyn FnOnce(Result<usize, TransferError>, Vec<u8>) + Send + 'static>;

/// One opened device on the host bus.
///
/// Implementations must be safe to share across threads: the driver issues
/// blocking reads, asynchronous write submissions, and teardown from
/// different contexts concurrently.
pub trait BusDevice: Send + Sync {
    /// Cached device identity.
    fn info(&self) -> BusDeviceInfo;

    /// Endpoint descriptors of the active interface, in declaration order.
    fn endpoints(&self) -> Vec<EndpointDescriptor>;

    /// Blocking bulk IN transfer.
    ///
    /// Fills `buf` with up to `buf.len()` bytes from `endpoint` and returns
    /// the count actually received. A short transfer is success, not an
    /// error. Blocks the calling thread for at most `timeout`.
    fn bulk_in(
        &self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransferError>;

    /// Non-blocking bulk OUT submission.
    ///
    /// On success, ownership of `data` and `on_complete` passes to the
    /// in-flight transfer; `on_complete` runs once the bus finishes with
    /// it. On failure both are dropped before the error is returned, so
    /// there is nothing left to leak.
    fn submit_bulk_out(
        &self,
        endpoint: u8,
        data: Vec<u8>,
        on_complete: WriteCompletion,
    ) -> Result<(), TransferError>;
}
