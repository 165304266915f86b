//! Error vocabulary shared across the workspace

use thiserror::Error;

/// Bus-level transfer status codes.
///
/// These mirror the host stack's completion codes; the rusb adapter maps
/// libusb errors onto them, the mock device produces them directly.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    /// Transfer did not complete within its timeout
    #[error("transfer timed out")]
    Timeout,

    /// Endpoint stalled
    #[error("endpoint stalled")]
    Stall,

    /// Device left the bus
    #[error("device disconnected")]
    Disconnected,

    /// Device or endpoint not found
    #[error("device or endpoint not found")]
    NotFound,

    /// Resource busy
    #[error("resource busy")]
    Busy,

    /// Device returned more data than the request could hold
    #[error("transfer overflow")]
    Overflow,

    /// Low-level I/O error
    #[error("bus i/o error")]
    Io,

    /// Malformed transfer parameters
    #[error("invalid transfer parameter")]
    InvalidParam,

    /// Insufficient permissions on the device node
    #[error("access denied")]
    Denied,

    /// Transfer was unlinked before completion
    #[error("transfer cancelled")]
    Cancelled,

    /// Host controller is shutting down
    #[error("host controller shut down")]
    Shutdown,
}

/// The driver's error surface.
///
/// Everything open/read/write/release and the attach path can produce.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// Allocation failed
    #[error("out of memory")]
    OutOfMemory,

    /// The interface declares no usable bulk IN / bulk OUT endpoint pair
    #[error("could not find both bulk-in and bulk-out endpoints")]
    MissingEndpoints,

    /// No published linker for this identity, or the handle is stale
    #[error("no such device")]
    NoSuchDevice,

    /// The linker was unplugged while the handle was open
    #[error("device has been disconnected")]
    DeviceGone,

    /// Device does not match the driver's id table
    #[error("unsupported device {vendor_id:#06x}:{product_id:#06x}")]
    UnsupportedDevice { vendor_id: u16, product_id: u16 },

    /// No free slot in the minor number window
    #[error("no free minor number for this device")]
    MinorsExhausted,

    /// Blocking bulk-in transfer failed
    #[error("bulk read failed: {0}")]
    TransferFailed(TransferError),

    /// Bulk-out submission was rejected
    #[error("failed to submit bulk write: {0}")]
    SubmitFailed(TransferError),

    /// Copy between the staging buffer and the caller's buffer failed
    #[error("buffer copy fault")]
    CopyFault,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DriverError::UnsupportedDevice {
            vendor_id: 0x5655,
            product_id: 0x4149,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("0x5655"));
        assert!(msg.contains("0x4149"));
    }

    #[test]
    fn test_transfer_code_carried_through() {
        let err = DriverError::TransferFailed(TransferError::Timeout);
        assert_eq!(err, DriverError::TransferFailed(TransferError::Timeout));
        assert!(format!("{}", err).contains("timed out"));
    }
}
