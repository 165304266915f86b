//! rusb-backed bus device
//!
//! Wraps an opened `rusb::DeviceHandle` behind the `hostbus::BusDevice`
//! trait: blocking bulk reads map straight onto `read_bulk`, and each
//! asynchronous write submission gets a short-lived thread that performs
//! the transfer and then runs the completion with the buffer it owns.

use hostbus::{
    BusDevice, BusDeviceInfo, EndpointDescriptor, TransferError, TransferKind, WriteCompletion,
};
use rusb::{Context, Device, DeviceHandle};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Bulk-out submissions carry no deadline of their own; the transfer ends
/// when the device accepts the data or the bus reports an error.
const WRITE_NO_TIMEOUT: Duration = Duration::ZERO;

/// One opened linker on the host bus.
pub struct RusbLinker {
    info: BusDeviceInfo,
    endpoints: Vec<EndpointDescriptor>,
    handle: Arc<DeviceHandle<Context>>,
    interface: u8,
}

impl RusbLinker {
    /// Open a matched device: detach any kernel driver from the first
    /// interface, claim it, and cache identity and endpoint layout.
    pub fn open(device: &Device<Context>) -> Result<Self, rusb::Error> {
        let descriptor = device.device_descriptor()?;
        let handle = device.open()?;

        let config = device.active_config_descriptor()?;
        let interface = config.interfaces().next().ok_or(rusb::Error::NotFound)?;
        let interface_number = interface.number();

        match handle.kernel_driver_active(interface_number) {
            Ok(true) => {
                debug!(
                    "Detaching kernel driver from interface {}",
                    interface_number
                );
                if let Err(e) = handle.detach_kernel_driver(interface_number) {
                    warn!(
                        "Failed to detach kernel driver from interface {}: {}",
                        interface_number, e
                    );
                }
            }
            Ok(false) => {}
            Err(e) => {
                debug!(
                    "Could not check kernel driver status for interface {}: {}",
                    interface_number, e
                );
            }
        }

        handle.claim_interface(interface_number)?;
        debug!(
            "Claimed interface {} on bus {:03} device {:03}",
            interface_number,
            device.bus_number(),
            device.address()
        );

        let endpoints = interface
            .descriptors()
            .next()
            .map(|alt| {
                alt.endpoint_descriptors()
                    .map(|ep| EndpointDescriptor {
                        address: ep.address(),
                        transfer: map_transfer_kind(ep.transfer_type()),
                        max_packet_size: ep.max_packet_size(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            info: BusDeviceInfo {
                vendor_id: descriptor.vendor_id(),
                product_id: descriptor.product_id(),
                bus_number: device.bus_number(),
                address: device.address(),
            },
            endpoints,
            handle: Arc::new(handle),
            interface: interface_number,
        })
    }
}

impl BusDevice for RusbLinker {
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
        self.handle
            .read_bulk(endpoint, buf, timeout)
            .map_err(map_rusb_error)
    }

    fn submit_bulk_out(
        &self,
        endpoint: u8,
        data: Vec<u8>,
        on_complete: WriteCompletion,
    ) -> Result<(), TransferError> {
        let handle = Arc::clone(&self.handle);
        let spawned = std::thread::Builder::new()
            .name("fax-write".to_string())
            .spawn(move || {
                let status = handle
                    .write_bulk(endpoint, &data, WRITE_NO_TIMEOUT)
                    .map_err(map_rusb_error);
                on_complete(status, data);
            });

        // If the thread cannot start, data and completion are dropped
        // right here and the submission reports failure
        spawned.map(|_| ()).map_err(|e| {
            warn!("Failed to spawn write thread: {}", e);
            TransferError::Io
        })
    }
}

impl Drop for RusbLinker {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(self.interface) {
            debug!("Failed to release interface {}: {}", self.interface, e);
        }
        if let Err(e) = self.handle.attach_kernel_driver(self.interface) {
            debug!(
                "Could not reattach kernel driver to interface {} (may not have been detached): {}",
                self.interface, e
            );
        }
    }
}

/// Map rusb transfer types onto the hostbus vocabulary.
fn map_transfer_kind(kind: rusb::TransferType) -> TransferKind {
    match kind {
        rusb::TransferType::Control => TransferKind::Control,
        rusb::TransferType::Isochronous => TransferKind::Isochronous,
        rusb::TransferType::Bulk => TransferKind::Bulk,
        rusb::TransferType::Interrupt => TransferKind::Interrupt,
    }
}

/// Map rusb errors onto bus-level transfer codes.
pub fn map_rusb_error(err: rusb::Error) -> TransferError {
    match err {
        rusb::Error::Timeout => TransferError::Timeout,
        rusb::Error::Pipe => TransferError::Stall,
        rusb::Error::NoDevice => TransferError::Disconnected,
        rusb::Error::NotFound => TransferError::NotFound,
        rusb::Error::Busy => TransferError::Busy,
        rusb::Error::Overflow => TransferError::Overflow,
        rusb::Error::InvalidParam => TransferError::InvalidParam,
        rusb::Error::Access => TransferError::Denied,
        rusb::Error::Interrupted => TransferError::Cancelled,
        _ => TransferError::Io,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_rusb_error() {
        assert_eq!(map_rusb_error(rusb::Error::Timeout), TransferError::Timeout);
        assert_eq!(map_rusb_error(rusb::Error::Pipe), TransferError::Stall);
        assert_eq!(
            map_rusb_error(rusb::Error::NoDevice),
            TransferError::Disconnected
        );
        assert_eq!(map_rusb_error(rusb::Error::Access), TransferError::Denied);
        assert_eq!(map_rusb_error(rusb::Error::Io), TransferError::Io);
        assert_eq!(map_rusb_error(rusb::Error::Other), TransferError::Io);
    }

    #[test]
    fn test_map_transfer_kind() {
        assert_eq!(
            map_transfer_kind(rusb::TransferType::Bulk),
            TransferKind::Bulk
        );
        assert_eq!(
            map_transfer_kind(rusb::TransferType::Interrupt),
            TransferKind::Interrupt
        );
    }
}
