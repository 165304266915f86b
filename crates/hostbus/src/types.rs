//! Bus and driver identity types
//!
//! Descriptor and handle types shared between the driver core, the rusb
//! adapter, and the file-interface bridge.

/// Identity of one attached interface association on the bus.
///
/// Stable from the attach event until the matching detach event; used as
/// the lookup key when the bus reports that a device has left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceId {
    /// Bus number the device sits on
    pub bus_number: u8,
    /// Device address on that bus
    pub address: u8,
}

/// Cached identity of the underlying bus device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusDeviceInfo {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Bus number
    pub bus_number: u8,
    /// Device address on the bus
    pub address: u8,
}

impl BusDeviceInfo {
    pub fn interface_id(&self) -> InterfaceId {
        InterfaceId {
            bus_number: self.bus_number,
            address: self.address,
        }
    }
}

/// Endpoint direction, encoded in bit 7 of the endpoint address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Device to host
    In,
    /// Host to device
    Out,
}

/// Endpoint transfer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// Direction bit in an endpoint address.
pub const ENDPOINT_DIR_IN: u8 = 0x80;

/// One endpoint as declared by the active interface descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// Endpoint address, direction bit included (e.g. 0x81 = EP1 IN)
    pub address: u8,
    /// Declared transfer type
    pub transfer: TransferKind,
    /// wMaxPacketSize
    pub max_packet_size: u16,
}

impl EndpointDescriptor {
    pub fn direction(&self) -> Direction {
        if self.address & ENDPOINT_DIR_IN != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

/// File-interface handle returned by a successful open.
///
/// Valid until the matching release; never reused while open. All read and
/// write traffic is addressed by handle, not by device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(pub u32);

/// Listing/event payload describing one published linker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkerInfo {
    /// Allocated minor number
    pub minor: u8,
    /// Device node name derived from the minor slot (`fax0`, `fax1`, ...)
    pub node: String,
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Bus number
    pub bus_number: u8,
    /// Device address on the bus
    pub address: u8,
    /// Bulk IN endpoint address
    pub bulk_in: u8,
    /// Bulk OUT endpoint address
    pub bulk_out: u8,
    /// Read staging buffer capacity (bulk IN wMaxPacketSize)
    pub bulk_in_capacity: usize,
    /// Current reference count (bus association + open handles)
    pub references: u32,
}
