//! Device record and reference-counted lifecycle
//!
//! One [`DeviceRecord`] exists per attached linker, shared between the bus
//! side (hotplug attach/detach) and the file interface (open handles). The
//! record's lifetime is governed by an explicit reference count: one
//! reference for the bus association plus one per open handle. Destruction
//! happens inline at the exact zero transition, under the record lock;
//! the surrounding `Arc` only keeps the memory alive, never the resources.

use crate::discovery::DiscoveredEndpoints;
use hostbus::{BusDevice, BusDeviceInfo, DriverError, InterfaceId, LinkerInfo};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Registry-wide counters for the fire-and-forget write path.
///
/// Write completion failures never reach the caller of `write`; they end
/// up here instead, so the daemon can report them.
#[derive(Debug, Default)]
pub struct TransferStats {
    writes_submitted: AtomicU64,
    writes_completed: AtomicU64,
    write_errors: AtomicU64,
}

impl TransferStats {
    pub(crate) fn note_submitted(&self) {
        self.writes_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_completed(&self, failed: bool) {
        self.writes_completed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.write_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn writes_submitted(&self) -> u64 {
        self.writes_submitted.load(Ordering::Relaxed)
    }

    pub fn writes_completed(&self) -> u64 {
        self.writes_completed.load(Ordering::Relaxed)
    }

    pub fn write_errors(&self) -> u64 {
        self.write_errors.load(Ordering::Relaxed)
    }
}

pub(crate) struct RecordState {
    /// Active holders: the bus association plus every open handle
    refs: u32,
    /// Set once detach has begun; no new I/O may start
    retired: bool,
    /// Set exactly once, at the zero transition
    destroyed: bool,
    /// Retained bus-device reference, dropped at destruction
    device: Option<Arc<dyn BusDevice>>,
}

/// In-memory state for one attached linker.
pub struct DeviceRecord {
    minor: u8,
    node: String,
    interface: InterfaceId,
    bus_info: BusDeviceInfo,
    pub(crate) bulk_in: u8,
    pub(crate) bulk_out: u8,
    bulk_in_capacity: usize,
    pub(crate) stats: Arc<TransferStats>,
    state: Mutex<RecordState>,
    /// Staging buffer for bulk IN transfers, reused across reads. The
    /// mutex is what serializes overlapping reads on this record.
    pub(crate) staging: Mutex<Vec<u8>>,
}

impl DeviceRecord {
    pub(crate) fn new(
        minor: u8,
        node: String,
        device: Arc<dyn BusDevice>,
        endpoints: DiscoveredEndpoints,
        staging: Vec<u8>,
        stats: Arc<TransferStats>,
    ) -> Self {
        let bus_info = device.info();
        Self {
            minor,
            node,
            interface: bus_info.interface_id(),
            bus_info,
            bulk_in: endpoints.bulk_in,
            bulk_out: endpoints.bulk_out,
            bulk_in_capacity: endpoints.bulk_in_capacity,
            stats,
            state: Mutex::new(RecordState {
                refs: 1,
                retired: false,
                destroyed: false,
                device: Some(device),
            }),
            staging: Mutex::new(staging),
        }
    }

    pub fn minor(&self) -> u8 {
        self.minor
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn interface(&self) -> InterfaceId {
        self.interface
    }

    pub fn bulk_in_capacity(&self) -> usize {
        self.bulk_in_capacity
    }

    pub fn reference_count(&self) -> u32 {
        self.state.lock().unwrap().refs
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().unwrap().destroyed
    }

    pub fn info(&self) -> LinkerInfo {
        LinkerInfo {
            minor: self.minor,
            node: self.node.clone(),
            vendor_id: self.bus_info.vendor_id,
            product_id: self.bus_info.product_id,
            bus_number: self.bus_info.bus_number,
            address: self.bus_info.address,
            bulk_in: self.bulk_in,
            bulk_out: self.bulk_out,
            bulk_in_capacity: self.bulk_in_capacity,
            references: self.reference_count(),
        }
    }

    /// Take an additional reference for a new open handle.
    ///
    /// Fails once detach has begun; the registry's publish lock means this
    /// is only reachable for a published record, but the retired check
    /// keeps the contract honest on its own.
    pub(crate) fn retain(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        if state.retired {
            return Err(DriverError::NoSuchDevice);
        }
        state.refs += 1;
        Ok(())
    }

    /// Mark the record retired: detach has begun, no new I/O may start.
    pub(crate) fn retire(&self) {
        self.state.lock().unwrap().retired = true;
    }

    /// Drop one reference. Returns true when this call destroyed the
    /// record: the retained bus-device reference and the staging buffer
    /// are released right here, exactly once.
    pub(crate) fn release(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        assert!(state.refs > 0, "release on a dead device record");
        state.refs -= 1;
        if state.refs > 0 {
            return false;
        }

        state.destroyed = true;
        state.device = None;
        // An in-flight read still holds the staging lock until it has
        // copied out; the buffer is freed only after that.
        let mut staging = self.staging.lock().unwrap();
        *staging = Vec::new();
        debug!(minor = self.minor, node = %self.node, "device record destroyed");
        true
    }

    /// Clone the retained bus-device reference for an I/O operation.
    pub(crate) fn live_device(&self) -> Result<Arc<dyn BusDevice>, DriverError> {
        let state = self.state.lock().unwrap();
        if state.retired {
            return Err(DriverError::DeviceGone);
        }
        state.device.clone().ok_or(DriverError::NoSuchDevice)
    }
}
