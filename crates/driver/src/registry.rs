//! Linker lifecycle registry
//!
//! Process-wide registration state, built explicitly at startup and torn
//! down explicitly at shutdown. The registry owns the publish tables the
//! file interface looks records up in, the open-handle table, the minor
//! number window, and the driver's id table. The bus watcher drives
//! `attach`/`detach`; the worker thread drives everything else.

use crate::discovery::discover_endpoints;
use crate::record::{DeviceRecord, TransferStats};
use crate::table::DeviceTable;
use common::DriverEvent;
use hostbus::{BusDevice, DriverError, FileHandle, InterfaceId, LinkerInfo};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// First minor number in the linker window, matching the historical char
/// device registration.
pub const FLASH_ADVANCE_MINOR_BASE: u8 = 192;

/// Number of minor slots in the window.
pub const MAX_LINKERS: u8 = 16;

/// Fixed-window minor allocator. Slots are handed out lowest-free-first
/// and returned at detach, so a replugged linker gets its node name back.
struct MinorAllocator {
    base: u8,
    used: Vec<bool>,
}

impl MinorAllocator {
    fn new(base: u8, count: u8) -> Self {
        Self {
            base,
            used: vec![false; count as usize],
        }
    }

    fn allocate(&mut self) -> Option<u8> {
        let slot = self.used.iter().position(|used| !used)?;
        self.used[slot] = true;
        Some(self.base + slot as u8)
    }

    fn free(&mut self, minor: u8) {
        let slot = (minor - self.base) as usize;
        if let Some(used) = self.used.get_mut(slot) {
            *used = false;
        }
    }

    fn node_name(&self, minor: u8) -> String {
        format!("fax{}", minor - self.base)
    }
}

struct RegistryInner {
    /// Published records, keyed by minor; what `open` resolves against
    published: HashMap<u8, Arc<DeviceRecord>>,
    /// Interface identity to minor, for detach lookup
    minors_by_interface: HashMap<InterfaceId, u8>,
    /// Live file handles
    open_handles: HashMap<FileHandle, Arc<DeviceRecord>>,
    minors: MinorAllocator,
    next_handle: u32,
}

/// The lifecycle manager for every attached linker.
///
/// All publish/unpublish and reference-count transitions happen under the
/// registry lock plus the per-record lock, so a concurrent `open` and
/// `detach` always agree on whether the record was still published.
pub struct LinkerRegistry {
    inner: Mutex<RegistryInner>,
    table: DeviceTable,
    stats: Arc<TransferStats>,
    event_tx: async_channel::Sender<DriverEvent>,
}

impl LinkerRegistry {
    /// Registry with the default minor window (base 192, 16 slots).
    pub fn new(event_tx: async_channel::Sender<DriverEvent>, table: DeviceTable) -> Self {
        Self::with_minor_window(event_tx, table, FLASH_ADVANCE_MINOR_BASE, MAX_LINKERS)
    }

    /// Registry with an explicit minor window.
    pub fn with_minor_window(
        event_tx: async_channel::Sender<DriverEvent>,
        table: DeviceTable,
        minor_base: u8,
        max_linkers: u8,
    ) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                published: HashMap::new(),
                minors_by_interface: HashMap::new(),
                open_handles: HashMap::new(),
                minors: MinorAllocator::new(minor_base, max_linkers),
                next_handle: 1,
            }),
            table,
            stats: Arc::new(TransferStats::default()),
            event_tx,
        }
    }

    /// The id table attach announcements are matched against.
    pub fn device_table(&self) -> &DeviceTable {
        &self.table
    }

    /// Shared write-path counters.
    pub fn stats(&self) -> Arc<TransferStats> {
        Arc::clone(&self.stats)
    }

    /// Handle a bus attach announcement.
    ///
    /// Matches the device against the id table, runs endpoint discovery,
    /// allocates the staging buffer and a minor slot, and publishes the
    /// record with one reference held for the bus association. On any
    /// failure every piece of partial state is released before returning
    /// and the device is left untouched.
    pub fn attach(&self, device: Arc<dyn BusDevice>) -> Result<u8, DriverError> {
        let bus_info = device.info();
        if !self.table.matches(bus_info.vendor_id, bus_info.product_id) {
            return Err(DriverError::UnsupportedDevice {
                vendor_id: bus_info.vendor_id,
                product_id: bus_info.product_id,
            });
        }

        let endpoints = discover_endpoints(&device.endpoints())?;

        let mut staging = Vec::new();
        staging
            .try_reserve_exact(endpoints.bulk_in_capacity)
            .map_err(|_| DriverError::OutOfMemory)?;
        staging.resize(endpoints.bulk_in_capacity, 0);

        let interface = bus_info.interface_id();
        let info;
        {
            let mut inner = self.inner.lock().unwrap();

            // The bus re-announced an interface we already hold
            if let Some(&minor) = inner.minors_by_interface.get(&interface) {
                debug!(?interface, minor, "attach for an already-published interface");
                return Ok(minor);
            }

            let minor = inner
                .minors
                .allocate()
                .ok_or(DriverError::MinorsExhausted)?;
            let node = inner.minors.node_name(minor);

            let record = Arc::new(DeviceRecord::new(
                minor,
                node,
                device,
                endpoints,
                staging,
                Arc::clone(&self.stats),
            ));
            info = record.info();
            inner.published.insert(minor, Arc::clone(&record));
            inner.minors_by_interface.insert(interface, minor);
        }

        info!(
            node = %info.node,
            "linker {:04x}:{:04x} published (bulk-in {:#04x}/{} bytes, bulk-out {:#04x})",
            info.vendor_id,
            info.product_id,
            info.bulk_in,
            info.bulk_in_capacity,
            info.bulk_out
        );
        let minor = info.minor;
        self.emit(DriverEvent::LinkerAttached { info });
        Ok(minor)
    }

    /// Handle a bus detach announcement.
    ///
    /// Unpublishes the record and frees its minor under the registry lock,
    /// marks the record retired, then drops the bus association's
    /// reference. Handles that are already open stay valid until their own
    /// release; anything they do from now on fails with `DeviceGone`.
    pub fn detach(&self, interface: InterfaceId) -> Result<(), DriverError> {
        let record = {
            let mut inner = self.inner.lock().unwrap();
            let minor = inner
                .minors_by_interface
                .remove(&interface)
                .ok_or(DriverError::NoSuchDevice)?;
            inner.minors.free(minor);
            inner
                .published
                .remove(&minor)
                .ok_or(DriverError::NoSuchDevice)?
        };

        record.retire();
        let minor = record.minor();
        let node = record.node().to_string();

        if record.release() {
            debug!(node = %node, "no open handles, record destroyed at detach");
        } else {
            debug!(node = %node, "open handles remain, destruction deferred");
        }

        self.emit(DriverEvent::LinkerDetached { minor, node });
        Ok(())
    }

    /// Detach every published linker. Shutdown-time teardown; open handles
    /// still drain through `release` as usual.
    pub fn detach_all(&self) {
        let interfaces: Vec<InterfaceId> = {
            let inner = self.inner.lock().unwrap();
            inner.minors_by_interface.keys().copied().collect()
        };
        for interface in interfaces {
            if let Err(e) = self.detach(interface) {
                warn!(?interface, "detach during teardown failed: {}", e);
            }
        }
    }

    /// Open the linker published under `minor`.
    pub fn open(&self, minor: u8) -> Result<FileHandle, DriverError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .published
            .get(&minor)
            .cloned()
            .ok_or(DriverError::NoSuchDevice)?;

        record.retain()?;

        let handle = FileHandle(inner.next_handle);
        inner.next_handle += 1;
        inner.open_handles.insert(handle, record);
        Ok(handle)
    }

    /// Release an open handle, destroying the record if it held the last
    /// reference.
    pub fn release(&self, handle: FileHandle) -> Result<(), DriverError> {
        let record = self
            .inner
            .lock()
            .unwrap()
            .open_handles
            .remove(&handle)
            .ok_or(DriverError::NoSuchDevice)?;

        if record.release() {
            debug!(node = record.node(), "last handle released, record destroyed");
        }
        Ok(())
    }

    /// Blocking read of up to `len` bytes through an open handle.
    pub fn read(&self, handle: FileHandle, len: usize) -> Result<Vec<u8>, DriverError> {
        let record = self.record_for(handle)?;

        let want = len.min(record.bulk_in_capacity());
        let mut dest = Vec::new();
        dest.try_reserve_exact(want)
            .map_err(|_| DriverError::OutOfMemory)?;
        dest.resize(want, 0);

        let got = record.read(&mut dest)?;
        dest.truncate(got);
        Ok(dest)
    }

    /// Fire-and-forget write through an open handle.
    pub fn write(&self, handle: FileHandle, data: &[u8]) -> Result<usize, DriverError> {
        self.record_for(handle)?.write(data)
    }

    /// Describe every published linker, ordered by minor.
    pub fn list(&self) -> Vec<LinkerInfo> {
        let mut linkers: Vec<LinkerInfo> = {
            let inner = self.inner.lock().unwrap();
            inner.published.values().map(|record| record.info()).collect()
        };
        linkers.sort_by_key(|info| info.minor);
        linkers
    }

    fn record_for(&self, handle: FileHandle) -> Result<Arc<DeviceRecord>, DriverError> {
        self.inner
            .lock()
            .unwrap()
            .open_handles
            .get(&handle)
            .cloned()
            .ok_or(DriverError::NoSuchDevice)
    }

    fn emit(&self, event: DriverEvent) {
        if let Err(e) = self.event_tx.send_blocking(event) {
            error!("failed to send driver event: {}", e);
        }
    }
}
