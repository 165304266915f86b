//! Core driver for the Visoly GBA Flash Advance Xtreme USB cartridge linker
//!
//! The linker is a bulk-transfer peripheral: one bulk IN and one bulk OUT
//! endpoint carrying raw bytes, with no protocol interpreted at this layer.
//! This crate owns everything between the bus and the file interface:
//!
//! - the per-linker [`DeviceRecord`] with its reference-counted lifetime,
//! - endpoint [`discovery`] over the active interface descriptors,
//! - the [`LinkerRegistry`] driving attach/open/release/detach and the
//!   minor-number window,
//! - the blocking read path and fire-and-forget write path in
//!   [`transfers`],
//! - the [`worker`] thread serving file-interface commands from the
//!   channel bridge.
//!
//! The bus itself stays behind the `hostbus::BusDevice` trait; the daemon
//! plugs in rusb, the tests plug in a mock.

pub mod discovery;
pub mod record;
pub mod registry;
pub mod table;
pub mod transfers;
pub mod worker;

pub use discovery::{DiscoveredEndpoints, discover_endpoints};
pub use record::{DeviceRecord, TransferStats};
pub use registry::{FLASH_ADVANCE_MINOR_BASE, LinkerRegistry, MAX_LINKERS};
pub use table::{
    DeviceFilter, DeviceTable, FLASH_ADVANCE_BARE_PRODUCT_ID, FLASH_ADVANCE_PRODUCT_ID,
    VISOLY_VENDOR_ID,
};
pub use transfers::READ_TIMEOUT;
pub use worker::{DriverWorkerThread, spawn_driver_worker};
