//! USB bus integration
//!
//! The rusb-backed side of the driver: the [`RusbLinker`] device adapter
//! and the bus watcher thread that pumps libusb events, tracks hotplug,
//! and drives the registry's attach/detach lifecycle.
//!
//! Blocking libusb work stays on the watcher thread and the per-transfer
//! threads the adapter spawns; nothing here touches the tokio runtime.

pub mod device;
pub mod watcher;

pub use device::RusbLinker;
pub use watcher::spawn_bus_watcher;
