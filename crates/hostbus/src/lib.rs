//! Host-bus contract for falink
//!
//! This crate defines the boundary between the linker driver core and the
//! host USB stack: descriptor and identity types, the [`BusDevice`] trait
//! the driver performs all transfers through, and the error vocabulary
//! shared across the workspace.
//!
//! The daemon implements [`BusDevice`] over rusb; the test suites implement
//! it over an in-memory mock. The driver core never sees either directly.

pub mod device;
pub mod error;
pub mod types;

pub use device::{BusDevice, WriteCompletion};
pub use error::{DriverError, TransferError};
pub use types::{
    BusDeviceInfo, Direction, EndpointDescriptor, FileHandle, InterfaceId, LinkerInfo,
    TransferKind,
};
