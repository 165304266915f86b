//! Common utilities for falink
//!
//! Shared plumbing between the driver core and the daemon: the workspace
//! error type, logging setup, the async channel bridge between the tokio
//! runtime and the driver worker thread, and the mock bus device used by
//! the test suites.

pub mod channel;
pub mod error;
pub mod logging;
pub mod test_utils;

pub use channel::{DriverBridge, DriverCommand, DriverEvent, DriverWorker, create_driver_bridge};
pub use error::{Error, Result};
pub use logging::setup_logging;
