//! Async channel bridge between the tokio runtime and the driver worker thread

use async_channel::{Receiver, Sender, bounded};
use hostbus::{DriverError, FileHandle, LinkerInfo};

/// File-interface commands from the tokio runtime to the driver worker.
///
/// Each command maps 1:1 onto a registry operation and carries a oneshot
/// sender for its reply.
#[derive(Debug)]
pub enum DriverCommand {
    /// List all published linkers
    ListLinkers {
        response: tokio::sync::oneshot::Sender<Vec<LinkerInfo>>,
    },

    /// Open the linker published under a minor number
    Open {
        minor: u8,
        response: tokio::sync::oneshot::Sender<Result<FileHandle, DriverError>>,
    },

    /// Blocking bulk read of up to `len` bytes
    Read {
        handle: FileHandle,
        len: usize,
        response: tokio::sync::oneshot::Sender<Result<Vec<u8>, DriverError>>,
    },

    /// Fire-and-forget bulk write; replies with the submitted length
    Write {
        handle: FileHandle,
        data: Vec<u8>,
        response: tokio::sync::oneshot::Sender<Result<usize, DriverError>>,
    },

    /// Release an open handle
    Release {
        handle: FileHandle,
        response: tokio::sync::oneshot::Sender<Result<(), DriverError>>,
    },

    /// Shut the worker thread down gracefully
    Shutdown,
}

/// Lifecycle events from the driver registry.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// A linker passed discovery and was published
    LinkerAttached {
        /// Full linker description, node name included
        info: LinkerInfo,
    },

    /// A linker was unpublished after a bus detach
    LinkerDetached {
        /// Minor the linker held; already returned to the pool
        minor: u8,
        /// Node name the linker was published under
        node: String,
    },
}

/// Handle for the tokio runtime (async side).
#[derive(Clone)]
pub struct DriverBridge {
    cmd_tx: Sender<DriverCommand>,
    event_rx: Receiver<DriverEvent>,
}

impl DriverBridge {
    /// Send a command to the driver worker.
    pub async fn send_command(&self, cmd: DriverCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive the next lifecycle event.
    pub async fn recv_event(&self) -> crate::Result<DriverEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Handle for the driver worker thread (blocking side).
pub struct DriverWorker {
    pub(crate) cmd_rx: Receiver<DriverCommand>,
    /// Event sender, cloned into the registry at startup
    pub event_tx: Sender<DriverEvent>,
}

impl DriverWorker {
    /// Receive a command from the tokio runtime (blocking).
    pub fn recv_command(&self) -> crate::Result<DriverCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Try to receive a command without blocking.
    pub fn try_recv_command(&self) -> Option<DriverCommand> {
        self.cmd_rx.try_recv().ok()
    }
}

/// Create the channel bridge between tokio and the driver worker thread.
///
/// Returns (DriverBridge for tokio, DriverWorker for the worker thread).
pub fn create_driver_bridge() -> (DriverBridge, DriverWorker) {
    let (cmd_tx, cmd_rx) = bounded(64);
    let (event_tx, event_rx) = bounded(64);

    (
        DriverBridge { cmd_tx, event_rx },
        DriverWorker { cmd_rx, event_tx },
    )
}
