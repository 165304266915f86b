//! Driver worker thread
//!
//! Dedicated thread serving file-interface commands from the channel
//! bridge and mapping them onto registry operations. Reads can block for
//! the full transfer timeout, so each one runs on its own short-lived
//! thread; everything else is quick and handled inline.

use crate::registry::LinkerRegistry;
use common::{DriverCommand, DriverWorker};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// The file-interface command loop.
pub struct DriverWorkerThread {
    registry: Arc<LinkerRegistry>,
    worker: DriverWorker,
}

impl DriverWorkerThread {
    pub fn new(registry: Arc<LinkerRegistry>, worker: DriverWorker) -> Self {
        Self { registry, worker }
    }

    /// Run until a Shutdown command arrives or the bridge closes.
    pub fn run(self) {
        info!("driver worker thread started");

        loop {
            match self.worker.recv_command() {
                Ok(DriverCommand::Shutdown) => {
                    info!("driver worker shutting down");
                    break;
                }
                Ok(cmd) => self.handle_command(cmd),
                Err(_) => {
                    debug!("command bridge closed, stopping worker");
                    break;
                }
            }
        }

        info!("driver worker thread stopped");
    }

    fn handle_command(&self, cmd: DriverCommand) {
        match cmd {
            DriverCommand::ListLinkers { response } => {
                let linkers = self.registry.list();
                debug!("listing {} linkers", linkers.len());
                let _ = response.send(linkers);
            }

            DriverCommand::Open { minor, response } => {
                let _ = response.send(self.registry.open(minor));
            }

            DriverCommand::Release { handle, response } => {
                let _ = response.send(self.registry.release(handle));
            }

            DriverCommand::Write {
                handle,
                data,
                response,
            } => {
                // Submission never blocks, so writes stay on the worker
                let _ = response.send(self.registry.write(handle, &data));
            }

            DriverCommand::Read {
                handle,
                len,
                response,
            } => {
                // A bulk read may block for the whole transfer timeout;
                // give it its own thread so open/close/write traffic and
                // other linkers keep moving
                let registry = Arc::clone(&self.registry);
                let spawned = thread::Builder::new()
                    .name("fax-read".to_string())
                    .spawn(move || {
                        let _ = response.send(registry.read(handle, len));
                    });
                if let Err(e) = spawned {
                    // The response sender went down with the closure; the
                    // caller observes a closed channel
                    warn!("failed to spawn read thread: {}", e);
                }
            }

            DriverCommand::Shutdown => {
                // Handled in the main loop
                unreachable!()
            }
        }
    }
}

/// Spawn the driver worker thread.
pub fn spawn_driver_worker(
    registry: Arc<LinkerRegistry>,
    worker: DriverWorker,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("fax-worker".to_string())
        .spawn(move || DriverWorkerThread::new(registry, worker).run())
        .expect("Failed to spawn driver worker thread")
}
