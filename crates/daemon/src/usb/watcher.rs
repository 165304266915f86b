//! Bus watcher thread
//!
//! Owns the libusb context: enumerates devices already present, registers
//! hotplug callbacks, pumps `handle_events`, and turns bus announcements
//! into registry attach/detach calls. The hotplug callbacks themselves do
//! no USB work; they only forward events into the watcher loop.

use crate::usb::device::RusbLinker;
use driver::LinkerRegistry;
use hostbus::InterfaceId;
use rusb::{Context, Device, Hotplug, HotplugBuilder, Registration, UsbContext};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

enum HotplugEvent {
    Arrived(Device<Context>),
    Left { bus_number: u8, address: u8 },
}

/// Forwards hotplug callbacks into the watcher loop. Runs inside
/// `handle_events`, so it must not touch the device itself.
struct HotplugForwarder {
    tx: mpsc::Sender<HotplugEvent>,
}

impl Hotplug<Context> for HotplugForwarder {
    fn device_arrived(&mut self, device: Device<Context>) {
        debug!(
            "Hotplug: device arrived (bus={:03}, addr={:03})",
            device.bus_number(),
            device.address()
        );
        let _ = self.tx.send(HotplugEvent::Arrived(device));
    }

    fn device_left(&mut self, device: Device<Context>) {
        debug!(
            "Hotplug: device left (bus={:03}, addr={:03})",
            device.bus_number(),
            device.address()
        );
        let _ = self.tx.send(HotplugEvent::Left {
            bus_number: device.bus_number(),
            address: device.address(),
        });
    }
}

/// The bus watcher: libusb event pump plus hotplug handling.
pub struct BusWatcher {
    context: Context,
    registry: Arc<LinkerRegistry>,
    events: mpsc::Receiver<HotplugEvent>,
    shutdown: Arc<AtomicBool>,
    _registration: Option<Registration<Context>>,
}

impl BusWatcher {
    fn new(registry: Arc<LinkerRegistry>, shutdown: Arc<AtomicBool>) -> Result<Self, rusb::Error> {
        let context = Context::new()?;
        let (tx, rx) = mpsc::channel();

        // Register before the initial scan so nothing slips between them;
        // duplicates are collapsed by the registry
        let registration = if rusb::has_hotplug() {
            let forwarder = HotplugForwarder { tx };
            Some(
                HotplugBuilder::new()
                    .enumerate(false)
                    .register(&context, Box::new(forwarder))?,
            )
        } else {
            warn!("Hotplug not supported here; only devices present at startup will be seen");
            None
        };

        Ok(Self {
            context,
            registry,
            events: rx,
            shutdown,
            _registration: registration,
        })
    }

    fn run(self, ready_tx: mpsc::Sender<()>) -> Result<(), rusb::Error> {
        info!("Bus watcher started");

        // Pick up linkers that were already plugged in
        for device in self.context.devices()?.iter() {
            self.try_attach(device);
        }
        let _ = ready_tx.send(());

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.context.handle_events(Some(Duration::from_millis(100))) {
                Ok(()) => {}
                Err(rusb::Error::Interrupted) => {
                    debug!("Bus event handling interrupted");
                }
                Err(e) => {
                    warn!("Error handling bus events: {}", e);
                    thread::sleep(Duration::from_millis(100));
                }
            }

            while let Ok(event) = self.events.try_recv() {
                match event {
                    HotplugEvent::Arrived(device) => self.try_attach(device),
                    HotplugEvent::Left {
                        bus_number,
                        address,
                    } => {
                        let interface = InterfaceId {
                            bus_number,
                            address,
                        };
                        if let Err(e) = self.registry.detach(interface) {
                            // A device we never claimed left the bus
                            debug!(?interface, "Ignoring departure: {}", e);
                        }
                    }
                }
            }
        }

        // Drop the bus association of everything still published
        self.registry.detach_all();
        info!("Bus watcher stopped");
        Ok(())
    }

    /// Attach one announced device, if the id table claims it.
    fn try_attach(&self, device: Device<Context>) {
        let descriptor = match device.device_descriptor() {
            Ok(d) => d,
            Err(e) => {
                debug!(
                    "Skipping device without readable descriptor (bus={:03}, addr={:03}): {}",
                    device.bus_number(),
                    device.address(),
                    e
                );
                return;
            }
        };

        // Only devices in the id table are ever opened
        if !self
            .registry
            .device_table()
            .matches(descriptor.vendor_id(), descriptor.product_id())
        {
            return;
        }

        match RusbLinker::open(&device) {
            Ok(linker) => match self.registry.attach(Arc::new(linker)) {
                Ok(minor) => debug!(minor, "Linker attached"),
                Err(e) => warn!("Attach failed: {}", e),
            },
            Err(e) => warn!(
                "Failed to open linker at bus {:03} device {:03}: {}",
                device.bus_number(),
                device.address(),
                e
            ),
        }
    }
}

/// Spawn the bus watcher thread.
///
/// The returned receiver fires once after the initial scan, so one-shot
/// callers (--list-linkers) can wait for a complete picture.
pub fn spawn_bus_watcher(
    registry: Arc<LinkerRegistry>,
    shutdown: Arc<AtomicBool>,
) -> (
    thread::JoinHandle<Result<(), rusb::Error>>,
    mpsc::Receiver<()>,
) {
    let (ready_tx, ready_rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name("fax-bus".to_string())
        .spawn(move || {
            let watcher = BusWatcher::new(registry, shutdown)?;
            watcher.run(ready_tx)
        })
        .expect("Failed to spawn bus watcher thread");
    (handle, ready_rx)
}
