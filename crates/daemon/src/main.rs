//! falinkd, the user-space driver daemon for the Visoly GBA Flash Advance
//! Xtreme USB cartridge linker.
//!
//! Exposes attached linkers through open/read/write/close semantics over
//! the channel bridge: raw bulk byte transport, nothing interpreted.

mod config;
mod service;
mod usb;

use anyhow::{Context, Result};
use clap::Parser;
use common::{DriverBridge, DriverCommand, DriverEvent, create_driver_bridge, setup_logging};
use driver::{LinkerRegistry, spawn_driver_worker};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::signal;
use tracing::{error, info};
use usb::spawn_bus_watcher;

#[derive(Parser, Debug)]
#[command(name = "falinkd")]
#[command(
    author,
    version,
    about = "User-space driver for the Visoly Flash Advance Xtreme cartridge linker"
)]
#[command(long_about = "
Driver daemon for the Visoly GBA Flash Advance Xtreme USB cartridge linker.
Watches the bus for linkers, publishes each one under a fax<N> node, and
carries raw bulk transfers between clients and the cartridge.

EXAMPLES:
    # Run with default config
    falinkd

    # Run with custom config
    falinkd --config /path/to/falinkd.toml

    # List attached linkers and exit
    falinkd --list-linkers

    # Run as a systemd service
    falinkd --service

CONFIGURATION:
    The daemon looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/falink/falinkd.toml
    3. /etc/falink/falinkd.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to the default location and exit
    #[arg(long)]
    save_config: bool,

    /// Run as a systemd service (sd-notify lifecycle, compact logs)
    #[arg(long)]
    service: bool,

    /// List attached linkers and exit
    #[arg(long)]
    list_linkers: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = config::DaemonConfig::default();
        let path = config::DaemonConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        config::DaemonConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        config::DaemonConfig::load_or_default()
    };

    let service_mode = args.service || config.daemon.service_mode;
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.daemon.log_level);
    setup_logging(log_level, service_mode).context("Failed to setup logging")?;

    info!("falinkd v{}", env!("CARGO_PKG_VERSION"));

    let table = config.device_table().context("Invalid device filters")?;

    // Wire the driver together: bridge, registry, worker, bus watcher
    let (bridge, worker) = create_driver_bridge();
    let registry = Arc::new(LinkerRegistry::with_minor_window(
        worker.event_tx.clone(),
        table,
        config.usb.minor_base,
        config.usb.max_linkers,
    ));

    let worker_handle = spawn_driver_worker(registry.clone(), worker);

    let shutdown = Arc::new(AtomicBool::new(false));
    let (watcher_handle, bus_ready) = spawn_bus_watcher(registry.clone(), shutdown.clone());

    // Operator-visible attach/detach log lines
    let event_bridge = bridge.clone();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = event_bridge.recv_event().await {
            match event {
                DriverEvent::LinkerAttached { info } => {
                    info!(
                        "USB Visoly Flash Advance Xtreme now attached ({})",
                        info.node
                    );
                }
                DriverEvent::LinkerDetached { node, .. } => {
                    info!("USB Visoly Flash Advance Xtreme now disconnected ({})", node);
                }
            }
        }
    });

    let result = if args.list_linkers {
        // Wait for the initial bus scan so the listing is complete
        let _ = tokio::task::spawn_blocking(move || {
            bus_ready.recv_timeout(std::time::Duration::from_secs(5))
        })
        .await;
        list_linkers_mode(bridge.clone()).await
    } else if service_mode {
        run_service().await
    } else {
        info!("Press Ctrl+C to shutdown");
        wait_for_ctrl_c().await;
        Ok(())
    };

    // Cleanup: stop the bus watcher and the driver worker
    info!("Shutting down driver...");
    shutdown.store(true, Ordering::SeqCst);
    if let Err(e) = bridge.send_command(DriverCommand::Shutdown).await {
        error!("Failed to send shutdown command: {}", e);
    }
    if let Err(e) = worker_handle.join() {
        error!("Driver worker thread panicked: {:?}", e);
    }
    match watcher_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Bus watcher failed: {}", e),
        Err(e) => error!("Bus watcher thread panicked: {:?}", e),
    }
    event_task.abort();

    let stats = registry.stats();
    info!(
        "Write path totals: {} submitted, {} completed, {} completion errors",
        stats.writes_submitted(),
        stats.writes_completed(),
        stats.write_errors()
    );

    result
}

/// List attached linkers and exit.
async fn list_linkers_mode(bridge: DriverBridge) -> Result<()> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    bridge
        .send_command(DriverCommand::ListLinkers { response: tx })
        .await
        .context("Failed to send ListLinkers command")?;

    let linkers = rx.await.context("Failed to receive linker list")?;

    if linkers.is_empty() {
        println!("No linkers attached.");
    } else {
        println!("Found {} linker(s):\n", linkers.len());
        for linker in linkers {
            println!(
                "  {}  {:04x}:{:04x}  bus {:03} device {:03}",
                linker.node, linker.vendor_id, linker.product_id, linker.bus_number, linker.address
            );
            println!(
                "      bulk-in {:#04x} ({} bytes), bulk-out {:#04x}, minor {}",
                linker.bulk_in, linker.bulk_in_capacity, linker.bulk_out, linker.minor
            );
            println!();
        }
    }

    Ok(())
}

/// Run under systemd until Ctrl+C / SIGTERM-equivalent.
async fn run_service() -> Result<()> {
    info!("Running in service mode");
    if service::is_systemd() {
        info!("Running under systemd");
    }

    let watchdog_handle = service::spawn_watchdog_task()
        .await
        .context("Failed to spawn watchdog task")?;

    service::notify_ready().context("Failed to notify systemd ready")?;
    service::notify_status("Running - waiting for linkers")
        .context("Failed to send status to systemd")?;

    info!("Press Ctrl+C to shutdown");
    wait_for_ctrl_c().await;

    service::notify_stopping().context("Failed to notify systemd stopping")?;
    watchdog_handle.abort();
    Ok(())
}

async fn wait_for_ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
        Err(e) => error!("Error waiting for Ctrl+C: {}", e),
    }
}
