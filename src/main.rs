mod domain;
mod infrastructure;
mod presentation;

use crate::domain::settings::SettingsService;
use crate::infrastructure::bluetooth::connection::ConnectionConfig;
use crate::infrastructure::bluetooth::simulated::{SimulatedTower, SimulationConfig};
use crate::infrastructure::bluetooth::transport::LinkTransport;
use crate::infrastructure::bluetooth::{native_transport, worker, TowerService};
use crate::infrastructure::event_log::EventLog;
use crate::presentation::GrowTowerApp;
use anyhow::Context;
use eframe::egui;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

fn select_transport(simulate: bool, log: &EventLog) -> Arc<dyn LinkTransport> {
    if !simulate {
        match native_transport() {
            Ok(transport) => return transport,
            Err(e) => log.warning(format!("{}, falling back to the simulated TOWER", e)),
        }
    }
    log.info("Using the simulated TOWER");
    Arc::new(SimulatedTower::new(SimulationConfig::default()))
}

fn main() -> anyhow::Result<()> {
    let simulate_flag = std::env::args().skip(1).any(|arg| arg == "--simulate");

    let mut settings_service = SettingsService::new().context("Failed to load settings")?;
    let first_run = !settings_service.path().exists();

    let _logging_guard = infrastructure::logging::init_logger(&settings_service.get().log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!("Starting Grow Tower Controller");
    if first_run {
        // Leave an editable file behind
        match settings_service.save() {
            Ok(()) => info!("Wrote default settings to {}", settings_service.path().display()),
            Err(e) => warn!("Could not write default settings: {}", e),
        }
    }
    if simulate_flag {
        settings_service.get_mut().simulate_device = true;
    }
    let settings = settings_service.get().clone();

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let log = EventLog::new(event_tx);

    let transport = select_transport(settings.simulate_device, &log);
    let service = TowerService::new(transport, ConnectionConfig::from(&settings), log.clone());
    let bluetooth_thread = worker::spawn(service, command_rx, log)?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([760.0, 820.0])
            .with_title("Grow Tower Controller"),
        ..Default::default()
    };

    eframe::run_native(
        "Grow Tower Controller",
        options,
        Box::new(move |cc| Ok(Box::new(GrowTowerApp::new(cc, command_tx, event_rx)))),
    )
    .map_err(|e| anyhow::anyhow!("UI error: {}", e))?;

    // The app owned the command sender; the worker disconnects and exits
    if bluetooth_thread.join().is_err() {
        warn!("Bluetooth thread panicked");
    }
    info!("Shutdown complete");
    Ok(())
}
