//! Bluetooth worker
//!
//! Owns the [`TowerService`] on a dedicated thread with a current-thread
//! runtime. Commands are handled one at a time; while a connect or scan is
//! suspended the command channel is still drained so a disconnect can cancel
//! it.

use crate::domain::models::{AppEvent, BluetoothCommand, DeviceIdentity};
use crate::infrastructure::bluetooth::service::TowerService;
use crate::infrastructure::event_log::EventLog;
use anyhow::{Context, Result};
use std::future::Future;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub struct TowerWorker {
    service: TowerService,
    commands: mpsc::UnboundedReceiver<BluetoothCommand>,
    log: EventLog,
}

/// Outcome of waiting on a cancellable step
enum Attempt<T> {
    Finished(T),
    /// Disconnect requested, or the command channel closed
    Aborted { shutdown: bool },
}

impl TowerWorker {
    pub fn new(
        service: TowerService,
        commands: mpsc::UnboundedReceiver<BluetoothCommand>,
        log: EventLog,
    ) -> Self {
        Self {
            service,
            commands,
            log,
        }
    }

    /// Run until the command channel closes, then tear the link down
    pub async fn run(mut self) {
        let mut changes = self.service.subscribe();
        self.log.emit(AppEvent::Snapshot(self.service.snapshot()));
        self.log.emit(AppEvent::LinkState(self.service.state()));

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    if !self.handle(command).await {
                        break;
                    }
                }
                _ = self.service.wait_for_link_drop() => {
                    self.service.handle_unsolicited_drop().await;
                }
                Some(snapshot) = changes.recv() => {
                    self.log.emit(AppEvent::Snapshot(snapshot));
                }
            }
            // Forward anything published while a command was running
            while let Some(snapshot) = changes.try_recv() {
                self.log.emit(AppEvent::Snapshot(snapshot));
            }
        }

        info!("Command channel closed, shutting down Bluetooth worker");
        self.service.disconnect().await;
    }

    /// Returns `false` once the worker should stop
    async fn handle(&mut self, command: BluetoothCommand) -> bool {
        debug!("Handling {:?}", command);
        match command {
            BluetoothCommand::Connect if self.service.config().scan_all => {
                self.discover_all().await
            }
            BluetoothCommand::Connect => {
                let attempt = abortable(self.service.connect(), &mut self.commands, &self.log).await;
                self.settle(attempt).await
            }
            BluetoothCommand::DiscoverAll => self.discover_all().await,
            BluetoothCommand::ConnectTo(device) => self.connect_to(device).await,
            BluetoothCommand::Disconnect => {
                self.service.disconnect().await;
                true
            }
            // Failures are already reported by the service
            BluetoothCommand::ReadAll => {
                let _ = self.service.read_all().await;
                true
            }
            BluetoothCommand::SetLight(on) => {
                let _ = self.service.set_light(on).await;
                true
            }
            BluetoothCommand::ToggleLight => {
                let _ = self.service.toggle_light().await;
                true
            }
            BluetoothCommand::SetFanSpeed(speed) => {
                let _ = self.service.set_fan_speed(speed).await;
                true
            }
            BluetoothCommand::SetFanRange(min, max) => {
                let _ = self.service.set_fan_range(min, max).await;
                true
            }
            BluetoothCommand::SetSchedule(on_hour, off_hour) => {
                let _ = self.service.set_schedule(on_hour, off_hour).await;
                true
            }
        }
    }

    async fn discover_all(&mut self) -> bool {
        let attempt =
            abortable(self.service.discover_all(), &mut self.commands, &self.log).await;
        self.settle(attempt).await
    }

    async fn connect_to(&mut self, device: DeviceIdentity) -> bool {
        let attempt =
            abortable(self.service.connect_to(device), &mut self.commands, &self.log).await;
        self.settle(attempt).await
    }

    async fn settle<T, E: std::fmt::Display>(&mut self, attempt: Attempt<Result<T, E>>) -> bool {
        match attempt {
            Attempt::Finished(Ok(_)) => true,
            Attempt::Finished(Err(e)) => {
                // Lifecycle failures were logged on the way to Idle
                debug!("Attempt ended: {}", e);
                true
            }
            Attempt::Aborted { shutdown } => {
                self.log.warning("Connection attempt cancelled");
                self.service.disconnect().await;
                !shutdown
            }
        }
    }
}

/// Drive `step` while rejecting every command except `Disconnect`
async fn abortable<F: Future>(
    step: F,
    commands: &mut mpsc::UnboundedReceiver<BluetoothCommand>,
    log: &EventLog,
) -> Attempt<F::Output> {
    tokio::pin!(step);
    loop {
        tokio::select! {
            output = &mut step => return Attempt::Finished(output),
            command = commands.recv() => match command {
                Some(BluetoothCommand::Disconnect) => return Attempt::Aborted { shutdown: false },
                None => return Attempt::Aborted { shutdown: true },
                Some(other) => {
                    log.warning(format!("Busy, ignoring {:?}", other));
                }
            }
        }
    }
}

/// Start the worker on its own thread
pub fn spawn(
    service: TowerService,
    commands: mpsc::UnboundedReceiver<BluetoothCommand>,
    log: EventLog,
) -> Result<JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime for Bluetooth")?;

    std::thread::Builder::new()
        .name("bluetooth".to_string())
        .spawn(move || {
            runtime.block_on(TowerWorker::new(service, commands, log).run());
        })
        .context("Failed to spawn Bluetooth thread")
}
