use crate::domain::models::{
    AppEvent, BluetoothCommand, DeviceIdentity, DeviceStateSnapshot, LinkState, MessageSeverity,
    StatusMessage,
};
use crate::presentation::{panels, theme};
use eframe::egui;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Entries kept in the on-screen log
pub const LOG_CAPACITY: usize = 100;

/// Editable copies of the device values shown by the controls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlState {
    pub light_on: bool,
    pub fan_speed: i32,
    pub fan_min: i32,
    pub fan_max: i32,
    pub light_on_hour: i32,
    pub light_off_hour: i32,
    pub range_error: Option<String>,
}

impl ControlState {
    pub fn from_snapshot(snapshot: &DeviceStateSnapshot) -> Self {
        Self {
            light_on: snapshot.light.on,
            fan_speed: i32::from(snapshot.fan.speed),
            fan_min: i32::from(snapshot.fan.min),
            fan_max: i32::from(snapshot.fan.max),
            light_on_hour: i32::from(snapshot.schedule.light_on_hour),
            light_off_hour: i32::from(snapshot.schedule.light_off_hour),
            range_error: None,
        }
    }
}

/// Range validity is checked here, not in the mirror
pub fn validate_fan_range(min: i32, max: i32) -> Result<(), String> {
    if min > max {
        return Err(format!("Minimum ({}%) must not exceed maximum ({}%)", min, max));
    }
    Ok(())
}

pub struct GrowTowerApp {
    pub(crate) commands: mpsc::UnboundedSender<BluetoothCommand>,
    pub(crate) events: mpsc::UnboundedReceiver<AppEvent>,

    pub(crate) link_state: LinkState,
    pub(crate) snapshot: DeviceStateSnapshot,
    pub(crate) controls: ControlState,
    pub(crate) discovered: Vec<DeviceIdentity>,

    pub(crate) log: VecDeque<StatusMessage>,
    pub(crate) status_message: Option<StatusMessage>,

    pub(crate) is_dark_mode: bool,
}

impl GrowTowerApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        commands: mpsc::UnboundedSender<BluetoothCommand>,
        events: mpsc::UnboundedReceiver<AppEvent>,
    ) -> Self {
        theme::configure_theme(&cc.egui_ctx, false);
        Self::with_channels(commands, events)
    }

    pub(crate) fn with_channels(
        commands: mpsc::UnboundedSender<BluetoothCommand>,
        events: mpsc::UnboundedReceiver<AppEvent>,
    ) -> Self {
        let snapshot = DeviceStateSnapshot::default();
        Self {
            commands,
            events,
            link_state: LinkState::Idle,
            controls: ControlState::from_snapshot(&snapshot),
            snapshot,
            discovered: Vec::new(),
            log: VecDeque::with_capacity(LOG_CAPACITY),
            status_message: None,
            is_dark_mode: false,
        }
    }

    pub(crate) fn send(&self, command: BluetoothCommand) {
        debug!("UI command {:?}", command);
        if self.commands.send(command).is_err() {
            tracing::error!("Bluetooth worker is gone");
        }
    }

    /// Whether a new connect or scan may be started
    pub(crate) fn can_start_attempt(&self) -> bool {
        matches!(self.link_state, LinkState::Idle | LinkState::Failed(_))
    }

    pub(crate) fn push_log(&mut self, message: StatusMessage) {
        if self.log.len() == LOG_CAPACITY {
            self.log.pop_front();
        }
        self.status_message = Some(message.clone());
        self.log.push_back(message);
    }

    pub(crate) fn apply_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::LinkState(state) => self.link_state = state,
            AppEvent::Snapshot(snapshot) => {
                self.controls = ControlState::from_snapshot(&snapshot);
                self.snapshot = snapshot;
            }
            AppEvent::DeviceFound(device) => {
                if !self.discovered.iter().any(|d| d.id == device.id) {
                    self.discovered.push(device);
                }
            }
            AppEvent::Disconnected { unsolicited } => {
                if unsolicited {
                    self.status_message = Some(StatusMessage::new(
                        "Connection lost. Press Connect to retry.",
                        MessageSeverity::Warning,
                    ));
                }
            }
            AppEvent::CommandFailed(reason) => {
                // Put the controls back on the last known-good values
                self.controls = ControlState::from_snapshot(&self.snapshot);
                self.status_message = Some(StatusMessage::new(reason, MessageSeverity::Error));
            }
            AppEvent::LogMessage(message) => self.push_log(message),
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.apply_event(event);
        }
    }
}

impl eframe::App for GrowTowerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events();
        ctx.request_repaint_after(Duration::from_millis(100));

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.label(egui::RichText::new("TOWER").strong());
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let switch_icon = if self.is_dark_mode {
                        "☀ Light"
                    } else {
                        "🌙 Dark"
                    };
                    if ui.button(switch_icon).clicked() {
                        self.is_dark_mode = !self.is_dark_mode;
                        theme::configure_theme(ctx, self.is_dark_mode);
                    }
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.vertical_centered(|ui| {
                    ui.set_max_width(720.0);
                    ui.add_space(20.0);
                    panels::render(self, ui);
                    ui.add_space(50.0);
                });
            });
        });
    }
}
