use crate::domain::models::{BluetoothCommand, LinkState, MessageSeverity, StatusMessage};
use crate::presentation::app::{validate_fan_range, GrowTowerApp};
use crate::presentation::components::Components;
use eframe::egui;

pub fn render(app: &mut GrowTowerApp, ui: &mut egui::Ui) {
    Components::heading(ui, "Grow Tower");
    ui.add_space(16.0);

    ui_connection_panel(app, ui);
    ui.add_space(12.0);

    ui_controls_panel(app, ui);
    ui.add_space(12.0);

    ui_log_panel(app, ui);
}

fn banner_for(state: LinkState) -> (String, egui::Color32, egui::Color32) {
    match state {
        LinkState::Ready => (
            "CONNECTED".to_string(),
            egui::Color32::from_rgb(40, 170, 70),
            egui::Color32::BLACK,
        ),
        LinkState::Idle => (
            "DISCONNECTED".to_string(),
            egui::Color32::from_gray(110),
            egui::Color32::WHITE,
        ),
        LinkState::Failed(kind) => (
            format!("FAILED: {:?}", kind).to_uppercase(),
            egui::Color32::from_rgb(210, 50, 40),
            egui::Color32::WHITE,
        ),
        other => (
            format!("{}...", other).to_uppercase(),
            egui::Color32::from_rgb(240, 190, 20),
            egui::Color32::BLACK,
        ),
    }
}

fn ui_connection_panel(app: &mut GrowTowerApp, ui: &mut egui::Ui) {
    Components::card(ui, "Connection", |ui| {
        let (text, bg, fg) = banner_for(app.link_state);
        Components::status_banner(ui, &text, bg, fg);

        if let Some(name) = &app.snapshot.device_name {
            ui.label(format!("Device: {}", name));
        }
        ui.add_space(6.0);

        ui.horizontal(|ui| {
            let can_start = app.can_start_attempt();
            if ui
                .add_enabled(can_start, egui::Button::new("Connect"))
                .clicked()
            {
                app.send(BluetoothCommand::Connect);
            }
            if ui
                .add_enabled(can_start, egui::Button::new("Scan all devices"))
                .clicked()
            {
                app.discovered.clear();
                app.send(BluetoothCommand::DiscoverAll);
            }
            if ui
                .add_enabled(app.link_state != LinkState::Idle, egui::Button::new("Disconnect"))
                .clicked()
            {
                app.send(BluetoothCommand::Disconnect);
            }
            if app.link_state.is_attempt_in_progress() {
                ui.spinner();
            }
        });

        if !app.discovered.is_empty() {
            ui.separator();
            ui.label("Nearby devices:");
            let mut picked = None;
            egui::ScrollArea::vertical()
                .id_salt("scan_results")
                .max_height(120.0)
                .show(ui, |ui| {
                    for device in &app.discovered {
                        ui.horizontal(|ui| {
                            ui.label(format!("{} ({})", device.display_name(), device.id));
                            if ui
                                .add_enabled(app.can_start_attempt(), egui::Button::new("Connect"))
                                .clicked()
                            {
                                picked = Some(device.clone());
                            }
                        });
                    }
                });
            if let Some(device) = picked {
                app.send(BluetoothCommand::ConnectTo(device));
            }
        }
    });
}

fn ui_controls_panel(app: &mut GrowTowerApp, ui: &mut egui::Ui) {
    let ready = app.link_state == LinkState::Ready;
    Components::card(ui, "Tower Controls", |ui| {
        ui.add_enabled_ui(ready, |ui| {
            egui::Grid::new("controls_grid")
                .num_columns(2)
                .spacing([30.0, 10.0])
                .show(ui, |ui| {
                    ui.label("Grow light:");
                    ui.horizontal(|ui| {
                        if ui.checkbox(&mut app.controls.light_on, "On").changed() {
                            app.send(BluetoothCommand::SetLight(app.controls.light_on));
                        }
                        if ui.button("Toggle").clicked() {
                            app.send(BluetoothCommand::ToggleLight);
                        }
                    });
                    ui.end_row();

                    ui.label("Fan speed:");
                    let slider = ui.add(
                        egui::Slider::new(&mut app.controls.fan_speed, 0..=100).suffix("%"),
                    );
                    if slider.drag_stopped() || (slider.changed() && !slider.dragged()) {
                        app.send(BluetoothCommand::SetFanSpeed(app.controls.fan_speed));
                    }
                    ui.end_row();

                    ui.label("Fan range:");
                    ui.horizontal(|ui| {
                        ui.add(egui::DragValue::new(&mut app.controls.fan_min).range(0..=100));
                        ui.label("to");
                        ui.add(egui::DragValue::new(&mut app.controls.fan_max).range(0..=100));
                        ui.label("%");
                        if ui.button("Apply").clicked() {
                            apply_fan_range(app);
                        }
                    });
                    ui.end_row();

                    ui.label("Light schedule:");
                    ui.horizontal(|ui| {
                        ui.label("on");
                        ui.add(
                            egui::DragValue::new(&mut app.controls.light_on_hour)
                                .range(0..=23)
                                .suffix(":00"),
                        );
                        ui.label("off");
                        ui.add(
                            egui::DragValue::new(&mut app.controls.light_off_hour)
                                .range(0..=23)
                                .suffix(":00"),
                        );
                        if ui.button("Apply").clicked() {
                            app.send(BluetoothCommand::SetSchedule(
                                app.controls.light_on_hour,
                                app.controls.light_off_hour,
                            ));
                        }
                    });
                    ui.end_row();
                });

            if let Some(error) = &app.controls.range_error {
                ui.colored_label(ui.visuals().error_fg_color, error);
            }

            if ui.button("Refresh from device").clicked() {
                app.send(BluetoothCommand::ReadAll);
            }
        });
    });
}

fn apply_fan_range(app: &mut GrowTowerApp) {
    let (min, max) = (app.controls.fan_min, app.controls.fan_max);
    match validate_fan_range(min, max) {
        Ok(()) => {
            app.controls.range_error = None;
            app.send(BluetoothCommand::SetFanRange(min, max));
        }
        Err(reason) => {
            app.push_log(StatusMessage::new(reason.clone(), MessageSeverity::Warning));
            app.controls.range_error = Some(reason);
        }
    }
}

fn ui_log_panel(app: &mut GrowTowerApp, ui: &mut egui::Ui) {
    Components::card(ui, "Event Log", |ui| {
        if let Some(msg) = &app.status_message {
            ui.label(
                egui::RichText::new(&msg.message)
                    .color(Components::severity_color(msg.severity))
                    .strong(),
            );
            ui.separator();
        }

        egui::ScrollArea::vertical()
            .id_salt("event_log")
            .max_height(220.0)
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for entry in &app.log {
                    ui.label(
                        egui::RichText::new(format!(
                            "[{}] {}",
                            entry.timestamp.format("%H:%M:%S"),
                            entry.message
                        ))
                        .color(Components::severity_color(entry.severity))
                        .monospace(),
                    );
                }
            });

        if ui.button("Clear").clicked() {
            app.log.clear();
        }
    });
}
