/// Control and telemetry panel for the motor test rig
///
/// Layout:
/// - Left panel: live sensor values, one label per channel
/// - Right panel: output controls (voltage/speed sliders, PID gains,
///   enable/disable) plus connection handling
/// - Center panel: chart grid fed from the bounded history windows
///
/// The panel repaints on a fixed 200 ms cadence; each pass drains whatever
/// frames the reader thread has queued since the last one.

use std::time::Duration;

use eframe::egui;
use egui_plot::{Legend, Line, Plot, PlotPoints};
use log::warn;

use crate::config_loader::RigSettings;
use crate::history::{default_charts, ChartSpec, TelemetryHistory};
use crate::rig_connection::{ControlCommand, RigConnection};
use crate::telemetry_logger::TelemetryLoggingContext;

const REDRAW_INTERVAL: Duration = Duration::from_millis(200);

pub struct PanelGui {
    settings: RigSettings,
    connection: RigConnection,
    history: TelemetryHistory,
    charts: Vec<ChartSpec>,
    latest: Vec<Option<f32>>,
    logger: Option<TelemetryLoggingContext>,
    // Control state mirrored to the firmware
    voltage: f32,
    speed: i32,
    kp_entry: String,
    ki_entry: String,
    disabled: bool,
    status: Option<String>,
}

impl PanelGui {
    pub fn new(settings: RigSettings) -> Self {
        let channel_count = settings.channels.len();
        let connection = RigConnection::new(
            settings.port.clone().unwrap_or_default(),
            settings.baud,
            settings.format,
            settings.channels.clone(),
        );
        let logger = if settings.log_enabled {
            match TelemetryLoggingContext::new(&settings.log_dir, &settings.channels) {
                Ok(ctx) => Some(ctx),
                Err(e) => {
                    warn!(target: "panel_gui", "Session logging disabled: {:#}", e);
                    None
                }
            }
        } else {
            None
        };

        let mut gui = Self {
            history: TelemetryHistory::new(channel_count, settings.history_len),
            charts: default_charts(&settings.channels),
            latest: vec![None; channel_count],
            connection,
            logger,
            voltage: 0.0,
            speed: 0,
            kp_entry: String::new(),
            ki_entry: String::new(),
            disabled: true, // the rig powers up disabled
            status: None,
            settings,
        };
        if gui.settings.port.is_some() {
            gui.connect();
        } else {
            gui.status = Some("No serial port configured".to_string());
        }
        gui
    }

    fn connect(&mut self) {
        // connect() blocks for the board's 2 s reset delay, so the panel
        // stalls briefly on a manual reconnect.
        match self.connection.connect() {
            Ok(()) => {
                self.status = None;
            }
            Err(e) => {
                warn!(target: "panel_gui", "Connect failed: {:#}", e);
                self.status = Some(format!("Connect failed: {}", e));
            }
        }
    }

    fn send(&mut self, cmd: ControlCommand) {
        match self.connection.send(&cmd) {
            Ok(()) => {
                if let Some(logger) = &self.logger {
                    logger.log_command(cmd.describe());
                }
            }
            Err(e) => {
                warn!(target: "panel_gui", "Send failed: {:#}", e);
                self.status = Some(format!("Send failed: {}", e));
            }
        }
    }

    /// Pull everything the reader queued since the last pass
    fn drain_frames(&mut self) {
        let frames: Vec<_> = match self.connection.frames() {
            Some(rx) => rx.try_iter().collect(),
            None => return,
        };
        for frame in frames {
            for (slot, &v) in self.latest.iter_mut().zip(frame.values.iter()) {
                *slot = Some(v);
            }
            self.history.push_frame(&frame.values);
            if let Some(logger) = &self.logger {
                logger.log_frame(frame.seq, &frame.values);
            }
        }
    }

    fn render_sensors(&self, ui: &mut egui::Ui) {
        ui.heading("Sensor values");
        ui.separator();
        egui::Grid::new("sensor_grid").striped(true).show(ui, |ui| {
            for (idx, ch) in self.settings.channels.iter().enumerate() {
                ui.label(format!("{}:", ch.label));
                match self.latest.get(idx).copied().flatten() {
                    Some(v) => ui.label(format!("{:.2} {}", v, ch.unit)),
                    None => ui.label("---"),
                };
                ui.end_row();
            }
        });
    }

    fn render_controls(&mut self, ui: &mut egui::Ui) {
        ui.heading("Output control");
        ui.separator();

        ui.label("Voltage/V:");
        let voltage_range = self.settings.voltage_min..=self.settings.voltage_max;
        if ui
            .add(egui::Slider::new(&mut self.voltage, voltage_range).suffix(" V"))
            .changed()
        {
            let v = self.voltage;
            self.send(ControlCommand::SetVoltage(v));
        }
        ui.label(format!("{:.2} V", self.voltage));

        ui.add_space(8.0);
        ui.label("Speed/rpm:");
        if ui
            .add(egui::Slider::new(&mut self.speed, 0..=self.settings.speed_max).suffix(" rpm"))
            .changed()
        {
            let n = self.speed;
            self.send(ControlCommand::SetSpeed(n));
        }
        ui.label(format!("{} rpm", self.speed));

        ui.add_space(8.0);
        let disable_text = format!("Disable: {}", if self.disabled { "ON" } else { "OFF" });
        if ui.button(disable_text).clicked() {
            self.disabled = !self.disabled;
            let d = self.disabled;
            self.send(ControlCommand::SetDisabled(d));
        }

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            ui.label("Kp:");
            ui.text_edit_singleline(&mut self.kp_entry);
        });
        if ui.button("Send Kp").clicked() {
            match self.kp_entry.trim().parse::<f32>() {
                Ok(kp) => self.send(ControlCommand::SetKp(kp)),
                Err(_) => {
                    self.status = Some(format!("Kp is not a number: {:?}", self.kp_entry))
                }
            }
        }
        ui.horizontal(|ui| {
            ui.label("Ki:");
            ui.text_edit_singleline(&mut self.ki_entry);
        });
        if ui.button("Send Ki").clicked() {
            match self.ki_entry.trim().parse::<f32>() {
                Ok(ki) => self.send(ControlCommand::SetKi(ki)),
                Err(_) => {
                    self.status = Some(format!("Ki is not a number: {:?}", self.ki_entry))
                }
            }
        }

        ui.add_space(12.0);
        ui.separator();
        if self.connection.is_connected() {
            if ui.button("Disconnect").clicked() {
                self.connection.disconnect();
                self.status = Some("Disconnected".to_string());
            }
        } else if ui.button("Connect").clicked() {
            self.connect();
        }
    }

    fn render_status(&self, ui: &mut egui::Ui) {
        let (frames_ok, parse_errors, io_errors, dropped) = self.connection.stats().snapshot();
        ui.horizontal(|ui| {
            let state = if self.connection.is_connected() {
                format!("Connected: {}", self.connection.port_path())
            } else {
                "Not connected".to_string()
            };
            ui.label(state);
            ui.separator();
            ui.label(format!(
                "frames {} | parse errors {} | io errors {} | dropped {}",
                frames_ok, parse_errors, io_errors, dropped
            ));
            if let Some(logger) = &self.logger {
                ui.separator();
                ui.label(format!("log: {}", logger.path().display()));
            }
            if let Some(status) = &self.status {
                ui.separator();
                ui.colored_label(egui::Color32::LIGHT_RED, status);
            }
        });
    }

    fn render_plots(&self, ui: &mut egui::Ui) {
        ui.heading("Telemetry");
        let window_len = self.history.window_len() as f64;
        let plot_height = (ui.available_height() / 2.0 - 24.0).max(120.0);
        for row in self.charts.chunks(2) {
            ui.columns(row.len(), |cols| {
                for (col, chart) in cols.iter_mut().zip(row.iter()) {
                    col.label(format!("{} ({})", chart.title, chart.y_label));
                    Plot::new(chart.title.clone())
                        .legend(Legend::default())
                        .height(plot_height)
                        .include_x(0.0)
                        .include_x(window_len)
                        .include_y(chart.y_range.0)
                        .include_y(chart.y_range.1)
                        .show(col, |plot_ui| {
                            for &idx in &chart.channels {
                                if let Some(window) = self.history.channel(idx) {
                                    let label = &self.settings.channels[idx].label;
                                    plot_ui.line(
                                        Line::new(PlotPoints::from(window.plot_points()))
                                            .name(label),
                                    );
                                }
                            }
                        });
                }
            });
        }
    }
}

impl eframe::App for PanelGui {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint_after(REDRAW_INTERVAL);

        if self.connection.is_connected() && self.connection.reader_died() {
            self.connection.disconnect();
            self.status = Some("Serial link lost".to_string());
        }
        self.drain_frames();

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            self.render_status(ui);
        });
        egui::SidePanel::left("sensor_panel")
            .resizable(true)
            .default_width(280.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    self.render_sensors(ui);
                });
            });
        egui::SidePanel::right("control_panel")
            .resizable(true)
            .default_width(340.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    self.render_controls(ui);
                });
            });
        egui::CentralPanel::default().show(ctx, |ui| {
            self.render_plots(ui);
        });

        if let Some(logger) = &self.logger {
            logger.request_flush();
        }
    }
}
