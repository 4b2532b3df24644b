/// Motor test rig control panel
///
/// Opens the serial link to the rig controller and runs the egui panel:
/// live sensor values, the 2x2 telemetry chart grid and the output controls.
///
/// Run with: cargo run --bin rig_panel --release -- [--port /dev/ttyACM0]

use clap::Parser;
use eframe::egui;
use gethostname::gethostname;
use std::path::PathBuf;

use rig_panel::config_loader;
use rig_panel::gui::panel_gui::PanelGui;

#[derive(Parser)]
#[command(author, version, about = "Motor test rig control and telemetry panel")]
struct Args {
    /// Serial port override (e.g. /dev/ttyACM0)
    #[arg(long)]
    port: Option<String>,
    /// Config file (default: rig_panel.yaml next to Cargo.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Enable session logging regardless of config
    #[arg(long)]
    log: bool,
    /// Log at debug level (overrides RUST_LOG)
    #[arg(long)]
    debug: bool,
}

fn main() {
    let args = Args::parse();
    if args.debug {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let hostname = gethostname().to_string_lossy().to_string();
    let mut settings = match config_loader::load_settings(args.config.as_deref(), &hostname) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings: {:#}", e);
            std::process::exit(1);
        }
    };
    if let Some(port) = args.port {
        settings.port = Some(port);
    }
    if args.log {
        settings.log_enabled = true;
    }

    let gui = PanelGui::new(settings);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Rig Control & Telemetry")
            .with_inner_size([1280.0, 800.0]),
        ..Default::default()
    };

    if let Err(e) = eframe::run_native(
        "Rig Control & Telemetry",
        options,
        Box::new(|_cc| Box::new(gui)),
    ) {
        eprintln!("GUI error: {}", e);
    }
}
