/// Headless telemetry monitor
///
/// Streams parsed frames to stdout without the GUI. Useful for checking the
/// firmware output on a new bench setup, and for logging a session from a
/// machine without a display.
///
/// Run with: cargo run --bin rig_monitor -- --port /dev/ttyACM0 [--frames 100]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use gethostname::gethostname;

use rig_panel::config_loader;
use rig_panel::rig_connection::RigConnection;
use rig_panel::telemetry_logger::TelemetryLoggingContext;

#[derive(Parser)]
#[command(author, version, about = "Print rig telemetry frames to stdout")]
struct Args {
    /// Serial port override (e.g. /dev/ttyACM0)
    #[arg(long)]
    port: Option<String>,
    /// Config file (default: rig_panel.yaml next to Cargo.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,
    /// Also write the session log file
    #[arg(long)]
    log: bool,
    /// Log at debug level (overrides RUST_LOG)
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.debug {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let hostname = gethostname().to_string_lossy().to_string();
    let mut settings = config_loader::load_settings(args.config.as_deref(), &hostname)?;
    if let Some(port) = args.port {
        settings.port = Some(port);
    }
    let port = settings
        .port
        .clone()
        .ok_or_else(|| anyhow!("No serial port configured (use --port)"))?;

    println!("Connecting to {} at {} baud...", port, settings.baud);
    let mut conn = RigConnection::new(
        port,
        settings.baud,
        settings.format,
        settings.channels.clone(),
    );
    conn.connect()?;
    println!("Connected, waiting for telemetry");

    let logger = if args.log || settings.log_enabled {
        let ctx = TelemetryLoggingContext::new(&settings.log_dir, &settings.channels)?;
        println!("Logging to {}", ctx.path().display());
        Some(ctx)
    } else {
        None
    };

    let rx = conn
        .frames()
        .cloned()
        .ok_or_else(|| anyhow!("No frame stream after connect"))?;

    let mut received: u64 = 0;
    loop {
        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(frame) => {
                let fields: Vec<String> = frame
                    .values
                    .iter()
                    .zip(settings.channels.iter())
                    .map(|(v, ch)| format!("{}={:.2} {}", ch.label, v, ch.unit))
                    .collect();
                println!("[{:>6}] {}", frame.seq, fields.join(", "));
                if let Some(logger) = &logger {
                    logger.log_frame(frame.seq, &frame.values);
                }
                received += 1;
                if let Some(limit) = args.frames {
                    if received >= limit {
                        break;
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if conn.reader_died() {
                    bail!("Serial link lost after {} frames", received);
                }
                println!("(no telemetry for 5 s)");
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if let Some(logger) = &logger {
        logger.request_flush();
        // Let the writer thread drain before the process exits
        std::thread::sleep(Duration::from_millis(200));
    }
    let (frames_ok, parse_errors, io_errors, dropped) = conn.stats().snapshot();
    println!(
        "Done. frames={} parse_errors={} io_errors={} dropped={}",
        frames_ok, parse_errors, io_errors, dropped
    );
    Ok(())
}
