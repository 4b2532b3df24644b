/// Flat-file session logger for rig telemetry
///
/// Writes one CSV file per session with telemetry frames and the control
/// commands the operator sent, so a log replays a test run. Event-driven and
/// non-blocking: the GUI/reader side try_sends rows into a bounded channel
/// and a dedicated writer thread does the file I/O. When the buffer is full
/// rows are dropped with a warning rather than stalling the UI.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use gethostname::gethostname;
use log::{debug, error, info, warn};

use crate::telemetry::ChannelSpec;

const WRITE_BUFFER_ROWS: usize = 512;

enum LogRow {
    Frame {
        recorded_at: DateTime<Utc>,
        seq: u64,
        values: Vec<f32>,
    },
    Command {
        recorded_at: DateTime<Utc>,
        description: String,
    },
    Flush,
}

/// Owns the open log file; runs on the writer thread
struct TelemetryLogWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    channel_count: usize,
}

impl TelemetryLogWriter {
    fn create(dir: &Path, channels: &[ChannelSpec]) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {:?}", dir))?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("telemetry_{}.csv", stamp));
        let file = File::create(&path)
            .with_context(|| format!("Failed to create log file {:?}", path))?;
        let mut writer = BufWriter::new(file);

        let host = gethostname().to_string_lossy().to_string();
        writeln!(writer, "# host={} started={}", host, Utc::now().to_rfc3339())?;
        write!(writer, "timestamp,seq,row_type")?;
        for ch in channels {
            write!(writer, ",{} [{}]", ch.label, ch.unit)?;
        }
        writeln!(writer)?;

        info!(target: "telemetry_logger", "Logging session to {:?}", path);
        Ok(Self {
            writer,
            path,
            channel_count: channels.len(),
        })
    }

    fn write_frame(&mut self, recorded_at: DateTime<Utc>, seq: u64, values: &[f32]) -> Result<()> {
        write!(self.writer, "{},{},frame", recorded_at.to_rfc3339(), seq)?;
        for v in values {
            write!(self.writer, ",{}", v)?;
        }
        // Pad short frames so every row has the same column count
        for _ in values.len()..self.channel_count {
            write!(self.writer, ",")?;
        }
        writeln!(self.writer)?;
        Ok(())
    }

    fn write_command(&mut self, recorded_at: DateTime<Utc>, description: &str) -> Result<()> {
        write!(
            self.writer,
            "{},,command,{}",
            recorded_at.to_rfc3339(),
            description
        )?;
        for _ in 1..self.channel_count.max(1) {
            write!(self.writer, ",")?;
        }
        writeln!(self.writer)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush log file")
    }
}

/// Handle the GUI holds; cheap to call from the update loop
pub struct TelemetryLoggingContext {
    tx: SyncSender<LogRow>,
    path: PathBuf,
}

impl TelemetryLoggingContext {
    pub fn new(dir: &Path, channels: &[ChannelSpec]) -> Result<Self> {
        let writer = TelemetryLogWriter::create(dir, channels)?;
        let path = writer.path.clone();
        let (tx, rx) = mpsc::sync_channel(WRITE_BUFFER_ROWS);
        thread::spawn(move || {
            Self::writer_thread(writer, rx);
        });
        Ok(Self { tx, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_frame(&self, seq: u64, values: &[f32]) {
        self.push(LogRow::Frame {
            recorded_at: Utc::now(),
            seq,
            values: values.to_vec(),
        });
    }

    pub fn log_command(&self, description: String) {
        self.push(LogRow::Command {
            recorded_at: Utc::now(),
            description,
        });
    }

    /// Ask the writer thread to flush buffered rows to disk
    pub fn request_flush(&self) {
        self.push(LogRow::Flush);
    }

    fn push(&self, row: LogRow) {
        match self.tx.try_send(row) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(target: "telemetry_logger", "Log buffer full (writer falling behind) - dropping row");
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!(target: "telemetry_logger", "Writer thread gone");
            }
        }
    }

    fn writer_thread(mut writer: TelemetryLogWriter, rx: Receiver<LogRow>) {
        info!(target: "telemetry_logger", "Log writer thread started");
        let mut rows_written: u64 = 0;
        let mut errors: u64 = 0;
        loop {
            match rx.recv() {
                Ok(LogRow::Frame {
                    recorded_at,
                    seq,
                    values,
                }) => {
                    if let Err(e) = writer.write_frame(recorded_at, seq, &values) {
                        errors += 1;
                        error!(target: "telemetry_logger", "Failed to write frame row: {:#}", e);
                    } else {
                        rows_written += 1;
                    }
                }
                Ok(LogRow::Command {
                    recorded_at,
                    description,
                }) => {
                    if let Err(e) = writer.write_command(recorded_at, &description) {
                        errors += 1;
                        error!(target: "telemetry_logger", "Failed to write command row: {:#}", e);
                    } else {
                        rows_written += 1;
                    }
                }
                Ok(LogRow::Flush) => {
                    if let Err(e) = writer.flush() {
                        errors += 1;
                        error!(target: "telemetry_logger", "{:#}", e);
                    }
                }
                Err(_) => break,
            }
        }
        let _ = writer.flush();
        info!(target: "telemetry_logger", "Log writer thread stopped. Rows: {}, errors: {}", rows_written, errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::default_channels;

    fn temp_log_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "rig_panel_test_{}_{}",
            tag,
            std::process::id()
        ))
    }

    #[test]
    fn test_writer_header_and_rows() {
        let dir = temp_log_dir("writer");
        let channels = default_channels();
        let mut writer = TelemetryLogWriter::create(&dir, &channels).unwrap();
        let path = writer.path.clone();

        let t = Utc::now();
        writer
            .write_frame(t, 0, &[100.0, 200.0, 0.3, 24.0, 12.0, 50.0, 1.2])
            .unwrap();
        writer.write_command(t, "speed=850").unwrap();
        writer.flush().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines[0].starts_with("# host="));
        assert!(lines[1].starts_with("timestamp,seq,row_type,Measured speed [rpm]"));
        assert!(lines[2].contains(",0,frame,100,200,0.3,24,12,50,1.2"));
        assert!(lines[3].contains(",command,speed=850"));
        // Command rows are padded to the frame column count
        assert_eq!(
            lines[2].matches(',').count(),
            lines[3].matches(',').count()
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_context_round_trip() {
        let dir = temp_log_dir("context");
        let channels = default_channels();
        let ctx = TelemetryLoggingContext::new(&dir, &channels).unwrap();
        let path = ctx.path().to_path_buf();

        ctx.log_frame(7, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        ctx.log_command("disabled=false".to_string());
        ctx.request_flush();

        // Give the writer thread a moment to drain
        for _ in 0..50 {
            std::thread::sleep(std::time::Duration::from_millis(10));
            let content = fs::read_to_string(&path).unwrap_or_default();
            if content.contains("disabled=false") {
                break;
            }
        }
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains(",7,frame,1,2,3,4,5,6,7"));
        assert!(content.contains("disabled=false"));

        let _ = fs::remove_dir_all(&dir);
    }
}
