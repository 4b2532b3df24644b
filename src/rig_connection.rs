/// Serial connection to the motor rig
///
/// Owns the single serial handle to the Arduino-class controller. Since the
/// board resets on every new connection, connect() waits out the reset delay
/// before declaring the link up. A background reader thread turns the byte
/// stream into parsed telemetry frames and hands them to the GUI thread over
/// a bounded channel; control commands are written directly from the caller's
/// thread on a clone of the port handle.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, info, warn};
use serialport::{DataBits, FlowControl, Parity, StopBits};

use crate::telemetry::{parse_and_convert, ChannelSpec, FrameFormat};

/// Frames buffered towards the GUI before the oldest gets dropped
const FRAME_CHANNEL_CAPACITY: usize = 256;

/// A stream without newlines must not grow the line buffer unbounded
const MAX_LINE_LEN: usize = 4096;

/// Outcome of feeding one byte to the line assembler
#[derive(Debug, PartialEq)]
enum LinePush {
    Pending,
    Line(String),
    Overflow,
}

/// Accumulates raw serial bytes into newline-terminated lines
struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    fn new() -> Self {
        Self {
            pending: Vec::with_capacity(256),
        }
    }

    /// Feed one byte. Returns the completed line on `\n`; overlong garbage
    /// without a newline is discarded and the stream resynchronizes at the
    /// next line ending.
    fn push(&mut self, b: u8) -> LinePush {
        if b == b'\n' {
            let line = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            return LinePush::Line(line);
        }
        if self.pending.len() >= MAX_LINE_LEN {
            self.pending.clear();
            self.pending.push(b);
            return LinePush::Overflow;
        }
        self.pending.push(b);
        LinePush::Pending
    }
}

/// Queue a frame towards the GUI without ever blocking the reader: when the
/// channel is full the oldest queued frame is dropped to make room. Returns
/// false once the receiver side is gone.
fn queue_frame(
    tx: &Sender<TelemetryFrame>,
    rx: &Receiver<TelemetryFrame>,
    stats: &ConnectionStats,
    frame: TelemetryFrame,
) -> bool {
    match tx.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(frame)) => {
            let _ = rx.try_recv();
            stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            !matches!(tx.try_send(frame), Err(TrySendError::Disconnected(_)))
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}

/// Control values the panel can push down to the firmware.
///
/// Wire encoding is one ASCII line per command, matching the firmware's
/// command parser.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Target motor voltage in volts
    SetVoltage(f32),
    /// Target speed in rpm
    SetSpeed(i32),
    /// Proportional gain of the speed controller
    SetKp(f32),
    /// Integral gain of the speed controller
    SetKi(f32),
    /// true disables the output stage (the rig powers up disabled)
    SetDisabled(bool),
}

impl ControlCommand {
    pub fn encode(&self) -> String {
        match self {
            ControlCommand::SetVoltage(v) => format!("U:{:.5}\n", v),
            ControlCommand::SetSpeed(n) => format!("N:{}\n", n),
            ControlCommand::SetKp(kp) => format!("Kp:{:.4}\n", kp),
            ControlCommand::SetKi(ki) => format!("Ki:{:.4}\n", ki),
            ControlCommand::SetDisabled(d) => format!("DISABLE:{}\n", *d as i32),
        }
    }

    /// Short form for the session log
    pub fn describe(&self) -> String {
        match self {
            ControlCommand::SetVoltage(v) => format!("voltage={:.2}", v),
            ControlCommand::SetSpeed(n) => format!("speed={}", n),
            ControlCommand::SetKp(kp) => format!("kp={:.4}", kp),
            ControlCommand::SetKi(ki) => format!("ki={:.4}", ki),
            ControlCommand::SetDisabled(d) => format!("disabled={}", d),
        }
    }
}

/// One good telemetry frame, values already in engineering units
#[derive(Debug, Clone)]
pub struct TelemetryFrame {
    pub seq: u64,
    pub values: Vec<f32>,
}

/// Counters shared between the reader thread and the GUI
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub frames_ok: AtomicU64,
    pub parse_errors: AtomicU64,
    pub io_errors: AtomicU64,
    pub frames_dropped: AtomicU64,
}

impl ConnectionStats {
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.frames_ok.load(Ordering::Relaxed),
            self.parse_errors.load(Ordering::Relaxed),
            self.io_errors.load(Ordering::Relaxed),
            self.frames_dropped.load(Ordering::Relaxed),
        )
    }
}

struct ReaderHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

/// Connection manager owning the serial handle and the reader thread
pub struct RigConnection {
    port: Option<Box<dyn serialport::SerialPort>>,
    port_path: String,
    baud: u32,
    format: FrameFormat,
    channels: Vec<ChannelSpec>,
    connected: bool,
    reader: Option<ReaderHandle>,
    frames: Option<Receiver<TelemetryFrame>>,
    stats: Arc<ConnectionStats>,
}

impl RigConnection {
    pub fn new(
        port_path: String,
        baud: u32,
        format: FrameFormat,
        channels: Vec<ChannelSpec>,
    ) -> Self {
        Self {
            port: None,
            port_path,
            baud,
            format,
            channels,
            connected: false,
            reader: None,
            frames: None,
            stats: Arc::new(ConnectionStats::default()),
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Ok(());
        }
        let port = serialport::new(self.port_path.as_str(), self.baud)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()
            .with_context(|| {
                format!("Failed to open {} at {} baud", self.port_path, self.baud)
            })?;

        std::thread::sleep(Duration::from_millis(2000)); // Arduino reset delay

        let reader_port = port
            .try_clone()
            .context("Failed to clone serial handle for reader thread")?;
        let _ = port.clear(serialport::ClearBuffer::Input);

        let (tx, rx) = bounded(FRAME_CHANNEL_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let join = Self::spawn_reader(
            reader_port,
            tx,
            rx.clone(),
            Arc::clone(&stop),
            Arc::clone(&self.stats),
            self.format,
            self.channels.clone(),
        );

        self.port = Some(port);
        self.frames = Some(rx);
        self.reader = Some(ReaderHandle {
            stop,
            join: Some(join),
        });
        self.connected = true;
        info!(target: "rig_connection", "Connected to {} at {} baud", self.port_path, self.baud);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.stop.store(true, Ordering::Relaxed);
            if let Some(join) = reader.join.take() {
                let _ = join.join();
            }
        }
        self.port = None;
        self.frames = None;
        if self.connected {
            info!(target: "rig_connection", "Disconnected from {}", self.port_path);
        }
        self.connected = false;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn port_path(&self) -> &str {
        &self.port_path
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Receiver for the parsed frame stream, None while disconnected
    pub fn frames(&self) -> Option<&Receiver<TelemetryFrame>> {
        self.frames.as_ref()
    }

    /// True when the reader thread has exited on its own (port gone)
    pub fn reader_died(&self) -> bool {
        self.reader
            .as_ref()
            .and_then(|r| r.join.as_ref())
            .map(|j| j.is_finished())
            .unwrap_or(false)
    }

    /// Encode and write one control command
    pub fn send(&mut self, cmd: &ControlCommand) -> Result<()> {
        if !self.connected {
            return Err(anyhow!("Rig not connected"));
        }
        let wire = cmd.encode();
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| anyhow!("Port not available"))?;
        port.write_all(wire.as_bytes())
            .and_then(|_| port.flush())
            .with_context(|| format!("Failed to send {}", cmd.describe()))?;
        debug!(target: "rig_connection", "sent {}", cmd.describe());
        Ok(())
    }

    fn spawn_reader(
        mut port: Box<dyn serialport::SerialPort>,
        tx: Sender<TelemetryFrame>,
        rx: Receiver<TelemetryFrame>,
        stop: Arc<AtomicBool>,
        stats: Arc<ConnectionStats>,
        format: FrameFormat,
        channels: Vec<ChannelSpec>,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            info!(target: "rig_connection", "Reader thread started");
            let mut assembler = LineAssembler::new();
            let mut chunk = [0u8; 256];
            let mut seq: u64 = 0;

            while !stop.load(Ordering::Relaxed) {
                let n = match port.read(&mut chunk) {
                    Ok(n) => n,
                    Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        stats.io_errors.fetch_add(1, Ordering::Relaxed);
                        warn!(target: "rig_connection", "Serial read failed: {}", e);
                        break;
                    }
                };
                if n == 0 {
                    continue;
                }
                for &b in &chunk[..n] {
                    match assembler.push(b) {
                        LinePush::Pending => {}
                        LinePush::Overflow => {
                            stats.parse_errors.fetch_add(1, Ordering::Relaxed);
                            warn!(target: "rig_connection", "Line overlong, discarding {} bytes", MAX_LINE_LEN);
                        }
                        LinePush::Line(line) => match parse_and_convert(&line, format, &channels) {
                            Ok(values) => {
                                stats.frames_ok.fetch_add(1, Ordering::Relaxed);
                                let frame = TelemetryFrame { seq, values };
                                seq += 1;
                                if !queue_frame(&tx, &rx, &stats, frame) {
                                    return;
                                }
                            }
                            Err(e) => {
                                stats.parse_errors.fetch_add(1, Ordering::Relaxed);
                                debug!(target: "rig_connection", "Rejected line: {}", e);
                            }
                        },
                    }
                }
            }
            info!(target: "rig_connection", "Reader thread stopped");
        })
    }
}

impl Drop for RigConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_encoding() {
        assert_eq!(ControlCommand::SetVoltage(12.5).encode(), "U:12.50000\n");
        assert_eq!(ControlCommand::SetVoltage(-30.0).encode(), "U:-30.00000\n");
        assert_eq!(ControlCommand::SetSpeed(850).encode(), "N:850\n");
        assert_eq!(ControlCommand::SetSpeed(0).encode(), "N:0\n");
        assert_eq!(ControlCommand::SetKp(0.5).encode(), "Kp:0.5000\n");
        assert_eq!(ControlCommand::SetKi(0.0125).encode(), "Ki:0.0125\n");
        assert_eq!(ControlCommand::SetDisabled(true).encode(), "DISABLE:1\n");
        assert_eq!(ControlCommand::SetDisabled(false).encode(), "DISABLE:0\n");
    }

    #[test]
    fn test_command_describe() {
        assert_eq!(ControlCommand::SetSpeed(100).describe(), "speed=100");
        assert_eq!(
            ControlCommand::SetDisabled(true).describe(),
            "disabled=true"
        );
    }

    #[test]
    fn test_send_requires_connection() {
        let mut conn = RigConnection::new(
            "/dev/null".to_string(),
            115200,
            FrameFormat::Angle,
            crate::telemetry::default_channels(),
        );
        assert!(!conn.is_connected());
        assert!(conn.send(&ControlCommand::SetSpeed(100)).is_err());
        assert!(conn.frames().is_none());
    }

    #[test]
    fn test_stats_snapshot_starts_zeroed() {
        let stats = ConnectionStats::default();
        assert_eq!(stats.snapshot(), (0, 0, 0, 0));
    }

    #[test]
    fn test_line_assembler_splits_on_newline() {
        let mut asm = LineAssembler::new();
        let mut lines = Vec::new();
        for &b in b"<1,2>\n<3,4>\r\n" {
            if let LinePush::Line(line) = asm.push(b) {
                lines.push(line);
            }
        }
        // CR stays attached; the parser trims it
        assert_eq!(lines, vec!["<1,2>".to_string(), "<3,4>\r".to_string()]);
    }

    #[test]
    fn test_line_assembler_discards_overlong_garbage() {
        let mut asm = LineAssembler::new();
        for _ in 0..MAX_LINE_LEN {
            assert_eq!(asm.push(b'x'), LinePush::Pending);
        }
        assert_eq!(asm.push(b'x'), LinePush::Overflow);
        // the stream resynchronizes at the next newline
        assert_eq!(asm.push(b'\n'), LinePush::Line("x".to_string()));
        let mut lines = Vec::new();
        for &b in b"<5,6>\n" {
            if let LinePush::Line(line) = asm.push(b) {
                lines.push(line);
            }
        }
        assert_eq!(lines, vec!["<5,6>".to_string()]);
    }

    #[test]
    fn test_queue_frame_drops_oldest_when_full() {
        let (tx, rx) = bounded(2);
        let stats = ConnectionStats::default();
        for seq in 0..3u64 {
            assert!(queue_frame(
                &tx,
                &rx,
                &stats,
                TelemetryFrame {
                    seq,
                    values: vec![seq as f32],
                }
            ));
        }
        assert_eq!(stats.frames_dropped.load(Ordering::Relaxed), 1);
        // oldest frame gone, newest kept
        let seqs: Vec<u64> = rx.try_iter().map(|f| f.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }
}
