use anyhow::{anyhow, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::telemetry::{
    default_channels, ChannelSpec, FrameFormat, DEFAULT_HISTORY_LEN,
};

/// Rig settings loaded from rig_panel.yaml
///
/// The file is keyed by hostname so one checkout can drive several bench
/// setups; a `default` block covers hosts without their own entry. Every
/// field is optional - anything missing falls back to the stock firmware
/// values.

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SerialSection {
    pub port: Option<String>,
    pub baud: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TelemetrySection {
    pub format: Option<FrameFormat>,
    pub channels: Option<Vec<ChannelSpec>>,
    pub history_len: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ControlSection {
    pub voltage_min: Option<f32>,
    pub voltage_max: Option<f32>,
    pub speed_max: Option<i32>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct LoggingSection {
    pub enabled: Option<bool>,
    pub directory: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct HostSettings {
    pub serial: Option<SerialSection>,
    pub telemetry: Option<TelemetrySection>,
    pub control: Option<ControlSection>,
    pub logging: Option<LoggingSection>,
}

/// Fully resolved settings the application runs with
#[derive(Debug, Clone)]
pub struct RigSettings {
    pub port: Option<String>,
    pub baud: u32,
    pub format: FrameFormat,
    pub channels: Vec<ChannelSpec>,
    pub history_len: usize,
    pub voltage_min: f32,
    pub voltage_max: f32,
    pub speed_max: i32,
    pub log_enabled: bool,
    pub log_dir: PathBuf,
}

impl Default for RigSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud: 115200,
            format: FrameFormat::Angle,
            channels: default_channels(),
            history_len: DEFAULT_HISTORY_LEN,
            voltage_min: -30.0,
            voltage_max: 30.0,
            speed_max: 1000,
            log_enabled: false,
            log_dir: PathBuf::from("logs"),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("rig_panel.yaml")
}

/// Load settings for `hostname`, merging its block over the `default` block
/// over the built-in defaults.
///
/// A missing file at the default path is fine (built-in defaults apply); a
/// missing file at an explicitly given path is an error.
pub fn load_settings(path: Option<&Path>, hostname: &str) -> Result<RigSettings> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (default_config_path(), false),
    };
    if !path.exists() {
        if explicit {
            return Err(anyhow!("Config file not found: {:?}", path));
        }
        info!(target: "config_loader", "No {:?}, using built-in defaults", path);
        return Ok(RigSettings::default());
    }
    let yaml = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    settings_from_str(&yaml, hostname)
}

/// Parse settings from YAML text (separated out for tests)
pub fn settings_from_str(yaml: &str, hostname: &str) -> Result<RigSettings> {
    let hosts: HashMap<String, HostSettings> =
        serde_yaml::from_str(yaml).context("Failed to parse rig_panel.yaml")?;
    let host_block = hosts.get(hostname);
    let default_block = hosts.get("default");
    if host_block.is_none() && default_block.is_none() {
        info!(target: "config_loader", "No section for host '{}' and no default section", hostname);
    }
    let settings = resolve(host_block, default_block);
    validate(&settings)?;
    Ok(settings)
}

/// Reject degenerate values up front so they fail with a named field
/// instead of surfacing deep inside the buffer or parser types.
fn validate(s: &RigSettings) -> Result<()> {
    if s.history_len == 0 {
        return Err(anyhow!("telemetry.history_len must be at least 1"));
    }
    if s.channels.is_empty() {
        return Err(anyhow!("telemetry.channels must not be empty"));
    }
    Ok(())
}

fn resolve(host: Option<&HostSettings>, default: Option<&HostSettings>) -> RigSettings {
    let mut s = RigSettings::default();

    // default block first, then the host block on top
    for block in [default, host].into_iter().flatten() {
        if let Some(serial) = &block.serial {
            if let Some(port) = &serial.port {
                s.port = Some(port.clone());
            }
            if let Some(baud) = serial.baud {
                s.baud = baud;
            }
        }
        if let Some(telemetry) = &block.telemetry {
            if let Some(format) = telemetry.format {
                s.format = format;
            }
            if let Some(channels) = &telemetry.channels {
                s.channels = channels.clone();
            }
            if let Some(len) = telemetry.history_len {
                s.history_len = len;
            }
        }
        if let Some(control) = &block.control {
            if let Some(v) = control.voltage_min {
                s.voltage_min = v;
            }
            if let Some(v) = control.voltage_max {
                s.voltage_max = v;
            }
            if let Some(n) = control.speed_max {
                s.speed_max = n;
            }
        }
        if let Some(logging) = &block.logging {
            if let Some(enabled) = logging.enabled {
                s.log_enabled = enabled;
            }
            if let Some(dir) = &logging.directory {
                s.log_dir = PathBuf::from(dir);
            }
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::DEFAULT_CHANNEL_COUNT;

    const SAMPLE: &str = r#"
default:
  serial:
    baud: 115200
  telemetry:
    format: angle
    history_len: 100
  logging:
    enabled: false

bench-rig-1:
  serial:
    port: /dev/ttyACM0
  telemetry:
    format: bare
  control:
    speed_max: 1500
  logging:
    enabled: true
    directory: /var/log/rig
"#;

    #[test]
    fn test_host_overrides_default() {
        let s = settings_from_str(SAMPLE, "bench-rig-1").unwrap();
        assert_eq!(s.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(s.baud, 115200);
        assert_eq!(s.format, FrameFormat::Bare);
        assert_eq!(s.speed_max, 1500);
        assert!(s.log_enabled);
        assert_eq!(s.log_dir, PathBuf::from("/var/log/rig"));
        // untouched fields keep the built-in defaults
        assert_eq!(s.history_len, DEFAULT_HISTORY_LEN);
        assert_eq!(s.channels.len(), DEFAULT_CHANNEL_COUNT);
    }

    #[test]
    fn test_unknown_host_gets_default_block() {
        let s = settings_from_str(SAMPLE, "some-other-host").unwrap();
        assert_eq!(s.port, None);
        assert_eq!(s.format, FrameFormat::Angle);
        assert!(!s.log_enabled);
    }

    #[test]
    fn test_custom_channels() {
        let yaml = r#"
default:
  telemetry:
    channels:
      - label: Speed
        unit: rpm
      - label: Current
        unit: A
        scale: 0.001
"#;
        let s = settings_from_str(yaml, "anyhost").unwrap();
        assert_eq!(s.channels.len(), 2);
        assert_eq!(s.channels[1].scale, 0.001);
        assert_eq!(s.channels[0].scale, 1.0);
    }

    #[test]
    fn test_zero_history_len_rejected() {
        let yaml = r#"
default:
  telemetry:
    history_len: 0
"#;
        let err = settings_from_str(yaml, "anyhost").unwrap_err();
        assert!(err.to_string().contains("history_len"));
    }

    #[test]
    fn test_empty_channel_list_rejected() {
        let yaml = r#"
default:
  telemetry:
    channels: []
"#;
        let err = settings_from_str(yaml, "anyhost").unwrap_err();
        assert!(err.to_string().contains("channels"));
    }

    #[test]
    fn test_bad_yaml_is_an_error() {
        assert!(settings_from_str("not: [valid", "host").is_err());
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let err = load_settings(Some(Path::new("/nonexistent/rig.yaml")), "host");
        assert!(err.is_err());
    }
}
