/// Telemetry frame parser for the rig serial link
///
/// The firmware emits one frame per line. Depending on the firmware revision
/// the payload is either wrapped in angle brackets (`<v0,v1,...,v6>`) or sent
/// as a bare CSV line. Fields are decimal floats with a fixed channel count.
/// Parsing is pure - the read loop in rig_connection decides what to do with
/// rejected lines.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Channel count of the stock firmware
pub const DEFAULT_CHANNEL_COUNT: usize = 7;

/// Plot window length used by the firmware's companion tools
pub const DEFAULT_HISTORY_LEN: usize = 100;

/// Line framing convention, differs between firmware revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    /// Payload wrapped in angle brackets: `<v0,v1,...>`
    #[default]
    Angle,
    /// Bare CSV payload: `v0,v1,...`
    Bare,
}

/// Per-channel metadata: display label, unit suffix and the linear
/// conversion from raw wire values to engineering units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub label: String,
    pub unit: String,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    pub offset: f32,
}

fn default_scale() -> f32 {
    1.0
}

impl ChannelSpec {
    pub fn new(label: &str, unit: &str) -> Self {
        Self {
            label: label.to_string(),
            unit: unit.to_string(),
            scale: 1.0,
            offset: 0.0,
        }
    }

    /// Raw wire value to engineering units
    pub fn convert(&self, raw: f32) -> f32 {
        raw * self.scale + self.offset
    }
}

/// Channel layout of the stock 7-channel firmware
pub fn default_channels() -> Vec<ChannelSpec> {
    vec![
        ChannelSpec::new("Measured speed", "rpm"),
        ChannelSpec::new("Target speed", "rpm"),
        ChannelSpec::new("Torque", "Nm"),
        ChannelSpec::new("DC-link voltage", "V"),
        ChannelSpec::new("Target motor voltage", "V"),
        ChannelSpec::new("PWM duty", "%"),
        ChannelSpec::new("Armature current", "A"),
    ]
}

/// Parse one telemetry line into raw channel values.
///
/// The line is trimmed first (devices with CRLF line endings leave a `\r`
/// behind). Returns an error for empty lines, bad framing, wrong field
/// count, or any field that does not parse as a float.
pub fn parse_frame(line: &str, format: FrameFormat, arity: usize) -> Result<Vec<f32>> {
    let line = line.trim();
    if line.is_empty() {
        return Err(anyhow!("empty line"));
    }

    let payload = match format {
        FrameFormat::Angle => {
            if line.len() < 2 || !line.starts_with('<') || !line.ends_with('>') {
                return Err(anyhow!("bad framing: {:?}", line));
            }
            &line[1..line.len() - 1]
        }
        FrameFormat::Bare => line,
    };

    let fields: Vec<&str> = payload.split(',').collect();
    if fields.len() != arity {
        return Err(anyhow!(
            "expected {} fields, got {}: {:?}",
            arity,
            fields.len(),
            line
        ));
    }

    let mut values = Vec::with_capacity(arity);
    for (idx, field) in fields.iter().enumerate() {
        let v: f32 = field
            .trim()
            .parse()
            .map_err(|_| anyhow!("field {} is not a float: {:?}", idx, field))?;
        values.push(v);
    }
    Ok(values)
}

/// Parse a line and apply the per-channel conversions.
///
/// `channels.len()` determines the expected arity.
pub fn parse_and_convert(
    line: &str,
    format: FrameFormat,
    channels: &[ChannelSpec],
) -> Result<Vec<f32>> {
    let raw = parse_frame(line, format, channels.len())?;
    Ok(raw
        .iter()
        .zip(channels.iter())
        .map(|(&v, ch)| ch.convert(v))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_angle_frame() {
        let line = "<100.5,200,0.35,24.0,12.5,50,1.25>";
        let values = parse_frame(line, FrameFormat::Angle, 7).unwrap();
        assert_eq!(values.len(), 7);
        assert_eq!(values[0], 100.5);
        assert_eq!(values[1], 200.0);
        assert_eq!(values[6], 1.25);
    }

    #[test]
    fn test_parse_bare_frame() {
        let values = parse_frame("1.0,2.0,3.0", FrameFormat::Bare, 3).unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_crlf_and_whitespace_trimmed() {
        let values = parse_frame("<1, 2 ,3>\r\n", FrameFormat::Angle, 3).unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_empty_line_rejected() {
        assert!(parse_frame("", FrameFormat::Angle, 7).is_err());
        assert!(parse_frame("  \r\n", FrameFormat::Bare, 7).is_err());
    }

    #[test]
    fn test_bad_framing_rejected() {
        assert!(parse_frame("1,2,3", FrameFormat::Angle, 3).is_err());
        assert!(parse_frame("<1,2,3", FrameFormat::Angle, 3).is_err());
        assert!(parse_frame("1,2,3>", FrameFormat::Angle, 3).is_err());
        assert!(parse_frame("<", FrameFormat::Angle, 1).is_err());
    }

    #[test]
    fn test_wrong_arity_rejected() {
        assert!(parse_frame("<1,2,3>", FrameFormat::Angle, 7).is_err());
        assert!(parse_frame("1,2,3,4,5,6,7,8", FrameFormat::Bare, 7).is_err());
    }

    #[test]
    fn test_bad_float_rejected() {
        let err = parse_frame("<1,x,3>", FrameFormat::Angle, 3).unwrap_err();
        assert!(err.to_string().contains("field 1"));
    }

    #[test]
    fn test_negative_and_scientific() {
        let values = parse_frame("<-30.0,1e2,0.0>", FrameFormat::Angle, 3).unwrap();
        assert_eq!(values, vec![-30.0, 100.0, 0.0]);
    }

    #[test]
    fn test_channel_conversion() {
        let mut ch = ChannelSpec::new("DC-link voltage", "V");
        ch.scale = 0.1;
        ch.offset = -2.0;
        assert_eq!(ch.convert(320.0), 30.0);
    }

    #[test]
    fn test_parse_and_convert_identity_default() {
        let channels = default_channels();
        assert_eq!(channels.len(), DEFAULT_CHANNEL_COUNT);
        let line = "<100,200,0.3,24,12,50,1.2>";
        let values = parse_and_convert(line, FrameFormat::Angle, &channels).unwrap();
        assert_eq!(values[3], 24.0);
    }
}
