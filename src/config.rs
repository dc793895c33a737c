/// Bridge configuration: the single JSON file that describes the OPC
/// listener and the set of serial outputs it feeds.
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Wire protocol spoken on a serial output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Adalight,
    Awa,
}

/// Target on-wire channel order for a serial output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    #[serde(rename = "RGB")]
    Rgb,
    #[serde(rename = "GRB")]
    Grb,
    #[serde(rename = "BGR")]
    Bgr,
    #[serde(rename = "RGBW")]
    Rgbw,
    #[serde(rename = "GRBW")]
    Grbw,
}

impl Default for PixelFormat {
    fn default() -> Self {
        Self::Grb
    }
}

impl PixelFormat {
    /// Bytes per pixel once this format is applied.
    #[must_use]
    pub const fn stride(self) -> usize {
        match self {
            Self::Rgb | Self::Grb | Self::Bgr => 3,
            Self::Rgbw | Self::Grbw => 4,
        }
    }
}

/// Hardware tag that selects the bring-up path for an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HardwareType {
    Wled,
}

/// One serial output entry, immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub port: String,
    pub protocol: Protocol,
    pub baud_rate: u32,
    #[serde(default)]
    pub handshake_baud_rate: Option<u32>,
    #[serde(default)]
    pub hardware_type: Option<HardwareType>,
    pub opc_channel: u8,
    #[serde(default)]
    pub opc_offset: usize,
    pub led_count: usize,
    #[serde(default)]
    pub pixel_format: PixelFormat,
}

/// OPC listener address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpcConfig {
    pub host: String,
    pub port: u16,
}

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub opc: OpcConfig,
    pub outputs: Vec<OutputConfig>,
}

/// Load and validate a configuration file.
///
/// # Errors
///
/// Returns `BridgeError::Config` if the file is missing, the JSON is
/// malformed, or `outputs` is empty.
pub fn load(path: &Path) -> Result<BridgeConfig> {
    let data = fs::read_to_string(path)
        .map_err(|e| BridgeError::Config(format!("failed to read {}: {e}", path.display())))?;

    let config: BridgeConfig = serde_json::from_str(&data)
        .map_err(|e| BridgeError::Config(format!("invalid JSON in {}: {e}", path.display())))?;

    if config.outputs.is_empty() {
        return Err(BridgeError::Config(
            "no outputs defined in config file".into(),
        ));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_minimal_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "opc": {{ "host": "0.0.0.0", "port": 7890 }},
                "outputs": [
                    {{
                        "port": "/dev/ttyUSB0",
                        "protocol": "adalight",
                        "baud_rate": 115200,
                        "opc_channel": 0,
                        "led_count": 10
                    }}
                ]
            }}"#
        )
        .unwrap();

        let config = load(file.path()).unwrap();
        assert_eq!(config.opc.port, 7890);
        assert_eq!(config.outputs.len(), 1);
        assert_eq!(config.outputs[0].opc_offset, 0);
        assert_eq!(config.outputs[0].pixel_format, PixelFormat::Grb);
    }

    #[test]
    fn rejects_empty_outputs() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "opc": {{ "host": "0.0.0.0", "port": 7890 }}, "outputs": [] }}"#
        )
        .unwrap();

        assert!(load(file.path()).is_err());
    }

    #[test]
    fn rejects_missing_file() {
        assert!(load(Path::new("/nonexistent/config.json")).is_err());
    }
}
