//! Settings model and the JSON settings store.
//!
//! [`Settings`] is loaded once per `load`/`reload` and replaced wholesale;
//! nothing mutates a loaded value in place. The on-disk form uses the
//! camelCase field names of `<program-name>.json`:
//!
//! ```json
//! {
//!   "autoSave": false,
//!   "filter": "tcp port 443",
//!   "deviceIp": "192.168.1.20",
//!   "watchedPackets": [
//!     { "startByte": "16", "foregroundColor": "Yellow", "backgroundColor": null }
//!   ],
//!   "packetInfoSettings": { "direction": true, "tcpLength": true, "sourceIp": true,
//!     "destIp": true, "sourcePort": false, "destPort": false,
//!     "timestamp": false, "timestampFormat": null }
//! }
//! ```

use std::fmt;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use serde::de::{self, Unexpected, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// Everything the operator can persist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Write settings back after every recognised command
    pub auto_save: bool,
    /// Capture filter expression; absent means accept everything
    pub filter: Option<String>,
    /// Interface to capture on; absent means ask interactively
    #[serde(with = "device_ip")]
    pub device_ip: Option<Ipv4Addr>,
    /// Evaluated in order, first match wins
    #[serde(rename = "watchedPackets")]
    pub watch_rules: Vec<WatchRule>,
    #[serde(rename = "packetInfoSettings")]
    pub display: DisplaySettings,
}

impl Settings {
    /// Parse settings from JSON text.
    ///
    /// Blank text yields defaults, same as a missing file.
    pub fn parse(json: &str) -> Result<Self, ConfigError> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Load settings from `path`, falling back to defaults when the file does not exist.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "settings file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };
        Self::parse(&content)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = self.to_json()?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| ConfigError::Write {
                path: path.display().to_string(),
                source: e,
            })
    }

    /// The filter the capture session should carry; absent is the empty expression.
    pub fn effective_filter(&self) -> &str {
        self.filter.as_deref().unwrap_or_default()
    }
}

/// A leading-byte highlight rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatchRule {
    /// Parsed from hex text; a rule without one never matches
    #[serde(rename = "startByte", with = "hex_byte")]
    pub leading_byte: Option<u8>,
    pub foreground_color: Option<ConsoleColor>,
    pub background_color: Option<ConsoleColor>,
}

/// Per-field toggles for the log line header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DisplaySettings {
    pub direction: bool,
    pub tcp_length: bool,
    pub source_ip: bool,
    pub dest_ip: bool,
    pub source_port: bool,
    pub dest_port: bool,
    pub timestamp: bool,
    /// strftime pattern, `%H:%M:%S` when absent
    pub timestamp_format: Option<String>,
}

/// The sixteen classic console colors, named as they appear in the settings file.
///
/// Older settings files store the numeric value instead of the name; both load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConsoleColor {
    Black,
    DarkBlue,
    DarkGreen,
    DarkCyan,
    DarkRed,
    DarkMagenta,
    DarkYellow,
    Gray,
    DarkGray,
    Blue,
    Green,
    Cyan,
    Red,
    Magenta,
    Yellow,
    White,
}

impl ConsoleColor {
    /// Indexed by numeric value.
    pub const ALL: [ConsoleColor; 16] = [
        ConsoleColor::Black,
        ConsoleColor::DarkBlue,
        ConsoleColor::DarkGreen,
        ConsoleColor::DarkCyan,
        ConsoleColor::DarkRed,
        ConsoleColor::DarkMagenta,
        ConsoleColor::DarkYellow,
        ConsoleColor::Gray,
        ConsoleColor::DarkGray,
        ConsoleColor::Blue,
        ConsoleColor::Green,
        ConsoleColor::Cyan,
        ConsoleColor::Red,
        ConsoleColor::Magenta,
        ConsoleColor::Yellow,
        ConsoleColor::White,
    ];

    const NAMES: [&'static str; 16] = [
        "Black",
        "DarkBlue",
        "DarkGreen",
        "DarkCyan",
        "DarkRed",
        "DarkMagenta",
        "DarkYellow",
        "Gray",
        "DarkGray",
        "Blue",
        "Green",
        "Cyan",
        "Red",
        "Magenta",
        "Yellow",
        "White",
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .position(|n| *n == name)
            .map(|index| Self::ALL[index])
    }

    pub fn from_index(index: u64) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }
}

impl<'de> Deserialize<'de> for ConsoleColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ColorVisitor;

        impl<'de> Visitor<'de> for ColorVisitor {
            type Value = ConsoleColor;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a console color name or a number from 0 to 15")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<ConsoleColor, E> {
                ConsoleColor::from_name(value)
                    .ok_or_else(|| E::unknown_variant(value, &ConsoleColor::NAMES))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<ConsoleColor, E> {
                ConsoleColor::from_index(value)
                    .ok_or_else(|| E::invalid_value(Unexpected::Unsigned(value), &self))
            }
        }

        deserializer.deserialize_any(ColorVisitor)
    }
}

/// Parse a byte from hex text such as `16`, `0x16` or ` ff `.
pub fn parse_hex_byte(text: &str) -> Option<u8> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u8::from_str_radix(digits, 16).ok()
}

/// Location of the settings file.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<program-name>.json` in the working directory.
    pub fn for_program(program: &str) -> Self {
        Self::new(format!("{program}.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Settings, ConfigError> {
        Settings::load(&self.path).await
    }

    pub async fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        settings.save(&self.path).await
    }
}

mod hex_byte {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(byte) => serializer.serialize_str(&format!("{byte:02X}")),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u8>, D::Error> {
        let text = Option::<String>::deserialize(deserializer)?;
        Ok(text.as_deref().and_then(super::parse_hex_byte))
    }
}

mod device_ip {
    use std::net::Ipv4Addr;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Ipv4Addr>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(addr) => serializer.collect_str(addr),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Ipv4Addr>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(text) if text.trim().is_empty() => Ok(None),
            Some(text) => text
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| D::Error::custom(format!("invalid deviceIp '{text}': {e}"))),
        }
    }
}
