//! Error types for the inspector, one enum per concern.

use std::net::Ipv4Addr;

/// Top-level error returned by startup and the command loop.
#[derive(Debug, thiserror::Error)]
pub enum PacketWatchError {
    /// Settings file could not be read, parsed or written
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Interface enumeration or resolution failed
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// Capture handle failure
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Background task could not be joined
    #[error("worker error: {0}")]
    Worker(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PacketWatchError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                  |
    /// |------|------------------------------------------|
    /// | 0    | Normal `quit`                            |
    /// | 1    | General failure                          |
    /// | 2    | Settings file unreadable or malformed    |
    /// | 3    | Device not found / invalid selection     |
    /// | 4    | Capture could not be opened              |
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Device(_) => 3,
            Self::Capture(CaptureError::Open { .. }) => 4,
            Self::Capture(_) | Self::Worker(_) | Self::Io(_) => 1,
        }
    }
}

/// Settings file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    /// Malformed JSON or a field with an invalid value
    #[error("failed to parse settings: {reason}")]
    ParseFailed { reason: String },

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(String),
}

/// Interface enumeration and resolution errors
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// No IPv4 interface carries the configured address
    #[error("couldn't find device with address {0}")]
    NotFound(Ipv4Addr),

    /// Operator entered a non-numeric or out-of-range index
    #[error("invalid device selection '{0}'")]
    InvalidSelection(String),

    #[error("failed to enumerate devices: {0}")]
    Enumerate(String),
}

/// Capture source and session errors
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to open {device}: {reason}")]
    Open { device: String, reason: String },

    /// The capture source refused the filter; the previous filter stays installed
    #[error("filter '{filter}' rejected: {reason}")]
    FilterRejected { filter: String, reason: String },

    #[error("failed to read frame: {0}")]
    Read(String),

    #[error("capture session is not open")]
    NotOpen,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_startup_failure_kind() {
        let parse: PacketWatchError = ConfigError::ParseFailed {
            reason: "eof".to_owned(),
        }
        .into();
        assert_eq!(parse.exit_code(), 2);

        let missing: PacketWatchError = DeviceError::NotFound(Ipv4Addr::new(10, 0, 0, 1)).into();
        assert_eq!(missing.exit_code(), 3);

        let selection: PacketWatchError = DeviceError::InvalidSelection("x".to_owned()).into();
        assert_eq!(selection.exit_code(), 3);

        let open: PacketWatchError = CaptureError::Open {
            device: "eth0".to_owned(),
            reason: "permission denied".to_owned(),
        }
        .into();
        assert_eq!(open.exit_code(), 4);

        let rejected: PacketWatchError = CaptureError::FilterRejected {
            filter: "tcp port".to_owned(),
            reason: "syntax error".to_owned(),
        }
        .into();
        assert_eq!(rejected.exit_code(), 1);
    }

    #[test]
    fn not_found_message_names_the_address() {
        let err = DeviceError::NotFound(Ipv4Addr::new(192, 168, 1, 20));
        assert_eq!(
            err.to_string(),
            "couldn't find device with address 192.168.1.20"
        );
    }
}
