//! Live TCP traffic inspector.
//!
//! Frames flow `capture` → `network` (classify) → `watch` (highlight) →
//! `format` → `console`. `session` runs that pipeline on a capture worker
//! while the command loop edits settings and the live filter.

pub mod capture;
pub mod console;
pub mod device;
pub mod error;
pub mod format;
pub mod logging;
pub mod model;
pub mod network;
pub mod session;
pub mod settings;
pub mod watch;

pub use capture::{CaptureSession, CaptureSource, PcapSource};
pub use error::PacketWatchError;
pub use session::Session;
pub use settings::{Settings, SettingsStore};
