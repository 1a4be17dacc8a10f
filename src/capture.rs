//! Capture source abstraction and the capture session controller.
//!
//! The controller is the only place a filter is ever installed. It enforces
//! the stop → set filter → start sequence and keeps the last good filter
//! running when the source rejects a new one.

use chrono::{DateTime, Local};
use tracing::{debug, error, info, warn};

use crate::device::Device;
use crate::error::CaptureError;
use crate::model::{LinkType, RawFrame};

/// Read timeout for the live handle; bounds how long a filter change waits on the reader.
pub const READ_TIMEOUT_MS: i32 = 1000;

/// A stream of raw frames from one interface.
///
/// Implementations must not be asked to change the filter while capturing;
/// [`CaptureSession`] guarantees `stop` precedes every `set_filter`.
pub trait CaptureSource: Send {
    fn start(&mut self) -> Result<(), CaptureError>;

    fn stop(&mut self);

    /// Install `expr`. On error the previously installed filter must stay active.
    fn set_filter(&mut self, expr: &str) -> Result<(), CaptureError>;

    /// Next frame, or `None` when the read timed out or capture is stopped.
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError>;
}

/// Live capture through libpcap.
pub struct PcapSource {
    capture: pcap::Capture<pcap::Active>,
    link_type: LinkType,
    capturing: bool,
}

impl PcapSource {
    /// Open `device` in promiscuous mode with a bounded read timeout.
    pub fn open(device: &Device, timeout_ms: i32) -> Result<Self, CaptureError> {
        let open_err = |e: pcap::Error| CaptureError::Open {
            device: device.name.clone(),
            reason: e.to_string(),
        };
        let capture = pcap::Capture::from_device(device.name.as_str())
            .map_err(open_err)?
            .promisc(true)
            .timeout(timeout_ms)
            .open()
            .map_err(open_err)?;
        let link_type = LinkType::from_dlt(capture.get_datalink().0);
        debug!(device = %device.name, ?link_type, timeout_ms, "capture handle opened");
        Ok(Self {
            capture,
            link_type,
            capturing: false,
        })
    }
}

impl CaptureSource for PcapSource {
    fn start(&mut self) -> Result<(), CaptureError> {
        self.capturing = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.capturing = false;
    }

    fn set_filter(&mut self, expr: &str) -> Result<(), CaptureError> {
        self.capture
            .filter(expr, true)
            .map_err(|e| CaptureError::FilterRejected {
                filter: expr.to_owned(),
                reason: e.to_string(),
            })
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        if !self.capturing {
            return Ok(None);
        }
        match self.capture.next_packet() {
            Ok(packet) => {
                let ts = packet.header.ts;
                Ok(Some(RawFrame {
                    link_type: self.link_type,
                    data: packet.data.to_vec(),
                    timestamp: arrival_time(ts.tv_sec as i64, ts.tv_usec as i64),
                }))
            }
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(e) => Err(CaptureError::Read(e.to_string())),
        }
    }
}

fn arrival_time(secs: i64, micros: i64) -> DateTime<Local> {
    let nanos = u32::try_from(micros.clamp(0, 999_999) * 1000).unwrap_or(0);
    DateTime::from_timestamp(secs, nanos)
        .map(|utc| utc.with_timezone(&Local))
        .unwrap_or_else(Local::now)
}

enum SessionState<S> {
    Closed,
    Open {
        source: S,
        installed_filter: Option<String>,
    },
}

/// Owns the open capture source and the filter installed on it.
pub struct CaptureSession<S> {
    state: SessionState<S>,
}

impl<S: CaptureSource> CaptureSession<S> {
    pub fn new() -> Self {
        Self {
            state: SessionState::Closed,
        }
    }

    /// Take ownership of an opened source and start capturing with no filter installed.
    pub fn open(&mut self, mut source: S) -> Result<(), CaptureError> {
        self.close();
        source.start()?;
        self.state = SessionState::Open {
            source,
            installed_filter: None,
        };
        info!("capture session opened");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Open { .. })
    }

    pub fn installed_filter(&self) -> Option<&str> {
        match &self.state {
            SessionState::Open {
                installed_filter, ..
            } => installed_filter.as_deref(),
            SessionState::Closed => None,
        }
    }

    /// Install `expr` on the live source.
    ///
    /// Returns `Ok(false)` without touching the source when `expr` is already
    /// installed. A fresh session counts as having the empty filter installed.
    /// On rejection capture is restarted with the previous filter.
    pub fn apply_filter(&mut self, expr: &str) -> Result<bool, CaptureError> {
        let SessionState::Open {
            source,
            installed_filter,
        } = &mut self.state
        else {
            return Err(CaptureError::NotOpen);
        };

        let unchanged = match installed_filter.as_deref() {
            Some(current) => current == expr,
            None => expr.is_empty(),
        };
        if unchanged {
            debug!(filter = %expr, "filter already installed");
            return Ok(false);
        }

        source.stop();
        let outcome = source.set_filter(expr);
        let restarted = source.start();

        match outcome {
            Ok(()) => {
                *installed_filter = Some(expr.to_owned());
                info!(filter = %expr, "capture filter applied");
                restarted.map(|()| true)
            }
            Err(e) => {
                warn!(filter = %expr, error = %e, "capture filter rejected");
                if let Err(restart) = restarted {
                    error!(error = %restart, "failed to restart capture after rejected filter");
                }
                Err(e)
            }
        }
    }

    pub fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        match &mut self.state {
            SessionState::Open { source, .. } => source.next_frame(),
            SessionState::Closed => Err(CaptureError::NotOpen),
        }
    }

    /// Stop capturing and release the source.
    pub fn close(&mut self) {
        if let SessionState::Open { mut source, .. } =
            std::mem::replace(&mut self.state, SessionState::Closed)
        {
            source.stop();
            info!("capture session closed");
        }
    }
}

impl<S: CaptureSource> Default for CaptureSession<S> {
    fn default() -> Self {
        Self::new()
    }
}
