//! Log line construction for classified segments.

use std::fmt::Write;

use chrono::{DateTime, Local};

use crate::model::ClassifiedSegment;
use crate::settings::DisplaySettings;

pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%H:%M:%S";

/// Any address or port field is shown, so the bracketed endpoint group is rendered.
pub fn ip_group_active(display: &DisplaySettings) -> bool {
    display.source_ip || display.dest_ip || display.source_port || display.dest_port
}

/// Any header field is shown, so the header line is followed by a line break.
pub fn any_active(display: &DisplaySettings) -> bool {
    display.direction || display.tcp_length || ip_group_active(display) || display.timestamp
}

/// Render `segment` as an optional header line followed by the payload hex dump.
///
/// Returns `None` for an empty payload.
pub fn format_segment(segment: &ClassifiedSegment<'_>, display: &DisplaySettings) -> Option<String> {
    if segment.payload.is_empty() {
        return None;
    }

    let ip_group = ip_group_active(display);
    let mut line = String::new();

    if display.direction {
        line.push_str(if segment.is_from_remote { "[S->C] " } else { "[C->S] " });
    }
    if display.timestamp {
        let time = format_time(&segment.arrival_time, display.timestamp_format.as_deref());
        line.push_str(&format!("[{time}] "));
    }

    if ip_group {
        line.push('[');
    }
    if display.source_ip {
        line.push_str(&segment.source_address.to_string());
    }
    if display.source_port {
        line.push_str(&format!(":{}", segment.source_port));
    }
    if ip_group {
        line.push_str(" -> ");
    }
    if display.dest_ip {
        line.push_str(&segment.dest_address.to_string());
    }
    if display.dest_port {
        line.push_str(&format!(":{}", segment.dest_port));
    }
    if ip_group {
        line.push_str("] ");
    }

    if display.tcp_length {
        line.push_str(&format!("TcpLen={} ", segment.payload.len()));
    }
    if any_active(display) {
        line.push('\n');
    }

    line.push_str(&hex_dump(segment.payload));
    Some(line)
}

/// Uppercase hyphen-separated hex, e.g. `DE-AD-BE-EF`.
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join("-")
}

// Unknown and parse-only specifiers make chrono's formatter fail; those patterns use the default.
fn format_time(time: &DateTime<Local>, pattern: Option<&str>) -> String {
    if let Some(pattern) = pattern.filter(|p| !p.is_empty()) {
        let mut out = String::new();
        if write!(out, "{}", time.format(pattern)).is_ok() {
            return out;
        }
    }
    time.format(DEFAULT_TIMESTAMP_FORMAT).to_string()
}
