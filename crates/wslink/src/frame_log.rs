//! Per-frame console logging.
//!
//! Every frame sent or received on the link becomes one [`LogEntry`], which a
//! [`FrameSink`] turns into exactly one output line. Timestamps are rendered
//! in UTC as `HH:MM:SS.mmm`.

use std::io::Write;

use chrono::{DateTime, Utc};
use tracing::warn;

/// Timestamp format used in frame lines.
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S%.3f";

/// Direction of a frame relative to this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Received from the server
    Inbound,
    /// Sent by this client
    Outbound,
}

impl Direction {
    /// Leading glyph for frame lines.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Inbound => "↓",
            Self::Outbound => "↑",
        }
    }
}

/// A single frame event, produced and consumed immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub payload: String,
    pub direction: Direction,
    /// Payload length in characters
    pub length: usize,
}

impl LogEntry {
    pub fn new(payload: impl Into<String>, direction: Direction, timestamp: DateTime<Utc>) -> Self {
        let payload = payload.into();
        let length = payload.chars().count();
        Self {
            timestamp,
            payload,
            direction,
            length,
        }
    }

    /// Create an entry stamped with the current time.
    pub fn now(payload: impl Into<String>, direction: Direction) -> Self {
        Self::new(payload, direction, Utc::now())
    }

    pub fn inbound(payload: impl Into<String>) -> Self {
        Self::now(payload, Direction::Inbound)
    }

    pub fn outbound(payload: impl Into<String>) -> Self {
        Self::now(payload, Direction::Outbound)
    }

    /// Render this entry as a single line (without the trailing newline).
    pub fn format(&self) -> String {
        format_log_entry(&self.payload, self.direction, &self.timestamp)
    }
}

/// Render a frame line: `<marker>[HH:MM:SS.mmm] <payload>`.
pub fn format_log_entry(payload: &str, direction: Direction, timestamp: &DateTime<Utc>) -> String {
    format!(
        "{}[{}] {}",
        direction.marker(),
        timestamp.format(TIMESTAMP_FORMAT),
        payload
    )
}

/// Destination for frame log lines.
pub trait FrameSink: Send + Sync {
    /// Emit one line for `entry` before returning.
    fn log(&self, entry: &LogEntry);
}

/// Writes frame lines to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl FrameSink for StdoutSink {
    fn log(&self, entry: &LogEntry) {
        let line = entry.format();
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{line}").and_then(|_| stdout.flush()) {
            warn!("Failed to write frame line: {}", e);
        }
    }
}
