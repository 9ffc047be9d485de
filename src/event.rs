//! Host-facing notifications
//!
//! The controller fans these out over a broadcast channel so presentation
//! layers can render state and a scrolling log without polling. State
//! notifications carry complete snapshots taken under the session lock, so
//! subscribers never observe a half-applied transition.

use crate::capability::CameraFacing;
use crate::session::SessionState;
use crate::settings::SessionSettings;

/// Notification delivered to host subscribers
#[derive(Debug, Clone)]
pub enum StreamerEvent {
    /// Session state, viewer count or applied settings changed
    StateChanged {
        state: SessionState,
        clients: usize,
        facing: CameraFacing,
        settings: SessionSettings,
    },
    /// Human-readable, timestamped log line
    Log(String),
}

/// Prefix a log message with the current wall-clock time: `[HH:MM:SS] ...`
pub fn log_line(message: &str) -> String {
    format!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_line_format() {
        let line = log_line("stream started");

        assert!(line.ends_with("] stream started"));
        // "[HH:MM:SS] " prefix is exactly 11 chars.
        assert_eq!(&line[..1], "[");
        assert_eq!(&line[9..11], "] ");
    }
}
