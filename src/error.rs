//! Error types
//!
//! Every collaborator failure is caught at the controller boundary and
//! surfaced as one of these variants; none of them abort the process.

/// Which half of the encode pipeline failed to prepare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    Video,
    Audio,
}

impl std::fmt::Display for EncoderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncoderKind::Video => write!(f, "video"),
            EncoderKind::Audio => write!(f, "audio"),
        }
    }
}

/// Error type for streaming session operations
#[derive(Debug, Clone)]
pub enum StreamerError {
    /// No camera matching the requested facing (or any camera) exists,
    /// or a sensor query failed. Recovered via the fallback resolution list.
    HardwareUnavailable(String),
    /// The capture/encode/serve collaborator could not be constructed
    /// (e.g. RTSP port already bound, camera busy). Not retried.
    Initialization(String),
    /// Video or audio encoder preparation returned failure. The session
    /// state is unchanged.
    EncoderPrepare(EncoderKind),
    /// A camera switch could not be applied.
    CameraSwitch(String),
}

impl std::fmt::Display for StreamerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamerError::HardwareUnavailable(detail) => {
                write!(f, "Camera hardware unavailable: {}", detail)
            }
            StreamerError::Initialization(detail) => {
                write!(f, "Session initialization failed: {}", detail)
            }
            StreamerError::EncoderPrepare(kind) => {
                write!(f, "Failed to prepare {} encoder", kind)
            }
            StreamerError::CameraSwitch(detail) => {
                write!(f, "Camera switch failed: {}", detail)
            }
        }
    }
}

impl std::error::Error for StreamerError {}

/// Result type alias for streaming session operations
pub type Result<T> = std::result::Result<T, StreamerError>;
