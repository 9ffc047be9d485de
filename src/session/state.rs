//! Session state machine
//!
//! Tracks the lifecycle of the streaming session. Exactly one state holds
//! at any instant; only the controller mutates it, and only under the
//! session lock.

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No render surface, or surface present but preview not running
    #[default]
    Idle,
    /// Camera capture running, local display live, nothing served
    Previewing,
    /// Serve endpoint accepting viewers, encoders running
    Streaming,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        *self == SessionState::Idle
    }

    pub fn is_previewing(&self) -> bool {
        *self == SessionState::Previewing
    }

    pub fn is_streaming(&self) -> bool {
        *self == SessionState::Streaming
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Previewing => write!(f, "previewing"),
            SessionState::Streaming => write!(f, "streaming"),
        }
    }
}
