//! Streaming session controller for a camera-backed RTSP source
//!
//! Turns a device camera + microphone into a live RTSP source: discovers
//! capture capabilities, manages the preview/streaming lifecycle, applies
//! user-selected quality settings and reacts to viewer connection events
//! (forcing a fresh keyframe for newly joined viewers).
//!
//! The actual capture hardware, H.264/AAC encoders and RTSP protocol engine
//! live behind the [`CapturePipeline`] collaborator trait — this crate is
//! the state machine that drives them without corrupting encoder or camera
//! state.
//!
//! # Architecture
//!
//! ```text
//!   host UI ──calls──► SessionController ──drives──► CapturePipeline
//!      ▲                  │        ▲                  (capture/encode/serve)
//!      │                  │        │ mpsc queue               │
//!   broadcast events ◄────┘        └──── ConnectionEvent ─────┘
//!                                        (serve threads)
//! ```
//!
//! All session state sits behind a single lock; connection events raised on
//! the serve endpoint's background threads are funneled through a
//! single-consumer queue into the same lock domain.

pub mod bitrate;
pub mod capability;
pub mod config;
pub mod error;
pub mod event;
pub mod net;
pub mod pipeline;
pub mod registry;
pub mod session;
pub mod settings;

pub use bitrate::{format_bitrate, BitrateScale};
pub use capability::{CameraFacing, CameraProbe, CapabilityCatalog, CaptureSize};
pub use config::StreamerConfig;
pub use error::{EncoderKind, Result, StreamerError};
pub use event::StreamerEvent;
pub use pipeline::{
    AudioParams, CapturePipeline, ClientId, ConnectionEvent, PipelineFactory, VideoParams,
};
pub use registry::ClientRegistry;
pub use session::{SessionController, SessionState};
pub use settings::{SessionSettings, SUPPORTED_FPS};
