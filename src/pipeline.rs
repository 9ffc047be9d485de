//! Capture/encode/serve collaborator interface
//!
//! The controller never touches hardware or sockets directly. Everything it
//! needs from the platform — camera capture, H.264/AAC encoding, the RTSP
//! serve endpoint — sits behind [`CapturePipeline`], constructed through a
//! [`PipelineFactory`] once a render surface exists.
//!
//! Client connect/disconnect events originate on the serve side's own
//! threads. Instead of callbacks, the factory receives a channel sender at
//! construction time; the collaborator pushes [`ConnectionEvent`]s into it
//! and the controller's pump task drains them under the session lock.

use tokio::sync::mpsc;

use crate::capability::CameraFacing;
use crate::error::Result;

/// Identifier the serve endpoint assigns a connected viewer,
/// typically its remote address
pub type ClientId = String;

/// Event raised by the serve endpoint on one of its background threads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A viewer completed the RTSP handshake
    Connected(ClientId),
    /// A viewer went away
    Disconnected(ClientId),
    /// Per-viewer bitrate report (informational, reserved extension point)
    BitrateReport(ClientId, u64),
}

/// Video encoder preparation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_bps: u32,
    pub iframe_interval_secs: u32,
    pub rotation_deg: u32,
    pub low_latency: bool,
    pub intra_refresh_period: u32,
}

/// Audio encoder preparation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioParams {
    pub bitrate_bps: u32,
    pub sample_rate_hz: u32,
    pub stereo: bool,
}

/// The capture + encode + serve collaborator
///
/// Prepare calls return `false` when the encoder rejects the parameters;
/// they must not leave the collaborator half-configured on their own —
/// the controller pairs them with `release_*` on partial failure.
pub trait CapturePipeline: Send {
    /// Configure the video encoder. Must be called before preview or stream.
    fn prepare_video(&mut self, params: &VideoParams) -> bool;

    /// Configure the audio encoder.
    fn prepare_audio(&mut self, params: &AudioParams) -> bool;

    /// Discard the video encoder's prepared configuration. Called after a
    /// partial prepare failure and at surface teardown.
    fn release_video(&mut self);

    /// Discard the audio encoder's prepared configuration.
    fn release_audio(&mut self);

    fn start_preview(&mut self);
    fn stop_preview(&mut self);

    fn start_stream(&mut self);
    fn stop_stream(&mut self);

    /// Swap the capture device to the other facing while keeping encoder
    /// configuration. Fails if the target camera cannot be opened.
    fn switch_camera(&mut self) -> Result<()>;

    /// Ask the video encoder for an immediate keyframe.
    /// Returns false when the encoder is not running.
    fn request_keyframe(&mut self) -> bool;

    fn is_previewing(&self) -> bool;
    fn is_streaming(&self) -> bool;
}

/// Constructs the collaborator once a render surface is available
pub trait PipelineFactory: Send {
    /// Build a pipeline capturing from the `facing` camera and serving RTSP
    /// on `port`, delivering connection events through `events`. Fails with
    /// [`StreamerError::Initialization`](crate::StreamerError::Initialization)
    /// when e.g. the port is already bound or the camera is busy.
    fn open(
        &self,
        port: u16,
        facing: CameraFacing,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<Box<dyn CapturePipeline>>;
}
