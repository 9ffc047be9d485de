//! Streaming session controller
//!
//! Owns the session state machine and orchestrates capability discovery,
//! settings application and the idle/preview/streaming transitions against
//! the capture/encode/serve collaborator.
//!
//! # Concurrency
//!
//! All session state (state machine, settings, catalog, viewer count) lives
//! behind one `tokio::sync::Mutex`; every public operation holds it for its
//! full duration, including failure paths. Connection events raised by the
//! serve endpoint on its own threads arrive over an mpsc queue and are
//! drained by a pump task that takes the same lock, so a `stop_streaming`
//! racing a connect event can never interleave with it.
//!
//! # Failure semantics
//!
//! Transitions are atomic: a collaborator failure mid-transition leaves the
//! controller in its pre-call state. Operations invalid for the current
//! state are no-ops that return the current state rather than errors.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::bitrate::format_bitrate;
use crate::capability::{CameraFacing, CameraProbe, CapabilityCatalog};
use crate::config::StreamerConfig;
use crate::error::{EncoderKind, Result, StreamerError};
use crate::event::{log_line, StreamerEvent};
use crate::net;
use crate::pipeline::{
    AudioParams, CapturePipeline, ConnectionEvent, PipelineFactory, VideoParams,
};
use crate::registry::ClientRegistry;
use crate::session::state::SessionState;
use crate::settings::{SessionSettings, FALLBACK_ROTATION_DEG};

/// Capacity of the host notification channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The streaming session controller
///
/// Construct with [`SessionController::new`], then drive it from the host:
/// `attach_surface` once a render target exists, `start_streaming` /
/// `stop_streaming` on user action, `detach_surface` on teardown.
pub struct SessionController {
    config: StreamerConfig,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<StreamerEvent>,
}

/// Everything the session lock protects
struct ControllerState {
    state: SessionState,
    /// Facing the user has selected
    facing: CameraFacing,
    /// Facing the capture hardware is actually using; diverges from
    /// `facing` while a switch is deferred during streaming
    live_facing: CameraFacing,
    settings: SessionSettings,
    catalog: CapabilityCatalog,
    clients: ClientRegistry,
    pipeline: Option<Box<dyn CapturePipeline>>,
    pump: Option<JoinHandle<()>>,
    probe: Box<dyn CameraProbe>,
    factory: Box<dyn PipelineFactory>,
    events: broadcast::Sender<StreamerEvent>,
}

impl SessionController {
    /// Create a controller over the given hardware probe and pipeline
    /// factory
    ///
    /// Capability discovery runs immediately for the default (back) facing;
    /// if it fails the hardcoded fallback resolution list is used.
    pub fn new(
        config: StreamerConfig,
        probe: Box<dyn CameraProbe>,
        factory: Box<dyn PipelineFactory>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let facing = CameraFacing::default();

        let catalog = CapabilityCatalog::discover(probe.as_ref(), facing).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Capability discovery failed, using fallback list");
            CapabilityCatalog::fallback(facing)
        });

        Arc::new(Self {
            config,
            events: events.clone(),
            inner: Mutex::new(ControllerState {
                state: SessionState::Idle,
                facing,
                live_facing: facing,
                settings: SessionSettings::default(),
                catalog,
                clients: ClientRegistry::new(),
                pipeline: None,
                pump: None,
                probe,
                factory,
                events,
            }),
        })
    }

    /// Subscribe to host notifications (state changes, log lines)
    pub fn subscribe(&self) -> broadcast::Receiver<StreamerEvent> {
        self.events.subscribe()
    }

    /// Build the collaborator session and start preview
    ///
    /// Called once a render target is ready. Construction failure (port
    /// already bound, camera busy) is surfaced as
    /// [`StreamerError::Initialization`] and is not retried; the controller
    /// stays Idle. A second call with a surface already attached is a no-op.
    pub async fn attach_surface(self: &Arc<Self>) -> Result<SessionState> {
        let mut inner = self.inner.lock().await;

        if inner.pipeline.is_some() {
            inner.log("Surface already attached");
            return Ok(inner.state);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let pipeline = match inner
            .factory
            .open(self.config.rtsp_port, inner.facing, tx)
        {
            Ok(pipeline) => pipeline,
            Err(e) => {
                inner.log(format!("Initialization failed: {}", e));
                return Err(e);
            }
        };

        inner.pipeline = Some(pipeline);
        inner.live_facing = inner.facing;
        inner.pump = Some(self.spawn_event_pump(rx));
        inner.log(format!("RTSP session ready at {}", self.stream_url()));

        let result = inner.start_preview(&self.config);
        inner.emit_state();
        match result {
            Ok(_) => Ok(inner.state),
            Err(e) => {
                inner.log(format!("Preview start failed: {}", e));
                Err(e)
            }
        }
    }

    /// Start the camera preview
    ///
    /// Valid only from Idle; a no-op returning the current state otherwise.
    pub async fn start_preview(&self) -> Result<SessionState> {
        let mut inner = self.inner.lock().await;
        match inner.start_preview(&self.config) {
            Ok(state) => {
                inner.emit_state();
                Ok(state)
            }
            Err(e) => {
                inner.log(format!("Preview start failed: {}", e));
                Err(e)
            }
        }
    }

    /// Start serving the stream
    ///
    /// Valid from Idle (preview is started implicitly) or Previewing. The
    /// video encoder is re-prepared with the current settings even if
    /// preview was already running with different values, so settings
    /// changed while idle take effect here. Both video and audio must
    /// prepare successfully; on partial failure the prepared half is
    /// released and the pre-call state is restored.
    pub async fn start_streaming(&self) -> Result<SessionState> {
        let mut inner = self.inner.lock().await;

        if inner.state.is_streaming() {
            inner.log("Already streaming");
            return Ok(inner.state);
        }

        let pre_state = inner.state;
        if inner.state.is_idle() {
            if let Err(e) = inner.start_preview(&self.config) {
                inner.log(format!("Stream start failed: {}", e));
                return Err(e);
            }
        }

        if let Err(e) = inner.prepare_encoders(&self.config) {
            if pre_state.is_idle() {
                // Undo the implicit preview so the pre-call state holds.
                inner.abandon_preview();
            }
            inner.log(format!("Stream start failed: {}", e));
            return Err(e);
        }

        let state = inner.commence_stream()?;
        inner.log(format!(
            "RTSP server started on port {} ({})",
            self.config.rtsp_port,
            inner.camera_summary()
        ));
        inner.emit_state();
        Ok(state)
    }

    /// Stop serving the stream
    ///
    /// The capture/preview pipeline deliberately keeps running so the local
    /// display does not go blank. The viewer count resets to 0 because
    /// disconnect events for a torn-down server are not guaranteed to
    /// arrive. A camera switch deferred during streaming is applied here.
    pub async fn stop_streaming(&self) -> Result<SessionState> {
        let mut inner = self.inner.lock().await;

        if !inner.state.is_streaming() {
            inner.log("Not streaming");
            return Ok(inner.state);
        }

        if let Some(pipeline) = inner.pipeline.as_mut() {
            pipeline.stop_stream();
        }
        inner.state = SessionState::Previewing;
        inner.clients.reset();
        inner.log(format!(
            "RTSP server stopped on port {}",
            self.config.rtsp_port
        ));

        if inner.facing != inner.live_facing {
            inner.apply_deferred_switch(&self.config);
        }

        inner.emit_state();
        Ok(inner.state)
    }

    /// Toggle between front and back camera
    ///
    /// Capabilities are rediscovered for the new facing. While Streaming the
    /// live capture keeps its original facing and the switch takes visual
    /// effect after the stream stops; otherwise the preview restarts
    /// immediately so the display matches the active camera.
    pub async fn switch_camera(&self) -> Result<SessionState> {
        let mut inner = self.inner.lock().await;
        let target = inner.facing.toggled();

        if inner.state.is_streaming() {
            inner.facing = target;
            inner.refresh_catalog();
            inner.log(format!(
                "Switched to {} camera; the live stream keeps its original capture until streaming stops",
                target
            ));
            inner.emit_state();
            return Ok(inner.state);
        }

        if let Some(pipeline) = inner.pipeline.as_mut() {
            if let Err(e) = pipeline.switch_camera() {
                inner.log(format!("Camera switch failed: {}", e));
                return Err(e);
            }
            inner.live_facing = target;
        }
        inner.facing = target;
        inner.refresh_catalog();
        inner.log(format!("Switched to {} camera", target));

        if inner.state.is_previewing() {
            inner.abandon_preview();
            if let Err(e) = inner.start_preview(&self.config) {
                inner.log(format!("Preview restart failed: {}", e));
                inner.emit_state();
                return Err(e);
            }
        }

        inner.emit_state();
        Ok(inner.state)
    }

    /// Validate and store new session settings
    ///
    /// Out-of-range indices fall back to safe defaults instead of failing.
    /// While Streaming the values are recorded but not pushed into the live
    /// encoder (mid-stream reconfiguration is unsupported); otherwise the
    /// preview restarts immediately with the new parameters. Returns the
    /// settings as actually stored.
    pub async fn apply_settings(&self, new: SessionSettings) -> Result<SessionSettings> {
        let mut inner = self.inner.lock().await;

        let sanitized = new.sanitized(&inner.catalog);
        inner.settings = sanitized;
        inner.log(format!("Settings applied: {}", inner.camera_summary()));

        if inner.state.is_streaming() {
            inner.log("New encoder settings take effect at the next stream start");
        } else if inner.pipeline.is_some() {
            inner.abandon_preview();
            if let Err(e) = inner.start_preview(&self.config) {
                inner.log(format!("Preview restart failed: {}", e));
                inner.emit_state();
                return Err(e);
            }
        }

        inner.emit_state();
        Ok(sanitized)
    }

    /// Tear everything down and return to Idle, unconditionally
    ///
    /// Stops streaming if live, stops preview, releases both encoders,
    /// drops the collaborator and the event pump, resets the viewer count.
    pub async fn detach_surface(&self) -> SessionState {
        let mut inner = self.inner.lock().await;

        if let Some(mut pipeline) = inner.pipeline.take() {
            if inner.state.is_streaming() {
                pipeline.stop_stream();
                inner.log("Stream stopped");
            }
            if pipeline.is_previewing() {
                pipeline.stop_preview();
            }
            pipeline.release_video();
            pipeline.release_audio();
        }
        if let Some(pump) = inner.pump.take() {
            pump.abort();
        }

        inner.state = SessionState::Idle;
        inner.clients.reset();
        inner.log("Session torn down");
        inner.emit_state();
        SessionState::Idle
    }

    /// Apply one connection event from the serve endpoint
    ///
    /// Normally invoked by the internal pump task; exposed for hosts that
    /// run their own event loop.
    pub async fn handle_connection_event(&self, event: ConnectionEvent) {
        let mut inner = self.inner.lock().await;

        match event {
            ConnectionEvent::Connected(client) => {
                let count = inner.clients.connected(&client);
                inner.log(format!("Client connected: {} ({} viewers)", client, count));
                inner.request_keyframe_for_new_viewer();
                inner.emit_state();
            }
            ConnectionEvent::Disconnected(client) => {
                let count = inner.clients.disconnected(&client);
                inner.log(format!(
                    "Client disconnected: {} ({} viewers)",
                    client, count
                ));
                inner.emit_state();
            }
            ConnectionEvent::BitrateReport(client, bps) => {
                // Reserved extension point; informational only.
                tracing::debug!(client = %client, bitrate = bps, "Client bitrate report");
            }
        }
    }

    /// Current session state
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Number of connected viewers
    pub async fn client_count(&self) -> usize {
        self.inner.lock().await.clients.count()
    }

    /// Currently applied settings
    pub async fn settings(&self) -> SessionSettings {
        self.inner.lock().await.settings
    }

    /// Capability catalog for the selected facing
    pub async fn catalog(&self) -> CapabilityCatalog {
        self.inner.lock().await.catalog.clone()
    }

    /// Selected camera facing
    pub async fn facing(&self) -> CameraFacing {
        self.inner.lock().await.facing
    }

    /// One-line summary of the active camera configuration
    pub async fn camera_summary(&self) -> String {
        self.inner.lock().await.camera_summary()
    }

    /// The URL viewers should open
    pub fn stream_url(&self) -> String {
        net::stream_url(net::host_ipv4(), self.config.rtsp_port)
    }

    pub fn config(&self) -> &StreamerConfig {
        &self.config
    }

    /// Drain connection events into the controller
    ///
    /// The pump holds only a weak handle: the pipeline keeps the sender
    /// alive, so a strong handle here would keep a dropped controller (and
    /// this task) pinned forever.
    fn spawn_event_pump(
        self: &Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    ) -> JoinHandle<()> {
        let controller = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                controller.handle_connection_event(event).await;
            }
        })
    }
}

impl ControllerState {
    /// Prepare the pipeline from current settings and enter Previewing
    ///
    /// No-op returning the current state unless Idle. Audio is prepared here
    /// too (best-effort) so stream start does not wait on it.
    fn start_preview(&mut self, config: &StreamerConfig) -> Result<SessionState> {
        if !self.state.is_idle() {
            return Ok(self.state);
        }

        let params = self.video_params();
        let audio = audio_params(config);
        {
            let Some(pipeline) = self.pipeline.as_mut() else {
                return Err(StreamerError::Initialization(
                    "no render surface attached".into(),
                ));
            };
            if !pipeline.prepare_video(&params) {
                return Err(StreamerError::EncoderPrepare(EncoderKind::Video));
            }
            pipeline.start_preview();
            if !pipeline.prepare_audio(&audio) {
                tracing::warn!("Audio encoder rejected preview-time preparation");
            }
        }

        self.state = SessionState::Previewing;
        self.log(format!(
            "Camera preview started ({}x{} @ {}fps, {}°)",
            params.width, params.height, params.fps, params.rotation_deg
        ));
        Ok(self.state)
    }

    /// Re-prepare both encoders with the current settings for stream start
    ///
    /// On partial failure the successfully prepared half is released so the
    /// pipeline is never left half-started.
    fn prepare_encoders(&mut self, config: &StreamerConfig) -> Result<()> {
        let params = self.video_params();
        let audio = audio_params(config);

        let Some(pipeline) = self.pipeline.as_mut() else {
            return Err(StreamerError::Initialization(
                "no render surface attached".into(),
            ));
        };
        if !pipeline.prepare_video(&params) {
            return Err(StreamerError::EncoderPrepare(EncoderKind::Video));
        }
        if !pipeline.prepare_audio(&audio) {
            pipeline.release_video();
            return Err(StreamerError::EncoderPrepare(EncoderKind::Audio));
        }
        Ok(())
    }

    /// Restart preview on the freshly prepared encoders and open the serve
    /// endpoint
    fn commence_stream(&mut self) -> Result<SessionState> {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Err(StreamerError::Initialization(
                "no render surface attached".into(),
            ));
        };
        pipeline.start_preview();
        pipeline.start_stream();
        self.state = SessionState::Streaming;
        Ok(self.state)
    }

    /// Stop preview and drop back to Idle
    fn abandon_preview(&mut self) {
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.stop_preview();
        }
        self.state = SessionState::Idle;
    }

    /// Apply a camera switch that was deferred while streaming
    ///
    /// Best-effort: a failure leaves the old camera live and is logged, not
    /// escalated, since the stream itself already stopped cleanly.
    fn apply_deferred_switch(&mut self, config: &StreamerConfig) {
        let target = self.facing;
        let Some(pipeline) = self.pipeline.as_mut() else {
            self.live_facing = target;
            return;
        };
        if let Err(e) = pipeline.switch_camera() {
            self.log(format!("Deferred camera switch failed: {}", e));
            return;
        }
        pipeline.stop_preview();
        self.live_facing = target;
        self.state = SessionState::Idle;
        match self.start_preview(config) {
            Ok(_) => self.log(format!("Switched to {} camera", target)),
            Err(e) => self.log(format!("Preview restart failed after camera switch: {}", e)),
        }
    }

    /// Re-run capability discovery for the selected facing
    ///
    /// Falls back to the hardcoded list on failure. The resolution selection
    /// resets to the new catalog's best mode either way.
    fn refresh_catalog(&mut self) {
        match CapabilityCatalog::discover(self.probe.as_ref(), self.facing) {
            Ok(catalog) => self.catalog = catalog,
            Err(e) => {
                self.log(format!("Capability discovery failed: {}", e));
                self.catalog = CapabilityCatalog::fallback(self.facing);
            }
        }
        self.settings.resolution_index = 0;
    }

    /// Best-effort keyframe request so a newly joined viewer can decode
    /// without waiting for the next scheduled interval
    fn request_keyframe_for_new_viewer(&mut self) {
        if !self.state.is_streaming() {
            return;
        }
        let Some(pipeline) = self.pipeline.as_mut() else {
            return;
        };
        if pipeline.request_keyframe() {
            self.log("Keyframe requested for new viewer");
        } else {
            tracing::warn!("Keyframe request ignored: encoder not running");
        }
    }

    /// Encoder parameters derived from the current settings and catalog
    fn video_params(&self) -> VideoParams {
        let settings = self.settings.sanitized(&self.catalog);
        let size = self.catalog.resolution_at(settings.resolution_index);
        let rotation = self
            .probe
            .sensor_orientation(self.facing)
            .unwrap_or(FALLBACK_ROTATION_DEG);

        VideoParams {
            width: size.width,
            height: size.height,
            fps: settings.fps(),
            bitrate_bps: settings.video_bitrate_bps,
            iframe_interval_secs: settings.iframe_interval_secs,
            rotation_deg: rotation,
            low_latency: settings.low_latency,
            intra_refresh_period: settings.intra_refresh_period,
        }
    }

    fn camera_summary(&self) -> String {
        let settings = self.settings.sanitized(&self.catalog);
        let size = self.catalog.resolution_at(settings.resolution_index);
        format!(
            "{} camera | {} @ {}fps | {}",
            self.facing,
            size,
            settings.fps(),
            format_bitrate(settings.video_bitrate_bps)
        )
    }

    fn emit_state(&self) {
        let _ = self.events.send(StreamerEvent::StateChanged {
            state: self.state,
            clients: self.clients.count(),
            facing: self.facing,
            settings: self.settings,
        });
    }

    /// Log both to tracing and to host subscribers as a timestamped line
    fn log(&self, message: impl AsRef<str>) {
        tracing::info!("{}", message.as_ref());
        let _ = self
            .events
            .send(StreamerEvent::Log(log_line(message.as_ref())));
    }
}

fn audio_params(config: &StreamerConfig) -> AudioParams {
    AudioParams {
        bitrate_bps: config.audio_bitrate,
        sample_rate_hz: config.audio_sample_rate,
        stereo: config.audio_stereo,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use super::*;
    use crate::capability::CaptureSize;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("rtsp_camera=debug")
            .with_test_writer()
            .try_init();
    }

    /// Shared handle into the fake collaborator, visible to tests after the
    /// pipeline has been boxed away inside the controller
    #[derive(Default)]
    struct Hub {
        fail_open: AtomicBool,
        fail_video: AtomicBool,
        fail_audio: AtomicBool,
        fail_switch: AtomicBool,
        previewing: AtomicBool,
        streaming: AtomicBool,
        keyframes: AtomicUsize,
        camera_switches: AtomicUsize,
        released_video: AtomicUsize,
        released_audio: AtomicUsize,
        last_video: StdMutex<Option<VideoParams>>,
        event_tx: StdMutex<Option<mpsc::UnboundedSender<ConnectionEvent>>>,
    }

    struct FakePipeline {
        hub: Arc<Hub>,
    }

    impl CapturePipeline for FakePipeline {
        fn prepare_video(&mut self, params: &VideoParams) -> bool {
            if self.hub.fail_video.load(Ordering::SeqCst) {
                return false;
            }
            *self.hub.last_video.lock().unwrap() = Some(*params);
            true
        }

        fn prepare_audio(&mut self, _params: &AudioParams) -> bool {
            !self.hub.fail_audio.load(Ordering::SeqCst)
        }

        fn release_video(&mut self) {
            self.hub.released_video.fetch_add(1, Ordering::SeqCst);
        }

        fn release_audio(&mut self) {
            self.hub.released_audio.fetch_add(1, Ordering::SeqCst);
        }

        fn start_preview(&mut self) {
            self.hub.previewing.store(true, Ordering::SeqCst);
        }

        fn stop_preview(&mut self) {
            self.hub.previewing.store(false, Ordering::SeqCst);
        }

        fn start_stream(&mut self) {
            self.hub.streaming.store(true, Ordering::SeqCst);
        }

        fn stop_stream(&mut self) {
            self.hub.streaming.store(false, Ordering::SeqCst);
        }

        fn switch_camera(&mut self) -> Result<()> {
            if self.hub.fail_switch.load(Ordering::SeqCst) {
                return Err(StreamerError::CameraSwitch("target camera busy".into()));
            }
            self.hub.camera_switches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn request_keyframe(&mut self) -> bool {
            if !self.hub.streaming.load(Ordering::SeqCst) {
                return false;
            }
            self.hub.keyframes.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn is_previewing(&self) -> bool {
            self.hub.previewing.load(Ordering::SeqCst)
        }

        fn is_streaming(&self) -> bool {
            self.hub.streaming.load(Ordering::SeqCst)
        }
    }

    struct FakeFactory {
        hub: Arc<Hub>,
    }

    impl PipelineFactory for FakeFactory {
        fn open(
            &self,
            _port: u16,
            _facing: CameraFacing,
            events: mpsc::UnboundedSender<ConnectionEvent>,
        ) -> Result<Box<dyn CapturePipeline>> {
            if self.hub.fail_open.load(Ordering::SeqCst) {
                return Err(StreamerError::Initialization(
                    "port 8554 already in use".into(),
                ));
            }
            *self.hub.event_tx.lock().unwrap() = Some(events);
            Ok(Box::new(FakePipeline {
                hub: Arc::clone(&self.hub),
            }))
        }
    }

    /// 4:3 sensor with one native mode and two cropped 16:9 modes
    struct FakeProbe;

    impl CameraProbe for FakeProbe {
        fn sensor_active_rect(&self, _facing: CameraFacing) -> Result<CaptureSize> {
            Ok(CaptureSize::new(4000, 3000))
        }

        fn supported_sizes(&self, _facing: CameraFacing) -> Result<Vec<CaptureSize>> {
            Ok(vec![
                CaptureSize::new(1920, 1080),
                CaptureSize::new(4000, 3000),
                CaptureSize::new(1280, 720),
            ])
        }

        fn sensor_orientation(&self, _facing: CameraFacing) -> Option<u32> {
            Some(90)
        }
    }

    fn controller_with_hub() -> (Arc<SessionController>, Arc<Hub>) {
        let hub = Arc::new(Hub::default());
        let controller = SessionController::new(
            StreamerConfig::default(),
            Box::new(FakeProbe),
            Box::new(FakeFactory {
                hub: Arc::clone(&hub),
            }),
        );
        (controller, hub)
    }

    #[tokio::test]
    async fn test_attach_surface_starts_preview() {
        init_tracing();
        let (controller, hub) = controller_with_hub();

        let state = controller.attach_surface().await.unwrap();

        assert_eq!(state, SessionState::Previewing);
        assert!(hub.previewing.load(Ordering::SeqCst));
        assert!(!hub.streaming.load(Ordering::SeqCst));

        // The probe's sensor orientation flows into the encoder.
        let params = hub.last_video.lock().unwrap().unwrap();
        assert_eq!(params.rotation_deg, 90);
        // Catalog index 0 is the native 4:3 mode.
        assert_eq!((params.width, params.height), (4000, 3000));
    }

    #[tokio::test]
    async fn test_attach_surface_initialization_failure_stays_idle() {
        let (controller, hub) = controller_with_hub();
        hub.fail_open.store(true, Ordering::SeqCst);

        let result = controller.attach_surface().await;

        assert!(matches!(result, Err(StreamerError::Initialization(_))));
        assert_eq!(controller.state().await, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_start_streaming_requires_both_prepares() {
        let (controller, hub) = controller_with_hub();
        controller.attach_surface().await.unwrap();
        assert_eq!(controller.state().await, SessionState::Previewing);

        // From Previewing: audio failure releases the prepared video half.
        hub.fail_audio.store(true, Ordering::SeqCst);
        let result = controller.start_streaming().await;
        assert!(matches!(
            result,
            Err(StreamerError::EncoderPrepare(EncoderKind::Audio))
        ));
        assert_eq!(controller.state().await, SessionState::Previewing);
        assert_eq!(hub.released_video.load(Ordering::SeqCst), 1);
        assert_eq!(controller.client_count().await, 0);

        // Video failure: no release necessary, state unchanged.
        hub.fail_audio.store(false, Ordering::SeqCst);
        hub.fail_video.store(true, Ordering::SeqCst);
        let result = controller.start_streaming().await;
        assert!(matches!(
            result,
            Err(StreamerError::EncoderPrepare(EncoderKind::Video))
        ));
        assert_eq!(controller.state().await, SessionState::Previewing);

        // Both succeed: Streaming.
        hub.fail_video.store(false, Ordering::SeqCst);
        let state = controller.start_streaming().await.unwrap();
        assert_eq!(state, SessionState::Streaming);
        assert!(hub.streaming.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_start_streaming_from_idle_rolls_back_on_failure() {
        let (controller, hub) = controller_with_hub();

        // Attach with a failing video encoder: surface attaches but preview
        // cannot start, leaving Idle with a pipeline present.
        hub.fail_video.store(true, Ordering::SeqCst);
        let result = controller.attach_surface().await;
        assert!(matches!(
            result,
            Err(StreamerError::EncoderPrepare(EncoderKind::Video))
        ));
        assert_eq!(controller.state().await, SessionState::Idle);

        // From Idle, a forced failure must land back in Idle with no viewers.
        let result = controller.start_streaming().await;
        assert!(result.is_err());
        assert_eq!(controller.state().await, SessionState::Idle);
        assert_eq!(controller.client_count().await, 0);

        // Audio failing after the implicit preview also rolls back to Idle.
        hub.fail_video.store(false, Ordering::SeqCst);
        hub.fail_audio.store(true, Ordering::SeqCst);
        let result = controller.start_streaming().await;
        assert!(matches!(
            result,
            Err(StreamerError::EncoderPrepare(EncoderKind::Audio))
        ));
        assert_eq!(controller.state().await, SessionState::Idle);
        assert!(!hub.previewing.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_keyframe_per_connect_and_count_reset_on_stop() {
        let (controller, hub) = controller_with_hub();
        controller.attach_surface().await.unwrap();
        controller.start_streaming().await.unwrap();

        controller
            .handle_connection_event(ConnectionEvent::Connected("a".into()))
            .await;
        controller
            .handle_connection_event(ConnectionEvent::Connected("b".into()))
            .await;

        assert_eq!(controller.client_count().await, 2);
        assert_eq!(hub.keyframes.load(Ordering::SeqCst), 2);

        let state = controller.stop_streaming().await.unwrap();
        assert_eq!(state, SessionState::Previewing);
        assert_eq!(controller.client_count().await, 0);
        // Preview deliberately keeps running.
        assert!(hub.previewing.load(Ordering::SeqCst));
        assert!(!hub.streaming.load(Ordering::SeqCst));

        // A straggler connect after stop must not request keyframes.
        controller
            .handle_connection_event(ConnectionEvent::Connected("c".into()))
            .await;
        assert_eq!(hub.keyframes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bitrate_report_changes_nothing() {
        let (controller, _hub) = controller_with_hub();
        controller.attach_surface().await.unwrap();

        controller
            .handle_connection_event(ConnectionEvent::BitrateReport("a".into(), 4_000_000))
            .await;

        assert_eq!(controller.client_count().await, 0);
        assert_eq!(controller.state().await, SessionState::Previewing);
    }

    #[tokio::test]
    async fn test_disconnect_floored_at_zero() {
        let (controller, _hub) = controller_with_hub();

        controller
            .handle_connection_event(ConnectionEvent::Disconnected("ghost".into()))
            .await;

        assert_eq!(controller.client_count().await, 0);
    }

    #[tokio::test]
    async fn test_apply_settings_out_of_range_falls_back() {
        let (controller, _hub) = controller_with_hub();
        assert_eq!(controller.catalog().await.len(), 3);

        let applied = controller
            .apply_settings(SessionSettings {
                resolution_index: 999,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(applied.resolution_index, 0);
    }

    #[tokio::test]
    async fn test_apply_settings_restarts_preview() {
        let (controller, hub) = controller_with_hub();
        controller.attach_surface().await.unwrap();

        let applied = controller
            .apply_settings(SessionSettings {
                resolution_index: 1,
                fps_index: 1,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(applied.resolution_index, 1);
        assert_eq!(controller.state().await, SessionState::Previewing);

        // Preview restarted with the newly selected mode: second-ranked
        // entry is the larger cropped 16:9 mode.
        let params = hub.last_video.lock().unwrap().unwrap();
        assert_eq!((params.width, params.height), (1920, 1080));
        assert_eq!(params.fps, 60);
    }

    #[tokio::test]
    async fn test_apply_settings_while_streaming_is_recorded_only() {
        let (controller, hub) = controller_with_hub();
        controller.attach_surface().await.unwrap();
        controller.start_streaming().await.unwrap();
        let before = hub.last_video.lock().unwrap().unwrap();

        controller
            .apply_settings(SessionSettings {
                resolution_index: 1,
                ..Default::default()
            })
            .await
            .unwrap();

        // Still streaming, encoder untouched.
        assert_eq!(controller.state().await, SessionState::Streaming);
        let after = hub.last_video.lock().unwrap().unwrap();
        assert_eq!(before, after);

        // The recorded settings take effect at the next stream start.
        controller.stop_streaming().await.unwrap();
        controller.start_streaming().await.unwrap();
        let next = hub.last_video.lock().unwrap().unwrap();
        assert_eq!((next.width, next.height), (1920, 1080));
    }

    #[tokio::test]
    async fn test_switch_camera_deferred_while_streaming() {
        let (controller, hub) = controller_with_hub();
        controller.attach_surface().await.unwrap();
        controller.start_streaming().await.unwrap();

        let state = controller.switch_camera().await.unwrap();

        // Facing is recorded, hardware untouched while live.
        assert_eq!(state, SessionState::Streaming);
        assert_eq!(controller.facing().await, CameraFacing::Front);
        assert_eq!(hub.camera_switches.load(Ordering::SeqCst), 0);

        // The deferred switch applies when streaming stops.
        controller.stop_streaming().await.unwrap();
        assert_eq!(hub.camera_switches.load(Ordering::SeqCst), 1);
        assert_eq!(controller.state().await, SessionState::Previewing);
    }

    #[tokio::test]
    async fn test_switch_camera_failure_keeps_facing() {
        let (controller, hub) = controller_with_hub();
        controller.attach_surface().await.unwrap();
        hub.fail_switch.store(true, Ordering::SeqCst);

        let result = controller.switch_camera().await;

        assert!(matches!(result, Err(StreamerError::CameraSwitch(_))));
        // Facing only toggles when the hardware switch applies cleanly.
        assert_eq!(controller.facing().await, CameraFacing::Back);
        assert_eq!(controller.state().await, SessionState::Previewing);
        assert!(hub.previewing.load(Ordering::SeqCst));
        assert_eq!(hub.camera_switches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_deferred_switch_failure_keeps_old_camera() {
        let (controller, hub) = controller_with_hub();
        controller.attach_surface().await.unwrap();
        controller.start_streaming().await.unwrap();
        controller.switch_camera().await.unwrap();
        hub.fail_switch.store(true, Ordering::SeqCst);

        // The deferred switch fails when streaming stops: the old camera
        // stays live, the stop itself still succeeds.
        let state = controller.stop_streaming().await.unwrap();

        assert_eq!(state, SessionState::Previewing);
        assert_eq!(hub.camera_switches.load(Ordering::SeqCst), 0);
        assert!(hub.previewing.load(Ordering::SeqCst));
        assert_eq!(controller.facing().await, CameraFacing::Front);
    }

    #[tokio::test]
    async fn test_switch_camera_while_previewing_restarts_preview() {
        let (controller, hub) = controller_with_hub();
        controller.attach_surface().await.unwrap();

        let state = controller.switch_camera().await.unwrap();

        assert_eq!(state, SessionState::Previewing);
        assert_eq!(controller.facing().await, CameraFacing::Front);
        assert_eq!(hub.camera_switches.load(Ordering::SeqCst), 1);
        assert!(hub.previewing.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_detach_surface_from_any_state() {
        // From Idle.
        let (controller, _hub) = controller_with_hub();
        assert_eq!(controller.detach_surface().await, SessionState::Idle);
        assert_eq!(controller.client_count().await, 0);

        // From Previewing.
        let (controller, _hub) = controller_with_hub();
        controller.attach_surface().await.unwrap();
        assert_eq!(controller.detach_surface().await, SessionState::Idle);

        // From Streaming, with viewers attached.
        let (controller, hub) = controller_with_hub();
        controller.attach_surface().await.unwrap();
        controller.start_streaming().await.unwrap();
        controller
            .handle_connection_event(ConnectionEvent::Connected("a".into()))
            .await;
        assert_eq!(controller.detach_surface().await, SessionState::Idle);
        assert_eq!(controller.client_count().await, 0);
        assert!(!hub.streaming.load(Ordering::SeqCst));
        assert!(!hub.previewing.load(Ordering::SeqCst));
        // Teardown releases both encoders before dropping the pipeline.
        assert!(hub.released_video.load(Ordering::SeqCst) >= 1);
        assert!(hub.released_audio.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_start_streaming_twice_is_noop() {
        let (controller, _hub) = controller_with_hub();
        controller.attach_surface().await.unwrap();
        controller.start_streaming().await.unwrap();

        let state = controller.start_streaming().await.unwrap();
        assert_eq!(state, SessionState::Streaming);
    }

    #[tokio::test]
    async fn test_start_preview_noop_when_not_idle() {
        let (controller, _hub) = controller_with_hub();
        controller.attach_surface().await.unwrap();

        let state = controller.start_preview().await.unwrap();
        assert_eq!(state, SessionState::Previewing);
    }

    #[tokio::test]
    async fn test_event_pump_delivers_connection_events() {
        let (controller, hub) = controller_with_hub();
        controller.attach_surface().await.unwrap();
        controller.start_streaming().await.unwrap();

        let tx = hub.event_tx.lock().unwrap().clone().unwrap();
        tx.send(ConnectionEvent::Connected("10.0.0.9:51000".into()))
            .unwrap();

        for _ in 0..100 {
            if controller.client_count().await == 1 {
                assert_eq!(hub.keyframes.load(Ordering::SeqCst), 1);
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("connection event was not pumped into the controller");
    }

    #[tokio::test]
    async fn test_event_pump_does_not_keep_controller_alive() {
        let (controller, hub) = controller_with_hub();
        controller.attach_surface().await.unwrap();

        // The pump holds only a weak handle.
        assert_eq!(Arc::strong_count(&controller), 1);

        // Dropping the host's handle must free the controller even though
        // the pipeline-side sender is still live.
        let weak = Arc::downgrade(&controller);
        drop(controller);
        assert!(weak.upgrade().is_none());

        // A straggler event on the orphaned queue must not panic the pump.
        let tx = hub.event_tx.lock().unwrap().clone().unwrap();
        let _ = tx.send(ConnectionEvent::Connected("late".into()));
    }

    #[tokio::test]
    async fn test_state_change_events_reach_subscribers() {
        let (controller, _hub) = controller_with_hub();
        let mut events = controller.subscribe();

        controller.attach_surface().await.unwrap();

        // Scan past log lines for the state notification.
        let mut saw_previewing = false;
        while let Ok(event) = events.try_recv() {
            if let StreamerEvent::StateChanged { state, clients, .. } = event {
                assert_eq!(clients, 0);
                if state == SessionState::Previewing {
                    saw_previewing = true;
                }
            }
        }
        assert!(saw_previewing);
    }

    #[tokio::test]
    async fn test_stream_url_format() {
        let (controller, _hub) = controller_with_hub();

        let url = controller.stream_url();
        assert!(url.starts_with("rtsp://"));
        assert!(url.ends_with(":8554/"));
    }
}
