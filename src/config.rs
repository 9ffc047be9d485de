//! Streamer configuration

use crate::bitrate::BitrateScale;

/// Default RTSP port
pub const DEFAULT_RTSP_PORT: u16 = 8554;

/// Default audio sample rate (Hz)
pub const DEFAULT_AUDIO_SAMPLE_RATE: u32 = 44_100;

/// Default audio bitrate (128 Kbps)
pub const DEFAULT_AUDIO_BITRATE: u32 = 128 * 1024;

/// Streamer configuration options
#[derive(Debug, Clone)]
pub struct StreamerConfig {
    /// Port the RTSP serve endpoint binds to
    pub rtsp_port: u16,

    /// Audio sample rate in Hz
    pub audio_sample_rate: u32,

    /// Audio bitrate in bits/sec
    pub audio_bitrate: u32,

    /// Capture audio in stereo
    pub audio_stereo: bool,

    /// Video bitrate range exposed to the UI bitrate control
    pub bitrate_scale: BitrateScale,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            rtsp_port: DEFAULT_RTSP_PORT,
            audio_sample_rate: DEFAULT_AUDIO_SAMPLE_RATE,
            audio_bitrate: DEFAULT_AUDIO_BITRATE,
            audio_stereo: true,
            bitrate_scale: BitrateScale::default(),
        }
    }
}

impl StreamerConfig {
    /// Create a new config with a custom RTSP port
    pub fn with_port(port: u16) -> Self {
        Self {
            rtsp_port: port,
            ..Default::default()
        }
    }

    /// Set the RTSP port
    pub fn rtsp_port(mut self, port: u16) -> Self {
        self.rtsp_port = port;
        self
    }

    /// Set the audio sample rate
    pub fn audio_sample_rate(mut self, rate: u32) -> Self {
        self.audio_sample_rate = rate;
        self
    }

    /// Set the audio bitrate
    pub fn audio_bitrate(mut self, bps: u32) -> Self {
        self.audio_bitrate = bps;
        self
    }

    /// Capture mono audio
    pub fn mono_audio(mut self) -> Self {
        self.audio_stereo = false;
        self
    }

    /// Set the video bitrate range for the UI scale
    pub fn bitrate_scale(mut self, scale: BitrateScale) -> Self {
        self.bitrate_scale = scale;
        self
    }
}
