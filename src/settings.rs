//! Session settings
//!
//! Immutable snapshot of the streaming configuration the user has applied.
//! Indices reference the capability catalog and the fixed fps table; they
//! are validated at apply time, never at selection time.

use crate::capability::CapabilityCatalog;

/// Frame rates offered to the user, in preference order
pub const SUPPORTED_FPS: [u32; 4] = [30, 60, 24, 15];

/// Fps used when an index is out of range
pub const DEFAULT_FPS: u32 = 30;

/// Encoder rotation applied when the sensor orientation cannot be read
pub const FALLBACK_ROTATION_DEG: u32 = 90;

/// User-selected streaming configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Index into the capability catalog
    pub resolution_index: usize,
    /// Index into [`SUPPORTED_FPS`]
    pub fps_index: usize,
    /// Video bitrate in bits/sec
    pub video_bitrate_bps: u32,
    /// Keyframe interval in seconds
    pub iframe_interval_secs: u32,
    /// Trade compression efficiency for encode latency
    pub low_latency: bool,
    /// Intra-refresh period in frames, 0 disables
    pub intra_refresh_period: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            resolution_index: 0,
            fps_index: 0,
            video_bitrate_bps: 6_000 * 1024, // 6 Mbps
            iframe_interval_secs: 2,
            low_latency: false,
            intra_refresh_period: 0,
        }
    }
}

impl SessionSettings {
    /// Selected fps, falling back to [`DEFAULT_FPS`] on a stale index
    pub fn fps(&self) -> u32 {
        fps_at(self.fps_index)
    }

    /// Copy of these settings with out-of-range indices replaced by safe
    /// defaults (first catalog entry, first fps entry)
    ///
    /// Catalog entries can disappear between selection and apply (a camera
    /// switch shrinks the list), so validation happens here rather than
    /// erroring at the caller.
    pub fn sanitized(&self, catalog: &CapabilityCatalog) -> Self {
        let mut settings = *self;
        if !catalog.contains_index(settings.resolution_index) {
            settings.resolution_index = 0;
        }
        if settings.fps_index >= SUPPORTED_FPS.len() {
            settings.fps_index = 0;
        }
        settings
    }
}

/// Fps at `index` in the fixed table, [`DEFAULT_FPS`] when out of range
pub fn fps_at(index: usize) -> u32 {
    SUPPORTED_FPS.get(index).copied().unwrap_or(DEFAULT_FPS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CameraFacing, CapabilityCatalog};

    #[test]
    fn test_defaults() {
        let settings = SessionSettings::default();

        assert_eq!(settings.resolution_index, 0);
        assert_eq!(settings.fps(), 30);
        assert_eq!(settings.video_bitrate_bps, 6_000 * 1024);
        assert_eq!(settings.iframe_interval_secs, 2);
        assert!(!settings.low_latency);
        assert_eq!(settings.intra_refresh_period, 0);
    }

    #[test]
    fn test_sanitized_out_of_range_resolution() {
        // Fallback catalog has 2 entries.
        let catalog = CapabilityCatalog::fallback(CameraFacing::Back);
        let settings = SessionSettings {
            resolution_index: 999,
            ..Default::default()
        };

        let sanitized = settings.sanitized(&catalog);
        assert_eq!(sanitized.resolution_index, 0);
    }

    #[test]
    fn test_sanitized_keeps_valid_indices() {
        let catalog = CapabilityCatalog::fallback(CameraFacing::Back);
        let settings = SessionSettings {
            resolution_index: 1,
            fps_index: 2,
            ..Default::default()
        };

        let sanitized = settings.sanitized(&catalog);
        assert_eq!(sanitized.resolution_index, 1);
        assert_eq!(sanitized.fps_index, 2);
        assert_eq!(sanitized.fps(), 24);
    }

    #[test]
    fn test_stale_fps_index_falls_back() {
        let catalog = CapabilityCatalog::fallback(CameraFacing::Back);
        let settings = SessionSettings {
            fps_index: 42,
            ..Default::default()
        };

        assert_eq!(settings.fps(), DEFAULT_FPS);
        assert_eq!(settings.sanitized(&catalog).fps_index, 0);
    }
}
