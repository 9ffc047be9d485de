//! Camera capability discovery
//!
//! Queries the hardware for the supported capture resolutions of a camera
//! facing and ranks them so index 0 is always the highest-resolution mode
//! that keeps the sensor's full field of view. Modes whose aspect ratio
//! crops the sensor are demoted regardless of pixel count.

use crate::error::{Result, StreamerError};

/// Aspect ratios within this distance of the sensor ratio count as native
const NATIVE_RATIO_TOLERANCE: f32 = 0.02;

/// Resolution used when an out-of-range index has no catalog entry at all
pub const SAFE_RESOLUTION: CaptureSize = CaptureSize {
    width: 1280,
    height: 720,
};

/// A capture resolution in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSize {
    pub width: u32,
    pub height: u32,
}

impl CaptureSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total pixel count, the secondary sort key
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Width over height
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

impl std::fmt::Display for CaptureSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Which camera on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraFacing {
    Front,
    #[default]
    Back,
}

impl CameraFacing {
    /// The other facing
    pub fn toggled(self) -> Self {
        match self {
            CameraFacing::Front => CameraFacing::Back,
            CameraFacing::Back => CameraFacing::Front,
        }
    }
}

impl std::fmt::Display for CameraFacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraFacing::Front => write!(f, "front"),
            CameraFacing::Back => write!(f, "back"),
        }
    }
}

/// Hardware query seam for capability discovery
///
/// Implemented by the platform capture layer. All queries are fallible:
/// a device may have no camera for the requested facing at all.
pub trait CameraProbe: Send {
    /// The sensor's full, uncropped active capture rectangle
    fn sensor_active_rect(&self, facing: CameraFacing) -> Result<CaptureSize>;

    /// Capture output sizes supported for this facing, in hardware order
    fn supported_sizes(&self, facing: CameraFacing) -> Result<Vec<CaptureSize>>;

    /// Sensor mounting orientation in degrees, if it can be read
    fn sensor_orientation(&self, facing: CameraFacing) -> Option<u32>;
}

/// Ranked capture resolutions for one camera facing
///
/// Replaced wholesale whenever the facing changes or discovery is retried;
/// entries are never mutated in place.
#[derive(Debug, Clone)]
pub struct CapabilityCatalog {
    facing: CameraFacing,
    native_ratio: f32,
    sizes: Vec<CaptureSize>,
}

impl CapabilityCatalog {
    /// Discover and rank the supported resolutions for `facing`
    ///
    /// Fails with `HardwareUnavailable` if the sensor or its output sizes
    /// cannot be queried; callers recover with [`CapabilityCatalog::fallback`].
    pub fn discover(probe: &dyn CameraProbe, facing: CameraFacing) -> Result<Self> {
        let active_rect = probe.sensor_active_rect(facing)?;
        if active_rect.height == 0 {
            return Err(StreamerError::HardwareUnavailable(format!(
                "degenerate sensor rect {}",
                active_rect
            )));
        }
        let native_ratio = active_rect.aspect_ratio();

        let mut sizes = probe.supported_sizes(facing)?;
        sizes.sort_by(|a, b| rank(*a, native_ratio).cmp(&rank(*b, native_ratio)));

        tracing::debug!(
            facing = %facing,
            native_ratio = native_ratio,
            modes = sizes.len(),
            "Camera capabilities discovered"
        );

        Ok(Self {
            facing,
            native_ratio,
            sizes,
        })
    }

    /// Hardcoded catalog used when discovery fails
    ///
    /// Native ratio is left at 0, so nothing matches the native partition
    /// and ordering degenerates to pure pixel count. That is the intended
    /// behavior for unknown sensors, not a bug.
    pub fn fallback(facing: CameraFacing) -> Self {
        Self {
            facing,
            native_ratio: 0.0,
            sizes: vec![CaptureSize::new(1920, 1080), CaptureSize::new(1280, 720)],
        }
    }

    pub fn facing(&self) -> CameraFacing {
        self.facing
    }

    /// Sensor aspect ratio, 0.0 when unknown
    pub fn native_ratio(&self) -> f32 {
        self.native_ratio
    }

    pub fn sizes(&self) -> &[CaptureSize] {
        &self.sizes
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Whether `index` refers to an actual catalog entry
    pub fn contains_index(&self, index: usize) -> bool {
        index < self.sizes.len()
    }

    /// Resolution at `index`, falling back to the first entry (then to
    /// [`SAFE_RESOLUTION`] if the catalog is somehow empty)
    pub fn resolution_at(&self, index: usize) -> CaptureSize {
        self.sizes
            .get(index)
            .or_else(|| self.sizes.first())
            .copied()
            .unwrap_or(SAFE_RESOLUTION)
    }

    /// Whether a size matches the sensor's native aspect ratio
    pub fn is_native(&self, size: CaptureSize) -> bool {
        (size.aspect_ratio() - self.native_ratio).abs() < NATIVE_RATIO_TOLERANCE
    }

    /// Human-readable label for a size: `1920x1080 (16:9) (Native)`
    pub fn describe(&self, size: CaptureSize) -> String {
        let divisor = gcd(size.width, size.height);
        let tag = if self.is_native(size) { " (Native)" } else { "" };
        format!(
            "{} ({}:{}){}",
            size,
            size.width / divisor.max(1),
            size.height / divisor.max(1),
            tag
        )
    }
}

/// Two-key sort rank: native-ratio matches first, then descending pixels
fn rank(size: CaptureSize, native_ratio: f32) -> (bool, std::cmp::Reverse<u64>) {
    let is_native = (size.aspect_ratio() - native_ratio).abs() < NATIVE_RATIO_TOLERANCE;
    (!is_native, std::cmp::Reverse(size.pixel_count()))
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}
