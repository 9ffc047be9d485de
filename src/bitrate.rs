//! Bitrate scale mapper
//!
//! Bidirectional mapping between a bounded linear control position (a UI
//! slider) and a video bitrate. The mapping is logarithmic so the low end of
//! the slider has fine granularity while the high end still reaches tens of
//! megabits. Values are rounded to whole Kbps.

/// Bits per Kbps unit used throughout (binary kilobit, matching encoders
/// that take `kbps * 1024`).
const KBPS: u32 = 1024;

/// Log-scale mapping between control positions and bitrates
///
/// Pure and stateless: `to_bitrate` and `to_position` are exact inverses for
/// every integer position in `0..=max_position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitrateScale {
    /// Lowest selectable bitrate (bits/sec)
    pub min_bps: u32,
    /// Highest selectable bitrate (bits/sec)
    pub max_bps: u32,
    /// Highest control position (positions run 0..=max_position)
    pub max_position: u32,
}

impl Default for BitrateScale {
    fn default() -> Self {
        Self {
            min_bps: 128 * KBPS,
            max_bps: 60_000 * KBPS,
            max_position: 100,
        }
    }
}

impl BitrateScale {
    /// Create a scale over a custom bitrate range with 0..=100 positions
    pub fn new(min_bps: u32, max_bps: u32) -> Self {
        Self {
            min_bps,
            max_bps,
            max_position: 100,
        }
    }

    /// Convert a control position to a bitrate in bits/sec
    ///
    /// Positions beyond `max_position` are clamped. The endpoints map
    /// exactly to `min_bps` and `max_bps`.
    pub fn to_bitrate(&self, position: u32) -> u32 {
        let position = position.min(self.max_position);
        if position == 0 {
            return self.min_bps;
        }
        if position == self.max_position {
            return self.max_bps;
        }

        let t = f64::from(position) / f64::from(self.max_position);
        let span = f64::from(self.max_bps) / f64::from(self.min_bps);
        let bps = f64::from(self.min_bps) * span.powf(t);
        let kbps = (bps / f64::from(KBPS)).round() as u32;
        kbps * KBPS
    }

    /// Convert a bitrate in bits/sec back to the nearest control position
    ///
    /// Returns 0 for any bitrate at or below `min_bps` and `max_position`
    /// for any bitrate at or above `max_bps`.
    pub fn to_position(&self, bps: u32) -> u32 {
        if bps <= self.min_bps {
            return 0;
        }
        if bps >= self.max_bps {
            return self.max_position;
        }

        let ratio = (f64::from(bps) / f64::from(self.min_bps)).ln()
            / (f64::from(self.max_bps) / f64::from(self.min_bps)).ln();
        let position = (ratio * f64::from(self.max_position)).round() as u32;
        position.min(self.max_position)
    }
}

/// Format a bitrate for display: Kbps below 1000 Kbps, Mbps above
pub fn format_bitrate(bps: u32) -> String {
    let kbps = bps / KBPS;
    if kbps >= 1000 {
        format!("{:.1} Mbps", kbps as f64 / f64::from(KBPS))
    } else {
        format!("{} Kbps", kbps)
    }
}
