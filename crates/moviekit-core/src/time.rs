//! Frame rates and presentation-timestamp helpers.
//!
//! Frame rates are rational numbers so NTSC rates (24000/1001 and friends)
//! stay exact. Presentation timestamps are `f64` seconds throughout;
//! callers round them with [`round_pts`] before comparing.

use crate::error::{MovieError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Precision of presentation timestamps, in decimal places.
pub const PTS_PRECISION: i32 = 6;

/// Round a presentation timestamp to [`PTS_PRECISION`] decimal places.
///
/// Keeps floating-point jitter from making two timestamps that refer to
/// the same frame compare unequal (which would trigger spurious seeks).
#[inline]
pub fn round_pts(pts: f64) -> f64 {
    let scale = 10f64.powi(PTS_PRECISION);
    (pts * scale).round() / scale
}

/// Frame rate as a rational number (e.g., 24000/1001 for 23.976 fps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    /// Numerator (e.g., 24000)
    pub numerator: u32,
    /// Denominator (e.g., 1001)
    pub denominator: u32,
}

impl FrameRate {
    /// Create a new frame rate.
    #[inline]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Create a frame rate from a floating-point fps value.
    ///
    /// Fails when `fps` is not finite or not greater than zero. Fractional
    /// rates are held to millihertz precision.
    pub fn from_fps(fps: f64) -> Result<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(MovieError::InvalidParameter(format!(
                "frame rate must be > 0, got {fps}"
            )));
        }
        if (fps - fps.round()).abs() < f64::EPSILON {
            return Ok(Self::new(fps.round() as u32, 1));
        }
        Ok(Self::new((fps * 1000.0).round() as u32, 1000))
    }

    /// Convert to frames per second as f64.
    #[inline]
    pub fn to_fps_f64(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Duration of a single frame in seconds.
    #[inline]
    pub fn interval(self) -> f64 {
        self.denominator as f64 / self.numerator as f64
    }

    /// Common frame rates
    pub const FPS_23_976: Self = Self::new(24000, 1001);
    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_25: Self = Self::new(25, 1);
    pub const FPS_29_97: Self = Self::new(30000, 1001);
    pub const FPS_30: Self = Self::new(30, 1);
    pub const FPS_50: Self = Self::new(50, 1);
    pub const FPS_59_94: Self = Self::new(60000, 1001);
    pub const FPS_60: Self = Self::new(60, 1);
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FPS_30
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fps = self.to_fps_f64();
        if (fps - fps.round()).abs() < 0.001 {
            write!(f, "{} fps", fps.round() as u32)
        } else {
            write!(f, "{:.3} fps", fps)
        }
    }
}
