//! Named standard video resolutions.
//!
//! Frame sizes may be given as a named resolution (`"720p"`, `"4K"`, ...)
//! anywhere a size in pixels is accepted; names are resolved to pixels at
//! construction time.

use crate::error::{MovieError, Result};
use serde::{Deserialize, Serialize};

/// Look up a standard resolution by name.
///
/// Names are case-insensitive. Returns `(width, height)` in pixels, or
/// `None` for unknown names.
pub fn named_resolution(name: &str) -> Option<(u32, u32)> {
    let size = match name.to_uppercase().as_str() {
        "VGA" | "480P" => (640, 480),
        "SVGA" => (800, 600),
        "XGA" => (1024, 768),
        "SXGA" => (1280, 1024),
        "UXGA" => (1600, 1200),
        "QXGA" => (2048, 1536),
        "WVGA" => (852, 480),
        "WXGA" | "720P" => (1280, 720),
        "WXGA+" => (1440, 900),
        "WSXGA+" => (1680, 1050),
        "FHD" | "1080P" => (1920, 1080),
        "WUXGA" => (1920, 1200),
        "WQXGA" => (2560, 1600),
        "WQHD" | "1440P" => (2560, 1440),
        "WQXGA+" => (3200, 1800),
        "UHD" | "2160P" => (3840, 2160),
        "4K" => (4096, 2160),
        "8K" => (7680, 4320),
        _ => return None,
    };
    Some(size)
}

/// A frame size given either in pixels or as a named standard resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameSize {
    /// Explicit size in pixels.
    Pixels { width: u32, height: u32 },
    /// A key understood by [`named_resolution`].
    Named(String),
}

impl FrameSize {
    /// Resolve to pixels.
    ///
    /// Fails for unknown names and zero dimensions.
    pub fn resolve(&self) -> Result<(u32, u32)> {
        let (width, height) = match self {
            Self::Pixels { width, height } => (*width, *height),
            Self::Named(name) => named_resolution(name).ok_or_else(|| {
                MovieError::InvalidParameter(format!("unknown video resolution: {name}"))
            })?,
        };
        if width == 0 || height == 0 {
            return Err(MovieError::InvalidParameter(format!(
                "frame size must be non-zero, got {width}x{height}"
            )));
        }
        Ok((width, height))
    }
}

impl From<(u32, u32)> for FrameSize {
    fn from((width, height): (u32, u32)) -> Self {
        Self::Pixels { width, height }
    }
}

impl From<&str> for FrameSize {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}
