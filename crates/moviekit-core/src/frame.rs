//! Video frame types for movie I/O in CPU memory.

use crate::error::{MovieError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pixel format for frames passed through the movie I/O subsystem.
///
/// One format is fixed per session; frames that do not match are rejected
/// rather than silently reshaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit packed RGB (24 bits per pixel)
    #[default]
    Rgb24,
    /// 8-bit packed RGBA (32 bits per pixel)
    Rgba32,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb24 => 3,
            Self::Rgba32 => 4,
        }
    }

    /// Total bytes needed for a packed frame of this format.
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }

    /// FFmpeg pixel format name.
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            Self::Rgb24 => "rgb24",
            Self::Rgba32 => "rgba",
        }
    }
}

/// A single decoded or to-be-encoded video frame.
///
/// Pixel data is packed (no row padding) in the frame's [`PixelFormat`].
/// The buffer sits behind an `Arc` so the read path can hand the same frame
/// to a caller repeatedly without copying pixels; the frame itself is
/// immutable once constructed.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    data: Arc<Vec<u8>>,
    width: u32,
    height: u32,
    format: PixelFormat,
    /// Presentation timestamp in seconds from stream start.
    pub pts: f64,
}

impl VideoFrame {
    /// Create a frame from packed pixel data.
    ///
    /// Fails when the buffer length does not match `width * height *
    /// bytes_per_pixel`.
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        let expected = format.frame_size(width, height);
        if data.len() != expected {
            return Err(MovieError::InvalidParameter(format!(
                "frame buffer is {} bytes, expected {} for {}x{} {:?}",
                data.len(),
                expected,
                width,
                height,
                format
            )));
        }
        Ok(Self {
            data: Arc::new(data),
            width,
            height,
            format,
            pts: 0.0,
        })
    }

    /// Create a frame filled with a single gray level. Handy for tests.
    pub fn solid(value: u8, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data: Arc::new(vec![value; format.frame_size(width, height)]),
            width,
            height,
            format,
            pts: 0.0,
        }
    }

    /// Packed pixel data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Frame width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Frame size as a `(width, height)` pair.
    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Pixel format of the data buffer.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Size of the pixel buffer in bytes.
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Copy of this frame with a new presentation timestamp.
    ///
    /// The pixel buffer is shared, not duplicated.
    pub fn with_pts(&self, pts: f64) -> Self {
        let mut frame = self.clone();
        frame.pts = pts;
        frame
    }
}
