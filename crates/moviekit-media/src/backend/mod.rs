//! Encoder and decoder backend capability traits.
//!
//! The writer and reader sessions drive an opaque native codec capability
//! through these traits. Backend selection is a closed enum rather than a
//! runtime string so session logic never branches on backend names.

pub mod ffmpeg;
pub mod raw;

use moviekit_core::{FrameRate, PixelFormat, Result, VideoFrame};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Free-form backend-specific options (e.g. ffmpeg CLI flags).
///
/// Interpreted by the selected backend; unknown keys are ignored with a
/// log message rather than rejected.
pub type BackendOptions = Vec<(String, String)>;

/// Which native codec capability a session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Backend {
    /// FFmpeg driven as a sidecar process. Handles any container/codec the
    /// installed ffmpeg binary supports.
    #[default]
    Ffmpeg,
    /// Self-contained uncompressed container with exact index-based
    /// seeking. No external binary required.
    Raw,
}

impl Backend {
    /// Default codec identifier for this backend.
    pub fn default_codec(self) -> &'static str {
        match self {
            Self::Ffmpeg => "libx264",
            Self::Raw => "rawvideo",
        }
    }

    /// Construct an encoder for one writing session.
    ///
    /// Fails synchronously on a bad codec or unwritable path; no partial
    /// state is left behind on failure.
    pub fn open_encoder(self, settings: EncoderSettings) -> Result<Box<dyn EncoderBackend>> {
        match self {
            Self::Ffmpeg => Ok(Box::new(ffmpeg::FfmpegEncoder::open(settings)?)),
            Self::Raw => Ok(Box::new(raw::RawEncoder::open(settings)?)),
        }
    }

    /// Construct a decoder for one reading session.
    ///
    /// Blocks until valid stream metadata (non-zero frame size) is
    /// available.
    pub fn open_decoder(
        self,
        path: &Path,
        options: &BackendOptions,
    ) -> Result<Box<dyn DecoderBackend>> {
        match self {
            Self::Ffmpeg => Ok(Box::new(ffmpeg::FfmpegDecoder::open(path, options)?)),
            Self::Raw => Ok(Box::new(raw::RawDecoder::open(path, options)?)),
        }
    }
}

/// Everything an encoder backend needs to open its output.
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: FrameRate,
    pub pixel_format: PixelFormat,
    pub codec: String,
    pub options: BackendOptions,
}

/// Stream metadata extracted when a decoder backend opens a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieMetadata {
    /// Path of the movie file.
    pub path: PathBuf,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Stream frame rate.
    pub frame_rate: FrameRate,
    /// Stream duration in seconds.
    pub duration: f64,
    /// Source pixel format name (e.g. "yuv420p").
    pub pixel_format: String,
}

impl MovieMetadata {
    /// Interval between frames in seconds.
    pub fn frame_interval(&self) -> f64 {
        self.frame_rate.interval()
    }
}

/// Accepts raw frames and writes encoded bytes to one output file.
///
/// Driven exclusively from the writer session's worker thread.
pub trait EncoderBackend: Send {
    /// Encode and write one frame; returns the number of bytes the output
    /// file grew by (which may be zero while the encoder buffers).
    fn write_frame(&mut self, frame: &VideoFrame, pts: f64) -> Result<u64>;

    /// Flush the encoder and finalize the container.
    fn finalize(&mut self) -> Result<()>;
}

/// Yields decoded frames with timestamps on demand from one input file.
pub trait DecoderBackend: Send {
    /// Stream metadata captured at open.
    fn metadata(&self) -> &MovieMetadata;

    /// Decode the next frame in presentation order.
    ///
    /// `Ok(None)` signals end of stream, which is a normal terminal
    /// condition rather than an error.
    fn next_frame(&mut self) -> Result<Option<VideoFrame>>;

    /// Reposition decoding near `pts`; returns the position (seconds)
    /// decoding actually resumes from, snapped to the frame grid.
    fn seek(&mut self, pts: f64) -> Result<f64>;

    /// Presentation timestamp the next decoded frame is expected to carry.
    fn position(&self) -> f64;
}
