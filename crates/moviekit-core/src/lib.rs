//! MovieKit Core - Foundation types for movie I/O
//!
//! This crate provides the fundamental types used throughout MovieKit:
//! - Error types (MovieError, Result)
//! - Frame rates and timestamp helpers
//! - Video frames and pixel formats
//! - Named standard video resolutions

pub mod error;
pub mod frame;
pub mod resolution;
pub mod time;

pub use error::{MovieError, Result};
pub use frame::{PixelFormat, VideoFrame};
pub use resolution::{named_resolution, FrameSize};
pub use time::{round_pts, FrameRate};
