//! MovieKit Media - asynchronous movie file I/O
//!
//! This crate handles:
//! - Encoding live frame sequences to disk on a background thread
//! - Decoding movie files with pts-based random access
//! - Session bookkeeping (one writer/reader per file)
//! - Merging finished audio tracks into finished video files

pub mod backend;
pub mod merge;
pub mod queue;
pub mod reader;
pub mod registry;
pub mod writer;

pub use backend::{Backend, BackendOptions, DecoderBackend, EncoderBackend, MovieMetadata};
pub use merge::{add_audio_to_movie, add_audio_to_movie_background, MergeJob};
pub use queue::FrameQueue;
pub use reader::{MovieReader, ReaderConfig};
pub use registry::{SessionRegistry, SessionRole};
pub use writer::{MovieWriter, WriterConfig};
