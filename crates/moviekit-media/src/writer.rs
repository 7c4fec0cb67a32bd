//! Asynchronous movie file writer.
//!
//! Encoding is slow, so one background thread per session drains a frame
//! queue and drives the encoder backend while the producer keeps adding
//! frames. `open()` does not return until the backend has confirmed it is
//! ready to accept frames; `close()` flushes everything still queued before
//! finalizing the file.

use crate::backend::{Backend, BackendOptions, EncoderSettings};
use crate::queue::FrameQueue;
use crate::registry::{Session, SessionRegistry, SessionRole};
use moviekit_core::{
    round_pts, FrameRate, FrameSize, MovieError, PixelFormat, Result, VideoFrame,
};
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Configuration for one writing session.
///
/// All fields are fixed once `open()` has been called.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Output file path.
    pub path: PathBuf,
    /// Frame size in pixels or as a named standard resolution.
    pub size: FrameSize,
    /// Output frame rate.
    pub fps: FrameRate,
    /// Codec identifier; `None` selects the backend's default.
    pub codec: Option<String>,
    /// Pixel format of frames passed to `add_frame`.
    pub pixel_format: PixelFormat,
    /// Which native encoder capability to drive.
    pub backend: Backend,
    /// Backend-specific options.
    pub options: BackendOptions,
}

impl WriterConfig {
    /// Configuration with default codec, `Rgb24` frames, and the ffmpeg
    /// backend.
    pub fn new(path: impl Into<PathBuf>, size: impl Into<FrameSize>, fps: FrameRate) -> Self {
        Self {
            path: path.into(),
            size: size.into(),
            fps,
            codec: None,
            pixel_format: PixelFormat::Rgb24,
            backend: Backend::default(),
            options: Vec::new(),
        }
    }
}

/// One item travelling through the writer queue.
enum WriterItem {
    Frame(VideoFrame),
    /// Sentinel: finalize the file and exit the worker thread.
    EndOfStream,
}

#[derive(Default)]
struct WriterStats {
    /// Frames accepted by `add_frame`.
    frames_in: u64,
    /// Frames the worker has finished handling, written or not.
    frames_done: u64,
    /// Frames successfully written to disk.
    frames_out: u64,
    bytes_out: u64,
}

/// State shared between the session object, its worker thread, and the
/// session registry.
struct WriterShared {
    path: PathBuf,
    queue: FrameQueue<WriterItem>,
    stats: Mutex<WriterStats>,
    worker: Mutex<Option<JoinHandle<()>>>,
    last_video_file: Mutex<Option<PathBuf>>,
}

impl WriterShared {
    /// Push the end-of-stream sentinel, wait for the worker to drain and
    /// finalize, and deregister. Safe to call when not open.
    fn close_session(&self) {
        let handle = self.worker.lock().take();
        let Some(handle) = handle else {
            debug!("Movie writer for {} is not open; nothing to close", self.path.display());
            return;
        };

        let waiting = self.queue.len();
        if waiting > 0 {
            warn!(
                "File '{}' still has {} frame(s) queued to be written to disk, waiting to complete",
                self.path.display(),
                waiting
            );
        }
        self.queue.push(WriterItem::EndOfStream);
        if handle.join().is_err() {
            error!("Writer thread for {} panicked", self.path.display());
        }

        *self.last_video_file.lock() = Some(self.path.clone());
        SessionRegistry::global().deregister(&self.path, SessionRole::Writer);
        info!("Movie file '{}' closed", self.path.display());
    }
}

impl Session for WriterShared {
    fn shutdown(&self) {
        self.close_session();
    }
}

/// Create movies from a live sequence of in-memory frames.
///
/// Frames go through an unbounded thread-safe queue to a dedicated writer
/// thread, so `add_frame` never blocks the producer. One open writer per
/// file is allowed process-wide.
pub struct MovieWriter {
    config: WriterConfig,
    width: u32,
    height: u32,
    shared: Arc<WriterShared>,
    /// Next auto-assigned presentation timestamp. Touched only by the
    /// producer thread.
    next_pts: f64,
}

impl MovieWriter {
    /// Create a writer session. Named resolutions are resolved here; the
    /// file is not touched until `open()`.
    pub fn new(config: WriterConfig) -> Result<Self> {
        let (width, height) = config.size.resolve()?;
        if config.fps.numerator == 0 || config.fps.denominator == 0 {
            return Err(MovieError::InvalidParameter(
                "frame rate must be > 0".to_string(),
            ));
        }
        let shared = Arc::new(WriterShared {
            path: config.path.clone(),
            queue: FrameQueue::unbounded(),
            stats: Mutex::new(WriterStats::default()),
            worker: Mutex::new(None),
            last_video_file: Mutex::new(None),
        });
        Ok(Self {
            config,
            width,
            height,
            shared,
            next_pts: 0.0,
        })
    }

    /// Open the movie file for writing.
    ///
    /// Registers the session, spawns the writer thread, and blocks until
    /// the thread's encoder backend reports ready. A backend construction
    /// failure surfaces here and leaves no thread running and no
    /// registration behind.
    pub fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Err(MovieError::AlreadyOpen);
        }

        // Duplicate sessions are rejected before any thread is spawned.
        SessionRegistry::global().register(
            &self.config.path,
            SessionRole::Writer,
            Arc::clone(&self.shared) as Arc<dyn Session>,
        )?;

        debug!("Creating movie file for writing: {}", self.config.path.display());

        *self.shared.stats.lock() = WriterStats::default();
        self.next_pts = 0.0;

        let settings = EncoderSettings {
            path: self.config.path.clone(),
            width: self.width,
            height: self.height,
            fps: self.config.fps,
            pixel_format: self.config.pixel_format,
            codec: self
                .config
                .codec
                .clone()
                .unwrap_or_else(|| self.config.backend.default_codec().to_string()),
            options: self.config.options.clone(),
        };
        let backend = self.config.backend;
        let shared = Arc::clone(&self.shared);

        // The worker reports backend readiness (or the construction error)
        // exactly once through this rendezvous channel.
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);

        let spawned = thread::Builder::new()
            .name("moviekit-writer".to_string())
            .spawn(move || {
                let mut encoder = match backend.open_encoder(settings) {
                    Ok(encoder) => {
                        let _ = ready_tx.send(Ok(()));
                        encoder
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                loop {
                    match shared.queue.pop() {
                        Some(WriterItem::Frame(frame)) => {
                            let pts = frame.pts;
                            let result = encoder.write_frame(&frame, pts);
                            let mut stats = shared.stats.lock();
                            stats.frames_done += 1;
                            match result {
                                Ok(bytes) => {
                                    stats.frames_out += 1;
                                    stats.bytes_out += bytes;
                                }
                                // A single bad frame does not end the
                                // session; the sentinel shutdown path must
                                // stay reachable.
                                Err(e) => warn!("Failed to encode frame at {pts:.6}s: {e}"),
                            }
                        }
                        Some(WriterItem::EndOfStream) | None => break,
                    }
                }

                if let Err(e) = encoder.finalize() {
                    error!("Failed to finalize movie file: {e}");
                }
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                SessionRegistry::global().deregister(&self.config.path, SessionRole::Writer);
                return Err(e.into());
            }
        };

        // Rendezvous: do not return until frames can safely be accepted.
        match ready_rx.recv() {
            Ok(Ok(())) => {
                *self.shared.worker.lock() = Some(handle);
                info!("Movie file '{}' opened for writing", self.config.path.display());
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                SessionRegistry::global().deregister(&self.config.path, SessionRole::Writer);
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                SessionRegistry::global().deregister(&self.config.path, SessionRole::Writer);
                Err(MovieError::Encoder(
                    "writer thread terminated during startup".to_string(),
                ))
            }
        }
    }

    /// Add a frame to the movie.
    ///
    /// Validation and the pixel copy happen on the caller's thread; the
    /// enqueue itself is O(1) and never blocks. When `pts` is omitted the
    /// frame gets the auto-assigned timestamp, which advances by one frame
    /// interval per added frame. Returns the timestamp assigned.
    pub fn add_frame(&mut self, image: VideoFrame, pts: Option<f64>) -> Result<f64> {
        if !self.is_open() {
            return Err(MovieError::NotOpen);
        }

        // Mismatched frames are rejected, not reshaped.
        if image.size() != (self.width, self.height) {
            return Err(MovieError::InvalidParameter(format!(
                "frame is {}x{}, movie is {}x{}",
                image.width(),
                image.height(),
                self.width,
                self.height
            )));
        }
        if image.format() != self.config.pixel_format {
            return Err(MovieError::InvalidParameter(format!(
                "frame is {:?}, movie is {:?}",
                image.format(),
                self.config.pixel_format
            )));
        }

        let pts = round_pts(pts.unwrap_or(self.next_pts));
        self.shared.stats.lock().frames_in += 1;
        self.shared.queue.push(WriterItem::Frame(image.with_pts(pts)));
        self.next_pts = round_pts(self.next_pts + self.config.fps.interval());
        Ok(pts)
    }

    /// Block until every queued frame has been handed to the encoder.
    ///
    /// Idempotent and safe from any thread. Warns when the queue length is
    /// not decreasing monotonically, which means frames are still being
    /// added concurrently.
    pub fn flush(&self) -> Result<()> {
        if !self.is_open() {
            return Err(MovieError::NotOpen);
        }
        let mut previous = self.frames_waiting();
        while self.frames_waiting() > 0 {
            let now = self.frames_waiting();
            if now > previous {
                warn!(
                    "Queue length not decreasing monotonically during flush ({previous} -> {now}); \
                     frames are still being added"
                );
            }
            previous = now;
            thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }

    /// Close the movie file.
    ///
    /// Flushes all queued frames, finalizes the file, joins the writer
    /// thread, and deregisters the session. Calling when not open is a
    /// logged no-op.
    pub fn close(&mut self) {
        self.shared.close_session();
    }

    /// Whether frames can currently be added.
    pub fn is_open(&self) -> bool {
        self.shared.worker.lock().is_some()
    }

    /// Output path of this session.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Frame size in pixels.
    pub fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Output frame rate.
    pub fn frame_rate(&self) -> FrameRate {
        self.config.fps
    }

    /// Seconds between frames.
    pub fn frame_interval(&self) -> f64 {
        self.config.fps.interval()
    }

    /// Pixel format accepted by `add_frame`.
    pub fn pixel_format(&self) -> PixelFormat {
        self.config.pixel_format
    }

    /// Frames written to disk so far. Updated asynchronously by the writer
    /// thread.
    pub fn frames_out(&self) -> u64 {
        self.shared.stats.lock().frames_out
    }

    /// Bytes written to disk so far. Updated asynchronously by the writer
    /// thread.
    pub fn bytes_out(&self) -> u64 {
        self.shared.stats.lock().bytes_out
    }

    /// Frames accepted but not yet handled by the writer thread.
    pub fn frames_waiting(&self) -> usize {
        let stats = self.shared.stats.lock();
        (stats.frames_in - stats.frames_done) as usize
    }

    /// Total frames added to this movie so far.
    pub fn total_frames(&self) -> u64 {
        self.shared.stats.lock().frames_in
    }

    /// Duration in seconds implied by the frames added so far. The file on
    /// disk may still be shorter while frames are queued.
    pub fn duration(&self) -> f64 {
        self.total_frames() as f64 * self.frame_interval()
    }

    /// Path of the last movie this session finished writing, if any.
    pub fn last_video_file(&self) -> Option<PathBuf> {
        self.shared.last_video_file.lock().clone()
    }
}

impl Drop for MovieWriter {
    fn drop(&mut self) {
        self.shared.close_session();
    }
}
