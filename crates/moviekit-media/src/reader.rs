//! Asynchronous movie file reader with pts-based random access.
//!
//! A dedicated decode thread pulls frames from the backend into a frame
//! queue whenever decoding is enabled. `get_frame` drains that queue into a
//! segment buffer: a contiguous, timestamp-ordered run of decoded frames.
//! Requests inside the buffered window resolve without touching the
//! backend; requests outside it pause the thread, seek the backend, and
//! reseed the buffer.

use crate::backend::{Backend, BackendOptions, DecoderBackend, MovieMetadata};
use crate::queue::FrameQueue;
use crate::registry::{Session, SessionRegistry, SessionRole};
use moviekit_core::{round_pts, FrameRate, MovieError, Result, VideoFrame};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Consecutive backend errors tolerated while reseeding before giving up.
const MAX_SEEK_ERRORS: u32 = 3;

/// Configuration for one reading session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Movie file to read.
    pub path: PathBuf,
    /// Which native decoder capability to drive.
    pub backend: Backend,
    /// Backend-specific options.
    pub options: BackendOptions,
    /// Maximum frames held in the decode-ahead queue; `0` = unbounded.
    pub max_queue_size: usize,
}

impl ReaderConfig {
    /// Configuration with the ffmpeg backend and a 32-frame queue.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backend: Backend::default(),
            options: Vec::new(),
            max_queue_size: 32,
        }
    }
}

/// State shared between the session object, its decode thread, and the
/// session registry.
struct ReaderShared {
    path: PathBuf,
    meta: MovieMetadata,
    queue: FrameQueue<VideoFrame>,
    backend: Mutex<Box<dyn DecoderBackend>>,
    /// Whether the decode thread actively advances the backend.
    decoding: AtomicBool,
    /// Set when the backend reports end of stream; cleared by seeks.
    eof: AtomicBool,
    exit: AtomicBool,
    /// Bumped by every seek so the decode thread drops frames from a
    /// position that has since been invalidated.
    generation: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ReaderShared {
    fn close_session(&self) {
        let handle = self.worker.lock().take();
        let Some(handle) = handle else {
            debug!("Movie reader for {} is not open; nothing to close", self.path.display());
            return;
        };
        self.exit.store(true, Ordering::Release);
        if handle.join().is_err() {
            warn!("Reader thread for {} panicked", self.path.display());
        }
        SessionRegistry::global().deregister(&self.path, SessionRole::Reader);
        info!("Movie file '{}' closed", self.path.display());
    }

    /// Decode loop run by the background thread.
    fn decode_loop(&self) {
        loop {
            if self.exit.load(Ordering::Acquire) {
                break;
            }
            if !self.decoding.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(1));
                continue;
            }

            let generation = self.generation.load(Ordering::Acquire);
            let result = self.backend.lock().next_frame();
            match result {
                Ok(Some(frame)) => self.deliver(frame, generation),
                Ok(None) => {
                    debug!("End of stream reached for {}", self.path.display());
                    self.eof.store(true, Ordering::Release);
                    // Stay alive: a backward seek can resume decoding.
                    self.decoding.store(false, Ordering::Release);
                }
                Err(e) => {
                    warn!("Decode error in {}: {e}", self.path.display());
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }

    /// Push a decoded frame, waiting out a full queue. The frame is
    /// dropped if a seek invalidated its position in the meantime.
    fn deliver(&self, frame: VideoFrame, generation: u64) {
        let mut item = frame;
        loop {
            if self.exit.load(Ordering::Acquire)
                || self.generation.load(Ordering::Acquire) != generation
            {
                return;
            }
            match self.queue.try_push(item) {
                Ok(()) => return,
                Err(rejected) => {
                    item = rejected;
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }
}

impl Session for ReaderShared {
    fn shutdown(&self) {
        self.close_session();
    }
}

/// Read movie frames from a file with pts-based random access.
///
/// Decoding runs on a background thread; `get_frame` serves requests from
/// an in-memory segment buffer and reseeds it through backend seeks when a
/// request falls outside the buffered window. One open reader per file is
/// allowed process-wide.
pub struct MovieReader {
    config: ReaderConfig,
    shared: Option<Arc<ReaderShared>>,
    /// Contiguous run of decoded frames, ascending by pts, no gaps.
    segments: Vec<VideoFrame>,
    /// Most recent frame handed to the caller, for end clamping and
    /// decode-error fallback.
    last_frame: Option<VideoFrame>,
}

impl MovieReader {
    /// Create a reader session. The file is not touched until `open()`.
    pub fn new(config: ReaderConfig) -> Self {
        Self {
            config,
            shared: None,
            segments: Vec::new(),
            last_frame: None,
        }
    }

    /// Open the movie file for reading.
    ///
    /// Closes any prior session on this object, constructs the decoder
    /// backend (blocking until valid stream metadata is available),
    /// registers the session, and starts the decode thread. Decoding is
    /// initially paused; `start_decoding` or the first `get_frame` begins
    /// pulling frames.
    pub fn open(&mut self) -> Result<()> {
        if self.is_open() {
            self.close();
        }

        info!("Opening movie file: {}", self.config.path.display());
        let backend = self
            .config
            .backend
            .open_decoder(&self.config.path, &self.config.options)?;
        let meta = backend.metadata().clone();
        debug!(
            "Movie metadata: {}x{} @ {}, {:.3}s, {}",
            meta.width, meta.height, meta.frame_rate, meta.duration, meta.pixel_format
        );

        let shared = Arc::new(ReaderShared {
            path: self.config.path.clone(),
            meta,
            queue: FrameQueue::with_depth(self.config.max_queue_size),
            backend: Mutex::new(backend),
            decoding: AtomicBool::new(false),
            eof: AtomicBool::new(false),
            exit: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            worker: Mutex::new(None),
        });

        // Duplicate sessions are rejected before the thread is spawned.
        SessionRegistry::global().register(
            &self.config.path,
            SessionRole::Reader,
            Arc::clone(&shared) as Arc<dyn Session>,
        )?;

        let worker_shared = Arc::clone(&shared);
        let spawned = thread::Builder::new()
            .name("moviekit-reader".to_string())
            .spawn(move || worker_shared.decode_loop());
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                SessionRegistry::global().deregister(&self.config.path, SessionRole::Reader);
                return Err(e.into());
            }
        };
        *shared.worker.lock() = Some(handle);

        self.shared = Some(shared);
        self.segments.clear();
        self.last_frame = None;
        Ok(())
    }

    /// Switch this session to another movie file and open it.
    ///
    /// Any open session is closed first; playback restarts from the
    /// beginning of the new movie.
    pub fn set_movie(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        self.close();
        let path = path.into();
        if !path.is_file() {
            return Err(MovieError::InvalidParameter(format!(
                "movie file does not exist: {}",
                path.display()
            )));
        }
        self.config.path = path;
        self.open()
    }

    /// Resume pulling decoded frames into the queue, optionally seeking to
    /// `initial_pts` first. `None` resumes from the current position.
    pub fn start_decoding(&mut self, initial_pts: Option<f64>) -> Result<()> {
        let shared = Arc::clone(self.shared()?);
        if let Some(pts) = initial_pts {
            shared.decoding.store(false, Ordering::Release);
            shared.generation.fetch_add(1, Ordering::AcqRel);
            let mut backend = shared.backend.lock();
            backend.seek(pts)?;
            shared.queue.clear();
            self.segments.clear();
            shared.eof.store(false, Ordering::Release);
        }
        shared.decoding.store(true, Ordering::Release);
        Ok(())
    }

    /// Pause the decode thread without closing the session.
    pub fn stop_decoding(&mut self) -> Result<()> {
        self.shared()?.decoding.store(false, Ordering::Release);
        Ok(())
    }

    /// Whether the decode thread is actively advancing the backend.
    pub fn is_decoding(&self) -> bool {
        self.shared
            .as_ref()
            .map(|s| s.decoding.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Get the frame whose display interval contains `pts`.
    ///
    /// With `drop_frame` set, the call never waits for decoding and
    /// returns the best available frame; otherwise it blocks until the
    /// exact frame has been decoded or the stream ends. Returns `None`
    /// only when no frame has ever been decoded for this session.
    pub fn get_frame(&mut self, pts: f64, drop_frame: bool) -> Result<Option<VideoFrame>> {
        let shared = Arc::clone(self.shared()?);
        let pts = round_pts(pts);
        let interval = shared.meta.frame_interval();
        let duration = shared.meta.duration;

        // Clamp at end of stream: return the last known frame.
        if duration > 0.0 && pts >= duration {
            self.drain_queue();
            if self.segments.is_empty() {
                // Nothing buffered yet; seed from the final frame.
                self.seek_and_reseed(round_pts(duration - interval * 0.5))?;
            }
            let frame = self.segments.last().cloned().or_else(|| self.last_frame.clone());
            self.remember(&frame);
            return Ok(frame);
        }

        self.drain_queue();

        // Outside the buffered window (or the backend's current position
        // when nothing is buffered) means we must seek.
        let needs_seek = if let (Some(first), Some(last)) =
            (self.segments.first(), self.segments.last())
        {
            let segment_start = first.pts;
            let segment_end = last.pts + interval;
            !(segment_start <= pts && pts < segment_end)
        } else if self.is_decoding() {
            let position = shared.backend.lock().position();
            !(position <= pts && pts < position + interval)
        } else {
            true
        };
        if needs_seek {
            self.seek_and_reseed(pts)?;
        }

        loop {
            let resolved = self.resolve(pts, interval);
            let exact = resolved
                .as_ref()
                .map(|f| f.pts <= pts && pts < f.pts + interval)
                .unwrap_or(false);
            let eof = shared.eof.load(Ordering::Acquire);

            if exact || drop_frame || eof {
                let frame = resolved.or_else(|| self.last_frame.clone());
                self.remember(&frame);
                return Ok(frame);
            }

            // drop_frame=false: wait for the decode thread to catch up.
            thread::sleep(Duration::from_millis(1));
            self.drain_queue();
        }
    }

    /// Close the movie file: stop and join the decode thread, deregister.
    /// Calling when not open is a logged no-op.
    pub fn close(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.close_session();
        }
        self.segments.clear();
        self.last_frame = None;
    }

    /// Whether frames can currently be requested.
    pub fn is_open(&self) -> bool {
        self.shared
            .as_ref()
            .map(|s| s.worker.lock().is_some())
            .unwrap_or(false)
    }

    /// Path of the movie file.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Stream metadata. Only valid after `open()`.
    pub fn metadata(&self) -> Result<MovieMetadata> {
        Ok(self.shared()?.meta.clone())
    }

    /// Frame size in pixels.
    pub fn frame_size(&self) -> Result<(u32, u32)> {
        let meta = &self.shared()?.meta;
        Ok((meta.width, meta.height))
    }

    /// Stream frame rate.
    pub fn frame_rate(&self) -> Result<FrameRate> {
        Ok(self.shared()?.meta.frame_rate)
    }

    /// Seconds between frames.
    pub fn frame_interval(&self) -> Result<f64> {
        Ok(self.shared()?.meta.frame_interval())
    }

    /// Stream duration in seconds.
    pub fn duration(&self) -> Result<f64> {
        Ok(self.shared()?.meta.duration)
    }

    /// Source pixel format name.
    pub fn pixel_format(&self) -> Result<String> {
        Ok(self.shared()?.meta.pixel_format.clone())
    }

    /// Approximate bytes of decoded frames held in memory by the queue and
    /// the segment buffer.
    pub fn memory_used(&self) -> usize {
        let Some(shared) = self.shared.as_ref() else {
            return 0;
        };
        let per_frame = self
            .segments
            .first()
            .map(|f| f.size_bytes())
            .unwrap_or((shared.meta.width * shared.meta.height * 3) as usize);
        (shared.queue.len() + self.segments.len()) * per_frame
    }

    /// Number of frames currently buffered in the segment buffer.
    pub fn segment_len(&self) -> usize {
        self.segments.len()
    }

    /// Discard all buffered segments to free memory. The next `get_frame`
    /// reseeds the buffer.
    pub fn clear_segments(&mut self) {
        self.segments.clear();
    }

    fn shared(&self) -> Result<&Arc<ReaderShared>> {
        self.shared.as_ref().ok_or(MovieError::NotOpen)
    }

    fn remember(&mut self, frame: &Option<VideoFrame>) {
        if frame.is_some() {
            self.last_frame = frame.clone();
        }
    }

    /// Move everything the decode thread has queued into the segment
    /// buffer, keeping the buffer contiguous: a gap or backward jump in
    /// timestamps restarts the buffer at the offending frame.
    fn drain_queue(&mut self) {
        let Some(shared) = self.shared.as_ref() else {
            return;
        };
        let interval = shared.meta.frame_interval();
        for frame in shared.queue.drain() {
            if let Some(last) = self.segments.last() {
                let expected = last.pts + interval;
                if (frame.pts - expected).abs() > interval * 0.5 {
                    self.segments.clear();
                }
            }
            self.segments.push(frame);
        }
    }

    /// Pause the decode thread, seek the backend to `pts`, invalidate all
    /// buffered frames, and pull frames until one whose display interval
    /// contains `pts` (or end of stream), then resume decoding.
    fn seek_and_reseed(&mut self, pts: f64) -> Result<()> {
        let shared = Arc::clone(self.shared()?);
        let interval = shared.meta.frame_interval();
        debug!("Seeking to {pts:.6}s in {}", shared.path.display());

        shared.decoding.store(false, Ordering::Release);
        shared.generation.fetch_add(1, Ordering::AcqRel);

        {
            let mut backend = shared.backend.lock();
            backend.seek(pts)?;
            shared.queue.clear();
            self.segments.clear();
            shared.eof.store(false, Ordering::Release);

            let mut errors = 0u32;
            loop {
                match backend.next_frame() {
                    Ok(Some(frame)) => {
                        // Stop at the target frame, or at the first frame
                        // past it if the backend overshot.
                        if frame.pts + interval > pts {
                            self.segments.push(frame);
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("End of stream reached while seeking to {pts:.6}s");
                        shared.eof.store(true, Ordering::Release);
                        break;
                    }
                    Err(e) => {
                        warn!("Decode error while seeking: {e}");
                        errors += 1;
                        if errors >= MAX_SEEK_ERRORS {
                            break;
                        }
                    }
                }
            }
        }

        if !shared.eof.load(Ordering::Acquire) {
            shared.decoding.store(true, Ordering::Release);
        }
        Ok(())
    }

    /// Resolve `pts` inside the segment buffer: estimate the index from
    /// the buffer start, then refine with a bounded linear scan in either
    /// direction. Falls back to the nearest end of the buffer.
    fn resolve(&self, pts: f64, interval: f64) -> Option<VideoFrame> {
        if self.segments.is_empty() {
            return None;
        }
        let start = self.segments[0].pts;
        let len = self.segments.len();
        let estimate = ((pts - start) / interval).floor();
        let mut index = if estimate <= 0.0 {
            0
        } else {
            (estimate as usize).min(len - 1)
        };

        while index > 0 && self.segments[index].pts > pts {
            index -= 1;
        }
        while index + 1 < len && self.segments[index + 1].pts <= pts {
            index += 1;
        }
        Some(self.segments[index].clone())
    }
}

impl Drop for MovieReader {
    fn drop(&mut self) {
        self.close();
    }
}
