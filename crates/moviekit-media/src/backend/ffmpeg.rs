//! FFmpeg backends driven through the sidecar process.
//!
//! The encoder pipes packed raw frames into ffmpeg's stdin and lets ffmpeg
//! own the container; the decoder consumes rawvideo frames and parsed
//! stream metadata from the sidecar event stream. Seeking restarts the
//! sidecar with an input-level `-ss` snapped to the frame grid; the reader
//! refines from there.

use super::{BackendOptions, DecoderBackend, EncoderBackend, EncoderSettings, MovieMetadata};
use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel, OutputVideoFrame, StreamTypeSpecificData};
use ffmpeg_sidecar::iter::FfmpegIterator;
use moviekit_core::{round_pts, FrameRate, MovieError, PixelFormat, Result, VideoFrame};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ChildStdin;
use std::thread;
use tracing::{debug, warn};

/// Flag names may be given with or without the leading dash.
fn push_option(args: &mut Vec<String>, key: &str, value: &str) {
    if key.starts_with('-') {
        args.push(key.to_string());
    } else {
        args.push(format!("-{key}"));
    }
    if !value.is_empty() {
        args.push(value.to_string());
    }
}

/// Drain ffmpeg's stderr on a helper thread so the process never stalls on
/// a full pipe.
fn drain_stderr(child: &mut FfmpegChild) {
    if let Some(stderr) = child.take_stderr() {
        thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                debug!(target: "moviekit::ffmpeg", "{line}");
            }
        });
    }
}

// ── Encoder ─────────────────────────────────────────────────────

/// Encoder feeding raw frames to an ffmpeg sidecar process.
pub struct FfmpegEncoder {
    child: FfmpegChild,
    stdin: Option<ChildStdin>,
    path: PathBuf,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    /// Output file size at the last report, for per-frame byte deltas.
    bytes_reported: u64,
    finalized: bool,
}

impl FfmpegEncoder {
    /// Spawn ffmpeg configured to read raw frames from stdin.
    pub fn open(settings: EncoderSettings) -> Result<Self> {
        if let Some(parent) = settings.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(MovieError::Encoder(format!(
                    "output directory does not exist: {}",
                    parent.display()
                )));
            }
        }

        // Input: raw frames on stdin at the session's size and rate.
        let mut input_args: Vec<String> = vec![
            "-f".into(),
            "rawvideo".into(),
            "-pixel_format".into(),
            settings.pixel_format.ffmpeg_name().into(),
            "-video_size".into(),
            format!("{}x{}", settings.width, settings.height),
            "-framerate".into(),
            format!("{}/{}", settings.fps.numerator, settings.fps.denominator),
        ];

        // Output: the selected codec plus any passthrough options.
        let mut output_args: Vec<String> = vec!["-c:v".into(), settings.codec.clone()];
        for (key, value) in &settings.options {
            push_option(&mut output_args, key, value);
        }
        output_args.extend_from_slice(&["-pix_fmt".into(), "yuv420p".into()]);

        input_args.push("-i".into());
        input_args.push("pipe:0".into());

        let mut child = FfmpegCommand::new()
            .args(["-v", "error", "-y"])
            .args(input_args.iter().map(String::as_str))
            .args(output_args.iter().map(String::as_str))
            .output(settings.path.to_string_lossy().as_ref())
            .spawn()
            .map_err(|e| MovieError::Encoder(format!("failed to spawn ffmpeg: {e}")))?;

        let stdin = child
            .take_stdin()
            .ok_or_else(|| MovieError::Encoder("failed to open ffmpeg stdin".into()))?;
        drain_stderr(&mut child);

        debug!("ffmpeg encoder started for {}", settings.path.display());

        Ok(Self {
            child,
            stdin: Some(stdin),
            path: settings.path,
            width: settings.width,
            height: settings.height,
            pixel_format: settings.pixel_format,
            bytes_reported: 0,
            finalized: false,
        })
    }
}

impl EncoderBackend for FfmpegEncoder {
    fn write_frame(&mut self, frame: &VideoFrame, _pts: f64) -> Result<u64> {
        if frame.size() != (self.width, self.height) || frame.format() != self.pixel_format {
            return Err(MovieError::Encoder(format!(
                "frame {}x{} {:?} does not match stream {}x{} {:?}",
                frame.width(),
                frame.height(),
                frame.format(),
                self.width,
                self.height,
                self.pixel_format
            )));
        }
        let stdin = self.stdin.as_mut().ok_or(MovieError::NotOpen)?;
        stdin
            .write_all(frame.data())
            .map_err(|e| MovieError::Encoder(format!("failed to write frame to ffmpeg: {e}")))?;

        // ffmpeg buffers internally, so byte counts trail the frames that
        // produced them.
        let size = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        let delta = size.saturating_sub(self.bytes_reported);
        self.bytes_reported = size;
        Ok(delta)
    }

    fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;
        // Closing stdin signals end of stream.
        drop(self.stdin.take());
        let status = self
            .child
            .wait()
            .map_err(|e| MovieError::Encoder(format!("failed to wait for ffmpeg: {e}")))?;
        if !status.success() {
            return Err(MovieError::Encoder(format!(
                "ffmpeg exited with status: {status}"
            )));
        }
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if !self.finalized {
            drop(self.stdin.take());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

// ── Decoder ─────────────────────────────────────────────────────

/// Decoder consuming rawvideo frames from an ffmpeg sidecar process.
pub struct FfmpegDecoder {
    path: PathBuf,
    options: BackendOptions,
    meta: MovieMetadata,
    child: FfmpegChild,
    events: FfmpegIterator,
    /// First frame pulled while scanning for metadata, if any.
    pending: Option<VideoFrame>,
    /// Pts the current sidecar run started decoding from.
    seek_base: f64,
    /// Expected pts of the next decoded frame.
    position: f64,
    eof: bool,
}

impl FfmpegDecoder {
    /// Spawn ffmpeg and block until valid stream metadata is available.
    pub fn open(path: &Path, options: &BackendOptions) -> Result<Self> {
        if !path.is_file() {
            return Err(MovieError::Decoder(format!(
                "movie file does not exist: {}",
                path.display()
            )));
        }

        let (child, events) = Self::spawn_at(path, options, 0.0)?;
        let mut decoder = Self {
            path: path.to_path_buf(),
            options: options.clone(),
            meta: MovieMetadata {
                path: path.to_path_buf(),
                width: 0,
                height: 0,
                frame_rate: FrameRate::default(),
                duration: 0.0,
                pixel_format: String::new(),
            },
            child,
            events,
            pending: None,
            seek_base: 0.0,
            position: 0.0,
            eof: false,
        };
        decoder.scan_metadata()?;
        if decoder.meta.width == 0 || decoder.meta.height == 0 {
            return Err(MovieError::Decoder(format!(
                "no video stream found in {}",
                path.display()
            )));
        }
        debug!(
            "ffmpeg decoder opened {} ({}x{} @ {}, {:.3}s)",
            path.display(),
            decoder.meta.width,
            decoder.meta.height,
            decoder.meta.frame_rate,
            decoder.meta.duration
        );
        Ok(decoder)
    }

    fn spawn_at(
        path: &Path,
        options: &BackendOptions,
        start: f64,
    ) -> Result<(FfmpegChild, FfmpegIterator)> {
        let mut args: Vec<String> = Vec::new();
        if start > 0.0 {
            args.push("-ss".into());
            args.push(format!("{start:.6}"));
        }
        for (key, value) in options {
            push_option(&mut args, key, value);
        }

        let mut child = FfmpegCommand::new()
            .args(args.iter().map(String::as_str))
            .input(path.to_string_lossy().as_ref())
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-an"])
            .output("-")
            .spawn()
            .map_err(|e| MovieError::Decoder(format!("failed to spawn ffmpeg: {e}")))?;
        let events = child
            .iter()
            .map_err(|e| MovieError::Decoder(format!("failed to read ffmpeg output: {e}")))?;
        Ok((child, events))
    }

    /// Consume events until the input's video stream and duration have been
    /// parsed. A frame arriving first means parsing is complete; it is held
    /// as pending.
    fn scan_metadata(&mut self) -> Result<()> {
        let mut duration = None;
        for event in self.events.by_ref() {
            match event {
                FfmpegEvent::ParsedInput(input) => {
                    duration = input.duration;
                }
                FfmpegEvent::ParsedInputStream(stream) => {
                    if let StreamTypeSpecificData::Video(video) = &stream.type_specific_data {
                        self.meta.width = video.width;
                        self.meta.height = video.height;
                        self.meta.frame_rate = FrameRate::from_fps(video.fps as f64)?;
                        self.meta.pixel_format = video.pix_fmt.clone();
                    }
                }
                FfmpegEvent::OutputFrame(frame) => {
                    self.pending = Some(self.convert(frame)?);
                    break;
                }
                FfmpegEvent::Log(LogLevel::Fatal, msg) | FfmpegEvent::Error(msg) => {
                    return Err(MovieError::Decoder(msg));
                }
                FfmpegEvent::Done | FfmpegEvent::LogEOF => {
                    self.eof = true;
                    break;
                }
                _ => {}
            }
            if self.meta.width != 0 && duration.is_some() {
                break;
            }
        }
        match duration {
            Some(secs) => self.meta.duration = secs,
            None => warn!("ffmpeg reported no duration for {}", self.path.display()),
        }
        Ok(())
    }

    fn convert(&mut self, frame: OutputVideoFrame) -> Result<VideoFrame> {
        let pts = round_pts(self.seek_base + frame.timestamp as f64);
        let out = VideoFrame::new(frame.data, frame.width, frame.height, PixelFormat::Rgb24)?
            .with_pts(pts);
        self.position = round_pts(pts + self.meta.frame_rate.interval());
        Ok(out)
    }

    fn shutdown_child(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl DecoderBackend for FfmpegDecoder {
    fn metadata(&self) -> &MovieMetadata {
        &self.meta
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        if self.eof {
            return Ok(None);
        }
        for event in self.events.by_ref() {
            match event {
                FfmpegEvent::OutputFrame(frame) => return self.convert(frame).map(Some),
                FfmpegEvent::Error(msg) => {
                    return Err(MovieError::Decoder(msg));
                }
                FfmpegEvent::Log(LogLevel::Error | LogLevel::Fatal, msg) => {
                    // Non-fatal per frame; the session decides whether to
                    // keep going.
                    warn!("ffmpeg: {msg}");
                }
                FfmpegEvent::Done | FfmpegEvent::LogEOF => break,
                _ => {}
            }
        }
        self.eof = true;
        Ok(None)
    }

    fn seek(&mut self, pts: f64) -> Result<f64> {
        let interval = self.meta.frame_rate.interval();
        let snapped = round_pts((round_pts(pts) / interval).floor().max(0.0) * interval);

        self.shutdown_child();
        let (child, events) = Self::spawn_at(&self.path, &self.options, snapped)?;
        self.child = child;
        self.events = events;
        self.pending = None;
        self.seek_base = snapped;
        self.position = snapped;
        self.eof = false;
        debug!("ffmpeg decoder sought to {snapped:.6}s");
        Ok(snapped)
    }

    fn position(&self) -> f64 {
        self.position
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        self.shutdown_child();
    }
}
