//! Mux an audio track into a finished movie file.
//!
//! Runs an ffmpeg pass that copies the video stream untouched and encodes
//! the audio track alongside it. The synchronous variant blocks until the
//! mux finishes; the background variant does the same work on a spawned
//! thread so a capture pipeline can keep running.

use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use moviekit_core::{MovieError, Result};
use std::fs;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Description of one audio merge pass.
#[derive(Debug, Clone)]
pub struct MergeJob {
    /// Movie file to write. Overwritten if present.
    pub output: PathBuf,
    /// Source video file; its video stream is copied without re-encoding.
    pub video: PathBuf,
    /// Source audio file.
    pub audio: PathBuf,
    /// Audio codec for the output track.
    pub audio_codec: String,
    /// Delete both input files once the merge succeeds.
    pub remove_inputs: bool,
}

impl MergeJob {
    /// Merge job with AAC audio, keeping the input files.
    pub fn new(
        output: impl Into<PathBuf>,
        video: impl Into<PathBuf>,
        audio: impl Into<PathBuf>,
    ) -> Self {
        Self {
            output: output.into(),
            video: video.into(),
            audio: audio.into(),
            audio_codec: "aac".to_string(),
            remove_inputs: false,
        }
    }
}

/// Merge an audio track into a movie file, blocking until ffmpeg finishes.
///
/// The output holds the video stream of `job.video` unchanged and the
/// audio of `job.audio`, trimmed to the shorter of the two.
pub fn add_audio_to_movie(job: &MergeJob) -> Result<()> {
    if !job.video.is_file() {
        return Err(MovieError::InvalidParameter(format!(
            "video file does not exist: {}",
            job.video.display()
        )));
    }
    if !job.audio.is_file() {
        return Err(MovieError::InvalidParameter(format!(
            "audio file does not exist: {}",
            job.audio.display()
        )));
    }

    info!(
        "Merging audio '{}' into '{}' -> '{}'",
        job.audio.display(),
        job.video.display(),
        job.output.display()
    );

    let mut child = FfmpegCommand::new()
        .args(["-v", "error", "-y"])
        .input(job.video.to_string_lossy())
        .input(job.audio.to_string_lossy())
        .args(["-c:v", "copy", "-c:a", &job.audio_codec])
        .args(["-map", "0:v:0", "-map", "1:a:0", "-shortest"])
        .output(job.output.to_string_lossy())
        .spawn()
        .map_err(|e| MovieError::Encoder(format!("failed to spawn ffmpeg: {e}")))?;

    let mut failure: Option<String> = None;
    let events = child
        .iter()
        .map_err(|e| MovieError::Encoder(format!("ffmpeg event stream failed: {e}")))?;
    for event in events {
        match event {
            FfmpegEvent::Error(msg) => failure = Some(msg),
            FfmpegEvent::Log(LogLevel::Error | LogLevel::Fatal, msg) => {
                warn!("ffmpeg: {msg}");
                failure.get_or_insert(msg);
            }
            _ => {}
        }
    }
    let status = child
        .wait()
        .map_err(|e| MovieError::Encoder(format!("ffmpeg wait failed: {e}")))?;
    if !status.success() {
        return Err(MovieError::Encoder(
            failure.unwrap_or_else(|| format!("ffmpeg exited with {status}")),
        ));
    }

    if job.remove_inputs {
        debug!("Removing merge inputs");
        fs::remove_file(&job.video)?;
        fs::remove_file(&job.audio)?;
    }
    info!("Audio merge complete: {}", job.output.display());
    Ok(())
}

/// Run `add_audio_to_movie` on a background thread.
///
/// Join the returned handle to observe the result; dropping it lets the
/// merge finish on its own.
pub fn add_audio_to_movie_background(job: MergeJob) -> std::io::Result<JoinHandle<Result<()>>> {
    thread::Builder::new()
        .name("moviekit-merge".to_string())
        .spawn(move || add_audio_to_movie(&job))
}
