//! Integration tests for the write/read pipeline.
//!
//! Writes movies with `MovieWriter` and reads them back with
//! `MovieReader`, both driving the raw container backend so the tests do
//! not depend on an ffmpeg binary.

use moviekit_core::{FrameRate, PixelFormat, VideoFrame};
use moviekit_media::{Backend, MovieReader, MovieWriter, ReaderConfig, WriterConfig};
use std::path::{Path, PathBuf};

// ── Helpers ────────────────────────────────────────────────────

fn temp_path(name: &str) -> PathBuf {
    crate::init_logging();
    std::env::temp_dir().join(format!("moviekit-pipeline-{}-{}", std::process::id(), name))
}

fn raw_writer(path: &Path, fps: FrameRate) -> MovieWriter {
    let mut config = WriterConfig::new(path, (16, 16), fps);
    config.backend = Backend::Raw;
    MovieWriter::new(config).unwrap()
}

fn raw_reader(path: &Path) -> MovieReader {
    let mut config = ReaderConfig::new(path);
    config.backend = Backend::Raw;
    MovieReader::new(config)
}

/// Write a movie where frame `i` is a solid gray level `i`.
fn write_movie(path: &Path, frames: u8, fps: FrameRate) {
    let mut writer = raw_writer(path, fps);
    writer.open().unwrap();
    for i in 0..frames {
        let frame = VideoFrame::solid(i, 16, 16, PixelFormat::Rgb24);
        writer.add_frame(frame, None).unwrap();
    }
    writer.flush().unwrap();
    writer.close();
}

// ── Write, flush, close ────────────────────────────────────────

#[test]
fn written_movie_reads_back_frame_for_frame() {
    let path = temp_path("roundtrip.mkrv");
    write_movie(&path, 30, FrameRate::new(30, 1));

    let mut reader = raw_reader(&path);
    reader.open().unwrap();
    assert_eq!(reader.frame_size().unwrap(), (16, 16));

    let interval = reader.frame_interval().unwrap();
    for i in 0..30u8 {
        let pts = i as f64 * interval;
        let frame = reader.get_frame(pts, false).unwrap().unwrap();
        assert_eq!(frame.data()[0], i, "wrong frame at pts={pts}");
    }
    reader.close();
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn auto_pts_spaces_frames_by_frame_interval() {
    let path = temp_path("autopts.mkrv");
    let mut writer = raw_writer(&path, FrameRate::new(25, 1));
    writer.open().unwrap();

    let mut last = -1.0;
    for i in 0..10u8 {
        let frame = VideoFrame::solid(i, 16, 16, PixelFormat::Rgb24);
        let pts = writer.add_frame(frame, None).unwrap();
        if last >= 0.0 {
            assert!((pts - last - 0.04).abs() < 1e-6);
        }
        last = pts;
    }
    writer.close();
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn explicit_pts_still_advances_auto_clock() {
    let path = temp_path("mixedpts.mkrv");
    let mut writer = raw_writer(&path, FrameRate::new(10, 1));
    writer.open().unwrap();

    let frame = VideoFrame::solid(0, 16, 16, PixelFormat::Rgb24);
    assert_eq!(writer.add_frame(frame.clone(), None).unwrap(), 0.0);
    assert_eq!(writer.add_frame(frame.clone(), Some(0.5)).unwrap(), 0.5);
    // The auto clock advanced once per call regardless of the override.
    assert_eq!(writer.add_frame(frame, None).unwrap(), 0.2);

    writer.close();
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn flush_drains_every_queued_frame() {
    let path = temp_path("flush.mkrv");
    let mut writer = raw_writer(&path, FrameRate::new(30, 1));
    writer.open().unwrap();

    for i in 0..100u8 {
        writer
            .add_frame(VideoFrame::solid(i, 16, 16, PixelFormat::Rgb24), None)
            .unwrap();
    }
    writer.flush().unwrap();
    assert_eq!(writer.frames_waiting(), 0);
    assert_eq!(writer.frames_out(), 100);
    assert!(writer.bytes_out() > 0);

    writer.close();
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn writer_duration_tracks_submitted_frames() {
    let path = temp_path("duration.mkrv");
    let mut writer = raw_writer(&path, FrameRate::new(10, 1));
    writer.open().unwrap();

    for i in 0..20u8 {
        writer
            .add_frame(VideoFrame::solid(i, 16, 16, PixelFormat::Rgb24), None)
            .unwrap();
    }
    assert_eq!(writer.total_frames(), 20);
    assert!((writer.duration() - 2.0).abs() < 1e-9);

    writer.close();
    assert_eq!(writer.last_video_file(), Some(path.clone()));
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn mismatched_frame_is_rejected_and_session_survives() {
    let path = temp_path("mismatch.mkrv");
    let mut writer = raw_writer(&path, FrameRate::new(10, 1));
    writer.open().unwrap();

    let wrong = VideoFrame::solid(0, 8, 8, PixelFormat::Rgb24);
    assert!(writer.add_frame(wrong, None).is_err());

    let right = VideoFrame::solid(1, 16, 16, PixelFormat::Rgb24);
    assert!(writer.add_frame(right, None).is_ok());

    writer.close();
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn two_second_capture_reads_back_by_timestamp() {
    let path = temp_path("capture.mkrv");
    let mut config = WriterConfig::new(&path, (64, 64), FrameRate::new(10, 1));
    config.backend = Backend::Raw;
    let mut writer = MovieWriter::new(config).unwrap();
    writer.open().unwrap();
    for i in 0..20u8 {
        writer
            .add_frame(VideoFrame::solid(i, 64, 64, PixelFormat::Rgb24), None)
            .unwrap();
    }
    writer.close();

    let mut reader = raw_reader(&path);
    reader.open().unwrap();
    assert_eq!(reader.frame_rate().unwrap().to_fps_f64(), 10.0);
    assert!((reader.duration().unwrap() - 2.0).abs() < 1e-6);
    assert_eq!(reader.get_frame(0.05, true).unwrap().unwrap().data()[0], 0);
    assert_eq!(reader.get_frame(1.0, true).unwrap().unwrap().data()[0], 10);

    reader.close();
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn close_with_queued_frames_loses_nothing() {
    let path = temp_path("queued-close.mkrv");
    let mut writer = raw_writer(&path, FrameRate::new(10, 1));
    writer.open().unwrap();
    for i in 0..5u8 {
        writer
            .add_frame(VideoFrame::solid(i, 16, 16, PixelFormat::Rgb24), None)
            .unwrap();
    }
    // No flush: close must drain the queue itself.
    writer.close();
    assert_eq!(writer.frames_out(), 5);

    let mut reader = raw_reader(&path);
    reader.open().unwrap();
    assert!((reader.duration().unwrap() - 0.5).abs() < 1e-9);
    assert_eq!(reader.get_frame(0.45, true).unwrap().unwrap().data()[0], 4);
    reader.close();
    std::fs::remove_file(&path).unwrap();
}

// ── Reader metadata ────────────────────────────────────────────

#[test]
fn reader_exposes_written_metadata() {
    let path = temp_path("metadata.mkrv");
    write_movie(&path, 24, FrameRate::new(24, 1));

    let mut reader = raw_reader(&path);
    reader.open().unwrap();
    let meta = reader.metadata().unwrap();
    assert_eq!((meta.width, meta.height), (16, 16));
    assert_eq!(meta.frame_rate, FrameRate::new(24, 1));
    assert!((meta.duration - 1.0).abs() < 1e-9);

    reader.close();
    std::fs::remove_file(&path).unwrap();
}
