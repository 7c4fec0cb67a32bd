//! Integration tests for pts-based random access.
//!
//! Every movie here is written with one gray level per frame index, so a
//! returned frame's first byte identifies exactly which frame the reader
//! resolved.

use moviekit_core::{FrameRate, PixelFormat, VideoFrame};
use moviekit_media::{Backend, MovieReader, MovieWriter, ReaderConfig, WriterConfig};
use std::path::{Path, PathBuf};

// ── Helpers ────────────────────────────────────────────────────

fn temp_path(name: &str) -> PathBuf {
    crate::init_logging();
    std::env::temp_dir().join(format!("moviekit-seeking-{}-{}", std::process::id(), name))
}

/// 10 fps movie with `frames` frames; frame `i` has gray level `i`.
fn write_movie(path: &Path, frames: u8) {
    let mut config = WriterConfig::new(path, (16, 16), FrameRate::new(10, 1));
    config.backend = Backend::Raw;
    let mut writer = MovieWriter::new(config).unwrap();
    writer.open().unwrap();
    for i in 0..frames {
        writer
            .add_frame(VideoFrame::solid(i, 16, 16, PixelFormat::Rgb24), None)
            .unwrap();
    }
    writer.close();
}

fn open_reader(path: &Path) -> MovieReader {
    let mut config = ReaderConfig::new(path);
    config.backend = Backend::Raw;
    let mut reader = MovieReader::new(config);
    reader.open().unwrap();
    reader
}

// ── Interval containment ───────────────────────────────────────

#[test]
fn returned_frame_interval_contains_requested_pts() {
    let path = temp_path("containment.mkrv");
    write_movie(&path, 50);
    let mut reader = open_reader(&path);

    // Off-grid requests all over the stream, forward and backward.
    for &pts in &[0.0, 0.05, 0.149, 1.0, 3.21, 0.73, 4.899, 2.5, 0.001] {
        let frame = reader.get_frame(pts, true).unwrap().unwrap();
        assert!(
            frame.pts <= pts && pts < frame.pts + 0.1,
            "pts={pts} resolved to frame at {}",
            frame.pts
        );
    }

    reader.close();
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn sequential_playback_hits_every_frame() {
    let path = temp_path("sequential.mkrv");
    write_movie(&path, 30);
    let mut reader = open_reader(&path);
    reader.start_decoding(Some(0.0)).unwrap();

    for i in 0..30u8 {
        let frame = reader.get_frame(i as f64 * 0.1, false).unwrap().unwrap();
        assert_eq!(frame.data()[0], i);
    }

    reader.close();
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn seeking_backward_reseeds_the_segment_buffer() {
    let path = temp_path("rewind.mkrv");
    write_movie(&path, 40);
    let mut reader = open_reader(&path);

    let late = reader.get_frame(3.0, true).unwrap().unwrap();
    assert_eq!(late.data()[0], 30);

    let early = reader.get_frame(0.5, true).unwrap().unwrap();
    assert_eq!(early.data()[0], 5);

    // Just ahead of the reseeded position, decode-ahead continues.
    let next = reader.get_frame(0.65, false).unwrap().unwrap();
    assert_eq!(next.data()[0], 6);

    reader.close();
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn request_past_duration_returns_last_frame() {
    let path = temp_path("past-end.mkrv");
    write_movie(&path, 10);
    let mut reader = open_reader(&path);

    for &pts in &[1.0, 1.5, 100.0] {
        let frame = reader.get_frame(pts, true).unwrap().unwrap();
        assert_eq!(frame.data()[0], 9, "pts={pts}");
    }

    reader.close();
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn clearing_segments_frees_memory_and_recovers() {
    let path = temp_path("clear.mkrv");
    write_movie(&path, 20);
    let mut reader = open_reader(&path);

    let frame = reader.get_frame(0.5, true).unwrap().unwrap();
    assert_eq!(frame.data()[0], 5);
    assert!(reader.memory_used() > 0);

    reader.clear_segments();
    assert_eq!(reader.segment_len(), 0);

    // The buffer reseeds transparently on the next request.
    let frame = reader.get_frame(1.2, true).unwrap().unwrap();
    assert_eq!(frame.data()[0], 12);

    reader.close();
    std::fs::remove_file(&path).unwrap();
}
