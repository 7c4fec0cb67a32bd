//! Integration tests for session lifecycle and the process-wide registry.

use moviekit_core::{FrameRate, MovieError, PixelFormat, VideoFrame};
use moviekit_media::{
    Backend, MovieReader, MovieWriter, ReaderConfig, SessionRegistry, SessionRole, WriterConfig,
};
use std::path::{Path, PathBuf};

// ── Helpers ────────────────────────────────────────────────────

fn temp_path(name: &str) -> PathBuf {
    crate::init_logging();
    std::env::temp_dir().join(format!("moviekit-sessions-{}-{}", std::process::id(), name))
}

fn raw_writer(path: &Path) -> MovieWriter {
    let mut config = WriterConfig::new(path, (16, 16), FrameRate::new(10, 1));
    config.backend = Backend::Raw;
    MovieWriter::new(config).unwrap()
}

fn write_movie(path: &Path, frames: u8) {
    let mut writer = raw_writer(path);
    writer.open().unwrap();
    for i in 0..frames {
        writer
            .add_frame(VideoFrame::solid(i, 16, 16, PixelFormat::Rgb24), None)
            .unwrap();
    }
    writer.close();
}

// ── Duplicate session rejection ────────────────────────────────

#[test]
fn second_writer_on_same_file_is_rejected() {
    let path = temp_path("dup-writer.mkrv");
    let mut first = raw_writer(&path);
    first.open().unwrap();

    let mut second = raw_writer(&path);
    assert!(matches!(
        second.open(),
        Err(MovieError::SessionExists { .. })
    ));
    // The rejection left the first session untouched.
    assert!(first.is_open());
    first
        .add_frame(VideoFrame::solid(0, 16, 16, PixelFormat::Rgb24), None)
        .unwrap();

    first.close();
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn second_reader_on_same_file_is_rejected() {
    let path = temp_path("dup-reader.mkrv");
    write_movie(&path, 5);

    let mut config = ReaderConfig::new(&path);
    config.backend = Backend::Raw;
    let mut first = MovieReader::new(config.clone());
    first.open().unwrap();

    let mut second = MovieReader::new(config);
    assert!(matches!(
        second.open(),
        Err(MovieError::SessionExists { .. })
    ));

    first.close();
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn writer_and_reader_roles_do_not_collide() {
    let path = temp_path("roles.mkrv");
    write_movie(&path, 5);

    let mut reader_config = ReaderConfig::new(&path);
    reader_config.backend = Backend::Raw;
    let mut reader = MovieReader::new(reader_config);
    reader.open().unwrap();

    // A writer on the same path registers under a different role.
    let mut writer = raw_writer(&path);
    writer.open().unwrap();

    writer.close();
    reader.close();
    std::fs::remove_file(&path).unwrap();
}

// ── Close and reopen ───────────────────────────────────────────

#[test]
fn closing_frees_the_registry_slot() {
    let path = temp_path("reopen.mkrv");
    {
        let mut writer = raw_writer(&path);
        writer.open().unwrap();
        assert!(SessionRegistry::global().contains(&path, SessionRole::Writer));
        writer.close();
    }
    assert!(!SessionRegistry::global().contains(&path, SessionRole::Writer));

    // The same path can be opened again immediately.
    let mut writer = raw_writer(&path);
    writer.open().unwrap();
    writer.close();
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn dropping_a_writer_deregisters_it() {
    let path = temp_path("drop.mkrv");
    {
        let mut writer = raw_writer(&path);
        writer.open().unwrap();
        writer
            .add_frame(VideoFrame::solid(0, 16, 16, PixelFormat::Rgb24), None)
            .unwrap();
        // Dropped without an explicit close.
    }
    assert!(!SessionRegistry::global().contains(&path, SessionRole::Writer));
    // The drop flushed the queued frame to disk.
    assert!(std::fs::metadata(&path).unwrap().len() > 0);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn close_is_idempotent() {
    let path = temp_path("idempotent.mkrv");
    let mut writer = raw_writer(&path);
    writer.open().unwrap();
    writer.close();
    writer.close();
    assert!(!writer.is_open());
    assert!(matches!(
        writer.add_frame(
            VideoFrame::solid(0, 16, 16, PixelFormat::Rgb24),
            None
        ),
        Err(MovieError::NotOpen)
    ));
    std::fs::remove_file(&path).unwrap();
}
