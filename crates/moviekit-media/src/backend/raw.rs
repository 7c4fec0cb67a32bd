//! Self-contained uncompressed movie container.
//!
//! Layout: a fixed header (magic, pixel format, frame size, frame rate,
//! frame count) followed by fixed-size records of `pts (f64 le)` + packed
//! pixel data. Fixed-size records make seeking an exact index computation,
//! which the test suite leans on heavily. The frame count is patched into
//! the header at finalize.

use super::{DecoderBackend, EncoderBackend, EncoderSettings, MovieMetadata};
use moviekit_core::{round_pts, FrameRate, MovieError, PixelFormat, Result, VideoFrame};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

const MAGIC: &[u8; 4] = b"MKRV";
const VERSION: u16 = 1;
/// magic + version + pix_fmt + width + height + fps_num + fps_den
const FRAME_COUNT_OFFSET: u64 = 4 + 2 + 1 + 4 + 4 + 4 + 4;
const HEADER_LEN: u64 = FRAME_COUNT_OFFSET + 8;

fn pixel_format_tag(format: PixelFormat) -> u8 {
    match format {
        PixelFormat::Rgb24 => 0,
        PixelFormat::Rgba32 => 1,
    }
}

fn pixel_format_from_tag(tag: u8) -> Result<PixelFormat> {
    match tag {
        0 => Ok(PixelFormat::Rgb24),
        1 => Ok(PixelFormat::Rgba32),
        other => Err(MovieError::UnsupportedFormat(format!(
            "unknown pixel format tag {other} in raw movie header"
        ))),
    }
}

/// Encoder writing the raw container format.
pub struct RawEncoder {
    file: File,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    frame_count: u64,
    finalized: bool,
}

impl RawEncoder {
    /// Create the output file and write a header with a zero frame count.
    pub fn open(settings: EncoderSettings) -> Result<Self> {
        if !settings.options.is_empty() {
            debug!(
                "Raw encoder ignoring {} backend option(s)",
                settings.options.len()
            );
        }

        let mut file = File::create(&settings.path)?;
        file.write_all(MAGIC)?;
        file.write_all(&VERSION.to_le_bytes())?;
        file.write_all(&[pixel_format_tag(settings.pixel_format)])?;
        file.write_all(&settings.width.to_le_bytes())?;
        file.write_all(&settings.height.to_le_bytes())?;
        file.write_all(&settings.fps.numerator.to_le_bytes())?;
        file.write_all(&settings.fps.denominator.to_le_bytes())?;
        file.write_all(&0u64.to_le_bytes())?;

        Ok(Self {
            file,
            width: settings.width,
            height: settings.height,
            pixel_format: settings.pixel_format,
            frame_count: 0,
            finalized: false,
        })
    }
}

impl EncoderBackend for RawEncoder {
    fn write_frame(&mut self, frame: &VideoFrame, pts: f64) -> Result<u64> {
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
        self.file.write_all(&pts.to_le_bytes())?;
        self.file.write_all(frame.data())?;
        self.frame_count += 1;
        Ok(8 + frame.data().len() as u64)
    }

    fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.file.seek(SeekFrom::Start(FRAME_COUNT_OFFSET))?;
        self.file.write_all(&self.frame_count.to_le_bytes())?;
        self.file.flush()?;
        self.finalized = true;
        debug!("Raw container finalized with {} frame(s)", self.frame_count);
        Ok(())
    }
}

/// Decoder reading the raw container format.
pub struct RawDecoder {
    file: File,
    meta: MovieMetadata,
    pixel_format: PixelFormat,
    frame_count: u64,
    /// Index of the next record to read.
    index: u64,
}

impl RawDecoder {
    /// Open the file and read the header.
    pub fn open(path: &Path, options: &super::BackendOptions) -> Result<Self> {
        if !options.is_empty() {
            debug!("Raw decoder ignoring {} backend option(s)", options.len());
        }

        let mut file = File::open(path)?;
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(MovieError::UnsupportedFormat(format!(
                "{} is not a raw movie container",
                path.display()
            )));
        }
        let version = read_u16(&mut file)?;
        if version != VERSION {
            return Err(MovieError::UnsupportedFormat(format!(
                "raw container version {version} is not supported"
            )));
        }
        let mut tag = [0u8; 1];
        file.read_exact(&mut tag)?;
        let pixel_format = pixel_format_from_tag(tag[0])?;
        let width = read_u32(&mut file)?;
        let height = read_u32(&mut file)?;
        let fps_num = read_u32(&mut file)?;
        let fps_den = read_u32(&mut file)?;
        let frame_count = read_u64(&mut file)?;

        if width == 0 || height == 0 || fps_num == 0 || fps_den == 0 {
            return Err(MovieError::Decoder(format!(
                "raw container header is invalid: {width}x{height} @ {fps_num}/{fps_den}"
            )));
        }

        let frame_rate = FrameRate::new(fps_num, fps_den);
        let meta = MovieMetadata {
            path: path.to_path_buf(),
            width,
            height,
            frame_rate,
            duration: frame_count as f64 * frame_rate.interval(),
            pixel_format: pixel_format.ffmpeg_name().to_string(),
        };

        Ok(Self {
            file,
            meta,
            pixel_format,
            frame_count,
            index: 0,
        })
    }

    fn record_len(&self) -> u64 {
        8 + self.pixel_format.frame_size(self.meta.width, self.meta.height) as u64
    }
}

impl DecoderBackend for RawDecoder {
    fn metadata(&self) -> &MovieMetadata {
        &self.meta
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        if self.index >= self.frame_count {
            return Ok(None);
        }
        let mut pts_bytes = [0u8; 8];
        self.file.read_exact(&mut pts_bytes)?;
        let pts = f64::from_le_bytes(pts_bytes);

        let mut data = vec![0u8; self.pixel_format.frame_size(self.meta.width, self.meta.height)];
        self.file.read_exact(&mut data)?;
        self.index += 1;

        let frame = VideoFrame::new(data, self.meta.width, self.meta.height, self.pixel_format)?;
        Ok(Some(frame.with_pts(round_pts(pts))))
    }

    fn seek(&mut self, pts: f64) -> Result<f64> {
        let interval = self.meta.frame_rate.interval();
        let index = ((round_pts(pts) / interval).floor().max(0.0) as u64).min(self.frame_count);
        self.file
            .seek(SeekFrom::Start(HEADER_LEN + index * self.record_len()))?;
        self.index = index;
        Ok(round_pts(index as f64 * interval))
    }

    fn position(&self) -> f64 {
        round_pts(self.index as f64 * self.meta.frame_rate.interval())
    }
}

fn read_u16(file: &mut File) -> Result<u16> {
    let mut buf = [0u8; 2];
    file.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(file: &mut File) -> Result<u32> {
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(file: &mut File) -> Result<u64> {
    let mut buf = [0u8; 8];
    file.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("moviekit-raw-{}-{}", std::process::id(), name))
    }

    fn settings(path: PathBuf) -> EncoderSettings {
        EncoderSettings {
            path,
            width: 8,
            height: 8,
            fps: FrameRate::new(10, 1),
            pixel_format: PixelFormat::Rgb24,
            codec: "rawvideo".to_string(),
            options: Vec::new(),
        }
    }

    fn write_movie(path: &Path, frames: u8) {
        let mut encoder = RawEncoder::open(settings(path.to_path_buf())).unwrap();
        for i in 0..frames {
            let frame = VideoFrame::solid(i, 8, 8, PixelFormat::Rgb24);
            encoder.write_frame(&frame, i as f64 * 0.1).unwrap();
        }
        encoder.finalize().unwrap();
    }

    #[test]
    fn test_roundtrip() {
        let path = temp_path("roundtrip.mkrv");
        write_movie(&path, 5);

        let mut decoder = RawDecoder::open(&path, &Vec::new()).unwrap();
        assert_eq!(decoder.metadata().width, 8);
        assert_eq!(decoder.metadata().frame_rate.to_fps_f64(), 10.0);
        assert!((decoder.metadata().duration - 0.5).abs() < 1e-9);

        for i in 0..5u8 {
            let frame = decoder.next_frame().unwrap().unwrap();
            assert_eq!(frame.data()[0], i);
            assert!((frame.pts - i as f64 * 0.1).abs() < 1e-6);
        }
        assert!(decoder.next_frame().unwrap().is_none());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_seek_is_exact() {
        let path = temp_path("seek.mkrv");
        write_movie(&path, 10);

        let mut decoder = RawDecoder::open(&path, &Vec::new()).unwrap();
        let pos = decoder.seek(0.75).unwrap();
        assert!((pos - 0.7).abs() < 1e-6);
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.data()[0], 7);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_mismatched_frame_rejected() {
        let path = temp_path("mismatch.mkrv");
        let mut encoder = RawEncoder::open(settings(path.clone())).unwrap();
        let wrong = VideoFrame::solid(0, 4, 4, PixelFormat::Rgb24);
        assert!(matches!(
            encoder.write_frame(&wrong, 0.0),
            Err(MovieError::Encoder(_))
        ));
        drop(encoder);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_bad_magic_rejected() {
        let path = temp_path("badmagic.mkrv");
        std::fs::write(&path, b"not a movie container at all").unwrap();
        assert!(matches!(
            RawDecoder::open(&path, &Vec::new()),
            Err(MovieError::UnsupportedFormat(_))
        ));
        std::fs::remove_file(&path).unwrap();
    }
}
