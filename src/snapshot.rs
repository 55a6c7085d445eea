//! Output files: naming and encoding.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;

use crate::config::OutputFormat;
use crate::error::CaptureError;
use crate::frame::CapturedFrame;

/// Names snapshots after their local capture time. A per-process sequence
/// number keeps two frames landing in the same millisecond apart.
#[derive(Debug, Default)]
pub struct SnapshotNamer {
    seq: AtomicU64,
}

impl SnapshotNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name_at(&self, at: DateTime<Local>, extension: &str) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}-{:06}.{}",
            at.format("%Y-%m-%d_%H-%M-%S%.3f"),
            seq,
            extension
        )
    }
}

/// Encodes captured frames into `dir`.
#[derive(Debug)]
pub struct SnapshotWriter {
    dir: PathBuf,
    format: OutputFormat,
    quality: u8,
    namer: SnapshotNamer,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>, format: OutputFormat, quality: u8) -> Self {
        SnapshotWriter {
            dir: dir.into(),
            format,
            quality,
            namer: SnapshotNamer::new(),
        }
    }

    /// Writes `frame` under a fresh timestamped name and returns its path.
    pub fn write(&self, frame: &CapturedFrame<'_>) -> Result<PathBuf, CaptureError> {
        let name = self.namer.name_at(Local::now(), self.format.extension());
        let path = self.dir.join(name);
        self.write_to(&path, &frame.to_rgb_image()?)?;
        Ok(path)
    }

    fn write_to(&self, path: &Path, img: &RgbImage) -> Result<(), CaptureError> {
        let mut out = BufWriter::new(File::create(path)?);
        match self.format {
            OutputFormat::Jpeg => {
                JpegEncoder::new_with_quality(&mut out, self.quality).encode_image(img)?;
            }
            OutputFormat::Png => {
                let mut encoder = png::Encoder::new(&mut out, img.width(), img.height());
                encoder.set_color(png::ColorType::Rgb);
                encoder.set_depth(png::BitDepth::Eight);
                let mut writer = encoder.write_header()?;
                writer.write_image_data(img.as_raw())?;
                writer.finish()?;
            }
        }
        out.flush()?;
        Ok(())
    }
}
