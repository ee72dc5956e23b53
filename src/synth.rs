//! Synthetic source clips
//!
//! Frame `i` is filled with the letter `b'A' + (i % 26)`, so order and
//! provenance survive any amount of averaging by the scaler.

use crate::codec::{rle, BufferFlags, Codec, MediaFormat};
use crate::container::Muxer;
use crate::error::{Error, Result};
use crate::types::{Framerate, PixelFormat, Resolution};
use std::path::Path;

/// Generator for RLE-coded letter clips
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticClip {
    pub resolution: Resolution,
    pub frame_count: usize,
    pub framerate: Framerate,
    pub pixel_format: PixelFormat,
}

impl Default for SyntheticClip {
    fn default() -> Self {
        Self {
            resolution: Resolution::UHD_4K,
            frame_count: 10,
            framerate: Framerate::FPS_30,
            pixel_format: PixelFormat::Nv12,
        }
    }
}

impl SyntheticClip {
    pub fn new(resolution: Resolution, frame_count: usize) -> Self {
        Self {
            resolution,
            frame_count,
            ..Default::default()
        }
    }

    pub fn with_framerate(mut self, framerate: Framerate) -> Self {
        self.framerate = framerate;
        self
    }

    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    /// Fill byte of frame `index`
    pub fn letter(index: usize) -> u8 {
        b'A' + (index % 26) as u8
    }

    /// Presentation time of frame `index`
    pub fn pts(&self, index: usize) -> i64 {
        index as i64 * self.framerate.frame_duration_us()
    }

    /// Track format written into the clip header
    pub fn format(&self) -> MediaFormat {
        MediaFormat::video(Codec::Rle, self.resolution.width, self.resolution.height)
            .with_framerate(self.framerate)
            .with_pixel_format(self.pixel_format)
    }

    /// Write the clip to `path`, returning its size in bytes
    pub fn write(&self, path: impl AsRef<Path>) -> Result<u64> {
        let frame_size = self.pixel_format.frame_size(self.resolution).ok_or_else(|| {
            Error::UnsupportedPixelFormat(format!(
                "cannot synthesize {} frames",
                self.pixel_format
            ))
        })?;

        let mut muxer = Muxer::create(path.as_ref(), &self.format())?;
        let mut frame = vec![0u8; frame_size];
        let mut packet = Vec::new();

        for i in 0..self.frame_count {
            frame.fill(Self::letter(i));
            packet.clear();
            rle::encode(&frame, &mut packet);
            muxer.write_sample(&packet, self.pts(i), BufferFlags::KEY_FRAME)?;
        }

        let bytes = muxer.finish()?;
        tracing::info!(
            "Wrote {} frame {} {} clip to {} ({} bytes)",
            self.frame_count,
            self.resolution,
            self.pixel_format,
            path.as_ref().display(),
            bytes
        );
        Ok(bytes)
    }
}
