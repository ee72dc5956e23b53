//! Software (CPU) codec provider
//!
//! Implements the run-length reference codec in both directions. Hardware
//! codecs (H.264, HEVC, AV1) are reported as unsupported.

use crate::buffer::FrameBuffer;
use crate::container::MAX_PAYLOAD;
use crate::error::{Error, Result};
use crate::types::PixelFormat;

use super::{
    rle, BufferFlags, Codec, CodecOutput, CodecProvider, Direction, FrameTransform, MediaFormat,
};

/// MIME type reported for decoded raw frames
pub const RAW_VIDEO_MIME: &str = "video/raw";

/// Provider backed by the in-crate RLE codec
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareProvider;

impl SoftwareProvider {
    fn check(format: &MediaFormat) -> Result<usize> {
        if format.codec() != Some(Codec::Rle) {
            return Err(Error::UnsupportedFormat(format!(
                "software provider cannot handle '{}'",
                format.mime
            )));
        }
        if format.resolution.is_empty() {
            return Err(Error::UnsupportedFormat(format!(
                "empty resolution {}",
                format.resolution
            )));
        }
        if !format.pixel_format.is_raw() {
            return Err(Error::UnsupportedFormat(format!(
                "pixel format {} has no raw layout",
                format.pixel_format
            )));
        }
        match format.raw_frame_size() {
            Some(size) if size <= MAX_PAYLOAD => Ok(size),
            _ => Err(Error::UnsupportedFormat(format!(
                "{} {} frames exceed {} bytes",
                format.resolution, format.pixel_format, MAX_PAYLOAD
            ))),
        }
    }
}

impl CodecProvider for SoftwareProvider {
    fn name(&self) -> &'static str {
        "software-rle"
    }

    fn supports(&self, format: &MediaFormat, _direction: Direction) -> bool {
        Self::check(format).is_ok()
    }

    fn create_transform(
        &self,
        format: &MediaFormat,
        direction: Direction,
    ) -> Result<Box<dyn FrameTransform>> {
        let frame_size = Self::check(format)?;
        tracing::debug!(
            "Creating software {} for {} {} ({} bytes/frame)",
            direction,
            format.resolution,
            format.pixel_format,
            frame_size
        );
        match direction {
            Direction::Decoder => Ok(Box::new(RleDecoder {
                format: format.clone(),
                frame_size,
            })),
            Direction::Encoder => Ok(Box::new(RleEncoder {
                format: format.clone(),
                frame_size,
                pending: None,
            })),
        }
    }
}

/// Bitstream to raw frames
struct RleDecoder {
    format: MediaFormat,
    frame_size: usize,
}

impl FrameTransform for RleDecoder {
    fn output_format(&self) -> MediaFormat {
        MediaFormat {
            mime: RAW_VIDEO_MIME.to_string(),
            bitrate: None,
            i_frame_interval: None,
            ..self.format.clone()
        }
    }

    fn max_input_size(&self) -> usize {
        // worst case: no byte repeats
        self.frame_size * 2
    }

    fn process(
        &mut self,
        input: FrameBuffer,
        pts: i64,
        flags: BufferFlags,
        out: &mut Vec<CodecOutput>,
    ) -> Result<()> {
        if flags.contains(BufferFlags::CODEC_CONFIG) {
            return Ok(());
        }

        let pixels = rle::decode(input.as_slice(), self.frame_size)?;
        out.push(CodecOutput {
            buffer: FrameBuffer::from_vec(pixels)
                .with_pts(pts)
                .with_format(self.format.pixel_format),
            pts,
            flags: BufferFlags::NONE,
        });
        Ok(())
    }

    fn flush(&mut self, _out: &mut Vec<CodecOutput>) -> Result<()> {
        Ok(())
    }
}

/// Raw frames to bitstream, holding one frame back like a real encoder's
/// reorder queue
struct RleEncoder {
    format: MediaFormat,
    frame_size: usize,
    pending: Option<CodecOutput>,
}

impl FrameTransform for RleEncoder {
    fn output_format(&self) -> MediaFormat {
        self.format.clone()
    }

    fn max_input_size(&self) -> usize {
        self.frame_size
    }

    fn process(
        &mut self,
        input: FrameBuffer,
        pts: i64,
        _flags: BufferFlags,
        out: &mut Vec<CodecOutput>,
    ) -> Result<()> {
        if input.format() != self.format.pixel_format && input.format() != PixelFormat::Compressed
        {
            return Err(Error::Codec(format!(
                "encoder configured for {}, got {} frame",
                self.format.pixel_format,
                input.format()
            )));
        }
        if input.remaining() != self.frame_size {
            return Err(Error::Codec(format!(
                "frame is {} bytes, expected {} for {} {}",
                input.remaining(),
                self.frame_size,
                self.format.resolution,
                self.format.pixel_format
            )));
        }

        let mut packet = Vec::new();
        rle::encode(input.as_slice(), &mut packet);
        let encoded = CodecOutput {
            buffer: FrameBuffer::from_vec(packet).with_pts(pts),
            pts,
            flags: BufferFlags::KEY_FRAME,
        };

        if let Some(previous) = self.pending.replace(encoded) {
            out.push(previous);
        }
        Ok(())
    }

    fn flush(&mut self, out: &mut Vec<CodecOutput>) -> Result<()> {
        out.extend(self.pending.take());
        Ok(())
    }
}
