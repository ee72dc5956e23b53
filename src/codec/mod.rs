//! Buffer-queue codec abstraction
//!
//! A [`CodecPort`] models an asynchronous coder: the caller dequeues input
//! slots, submits buffers into them, and polls for output slots with a
//! bounded wait. The actual coding is done by a [`FrameTransform`] obtained
//! from a [`CodecProvider`], run on the port's engine thread.

pub mod port;
pub mod rle;
pub mod software;

pub use port::{CodecPort, PortState, PortStats};
pub use software::SoftwareProvider;

use crate::buffer::FrameBuffer;
use crate::error::Result;
use crate::types::{Framerate, PixelFormat, Resolution};
use serde::{Deserialize, Serialize};

/// Known codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// Run-length reference codec, always available in software
    #[default]
    Rle,
    /// H.264/AVC
    H264,
    /// H.265/HEVC
    Hevc,
    /// AV1
    Av1,
}

impl Codec {
    pub const ALL: [Codec; 4] = [Codec::Rle, Codec::H264, Codec::Hevc, Codec::Av1];

    /// MIME type used in [`MediaFormat`]
    pub fn mime(&self) -> &'static str {
        match self {
            Codec::Rle => "video/x-rle",
            Codec::H264 => "video/avc",
            Codec::Hevc => "video/hevc",
            Codec::Av1 => "video/av01",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.mime() == mime)
    }

    /// Get human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Codec::Rle => "RLE (reference)",
            Codec::H264 => "H.264 (AVC)",
            Codec::Hevc => "H.265 (HEVC)",
            Codec::Av1 => "AV1",
        }
    }

    /// Parse a user-facing codec name
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "rle" => Some(Codec::Rle),
            "h264" | "avc" => Some(Codec::H264),
            "h265" | "hevc" => Some(Codec::Hevc),
            "av1" => Some(Codec::Av1),
            other => Self::from_mime(other),
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Which way a port codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Bitstream in, raw frames out
    Decoder,
    /// Raw frames in, bitstream out
    Encoder,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Decoder => f.write_str("decoder"),
            Direction::Encoder => f.write_str("encoder"),
        }
    }
}

/// Stream description handed to `configure`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFormat {
    /// Codec MIME type, e.g. `video/x-rle`
    pub mime: String,
    pub resolution: Resolution,
    pub framerate: Framerate,
    /// Raw pixel layout on the uncompressed side
    pub pixel_format: PixelFormat,
    /// Target bitrate in bits/sec (encoders)
    pub bitrate: Option<u32>,
    /// Keyframe interval in seconds (encoders)
    pub i_frame_interval: Option<u32>,
}

impl MediaFormat {
    /// Video format for a known codec
    pub fn video(codec: Codec, width: u32, height: u32) -> Self {
        Self::with_mime(codec.mime(), width, height)
    }

    /// Video format for an arbitrary MIME string
    pub fn with_mime(mime: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            mime: mime.into(),
            resolution: Resolution::new(width, height),
            framerate: Framerate::default(),
            pixel_format: PixelFormat::default(),
            bitrate: None,
            i_frame_interval: None,
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

    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    pub fn with_i_frame_interval(mut self, seconds: u32) -> Self {
        self.i_frame_interval = Some(seconds);
        self
    }

    pub fn codec(&self) -> Option<Codec> {
        Codec::from_mime(&self.mime)
    }

    /// Size of one raw frame in this format
    pub fn raw_frame_size(&self) -> Option<usize> {
        self.pixel_format.frame_size(self.resolution)
    }
}

/// Per-buffer flags, mirroring hardware codec buffer info
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferFlags(u32);

impl BufferFlags {
    pub const NONE: Self = Self(0);
    pub const KEY_FRAME: Self = Self(1);
    pub const CODEC_CONFIG: Self = Self(2);
    pub const END_OF_STREAM: Self = Self(4);

    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Unknown bits are dropped
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & 0b111)
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.contains(Self::END_OF_STREAM)
    }
}

impl std::ops::BitOr for BufferFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Metadata for a dequeued output buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub pts: i64,
    pub size: usize,
    pub flags: BufferFlags,
}

/// Result of a successful output poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// Output slot `index` holds a buffer
    Buffer { index: usize, info: BufferInfo },
    /// The output format is now known or has changed
    FormatChanged(MediaFormat),
}

/// One unit produced by a transform
#[derive(Debug)]
pub struct CodecOutput {
    pub buffer: FrameBuffer,
    pub pts: i64,
    pub flags: BufferFlags,
}

/// Coding backend run on a port's engine thread
pub trait FrameTransform: Send {
    /// Format of the buffers this transform emits
    fn output_format(&self) -> MediaFormat;

    /// Largest input access unit accepted, sizes the port's input slots
    fn max_input_size(&self) -> usize;

    /// Consume one input access unit, pushing zero or more outputs
    fn process(
        &mut self,
        input: FrameBuffer,
        pts: i64,
        flags: BufferFlags,
        out: &mut Vec<CodecOutput>,
    ) -> Result<()>;

    /// Emit everything still held back
    fn flush(&mut self, out: &mut Vec<CodecOutput>) -> Result<()>;
}

/// External capability provider that builds transforms
pub trait CodecProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether `create_transform` would accept this format
    fn supports(&self, format: &MediaFormat, direction: Direction) -> bool;

    /// Build a transform, or fail with `UnsupportedFormat`
    fn create_transform(
        &self,
        format: &MediaFormat,
        direction: Direction,
    ) -> Result<Box<dyn FrameTransform>>;
}

/// Capabilities of a provider for display
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: &'static str,
    pub decoders: Vec<Codec>,
    pub encoders: Vec<Codec>,
}

/// Probe which known codecs a provider handles at a given size
pub fn probe(provider: &dyn CodecProvider, resolution: Resolution) -> ProviderInfo {
    let supported = |direction| {
        Codec::ALL
            .into_iter()
            .filter(|codec| {
                let format = MediaFormat::video(*codec, resolution.width, resolution.height);
                provider.supports(&format, direction)
            })
            .collect()
    };

    ProviderInfo {
        name: provider.name(),
        decoders: supported(Direction::Decoder),
        encoders: supported(Direction::Encoder),
    }
}

/// Provider whose transforms block for a fixed time on every call, for
/// exercising stall handling
#[cfg(test)]
pub(crate) struct StallingProvider(pub std::time::Duration);

#[cfg(test)]
struct StallingTransform {
    format: MediaFormat,
    stall: std::time::Duration,
}

#[cfg(test)]
impl CodecProvider for StallingProvider {
    fn name(&self) -> &'static str {
        "stalling"
    }

    fn supports(&self, _format: &MediaFormat, _direction: Direction) -> bool {
        true
    }

    fn create_transform(
        &self,
        format: &MediaFormat,
        _direction: Direction,
    ) -> Result<Box<dyn FrameTransform>> {
        Ok(Box::new(StallingTransform {
            format: format.clone(),
            stall: self.0,
        }))
    }
}

#[cfg(test)]
impl FrameTransform for StallingTransform {
    fn output_format(&self) -> MediaFormat {
        self.format.clone()
    }

    fn max_input_size(&self) -> usize {
        usize::MAX
    }

    fn process(
        &mut self,
        _input: FrameBuffer,
        _pts: i64,
        _flags: BufferFlags,
        _out: &mut Vec<CodecOutput>,
    ) -> Result<()> {
        std::thread::sleep(self.stall);
        Ok(())
    }

    fn flush(&mut self, _out: &mut Vec<CodecOutput>) -> Result<()> {
        std::thread::sleep(self.stall);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_mime_lookup() {
        for codec in Codec::ALL {
            assert_eq!(Codec::from_mime(codec.mime()), Some(codec));
        }
        assert_eq!(Codec::from_mime("video/x-unknown"), None);
        assert_eq!(Codec::parse("HEVC"), Some(Codec::Hevc));
        assert_eq!(Codec::parse("video/x-rle"), Some(Codec::Rle));
    }

    #[test]
    fn test_buffer_flags() {
        let flags = BufferFlags::KEY_FRAME | BufferFlags::END_OF_STREAM;
        assert!(flags.is_end_of_stream());
        assert!(flags.contains(BufferFlags::KEY_FRAME));
        assert!(!flags.contains(BufferFlags::CODEC_CONFIG));
        assert_eq!(BufferFlags::from_bits_truncate(0xff).bits(), 0b111);
    }

    #[test]
    fn test_software_probe() {
        let info = probe(&SoftwareProvider, Resolution::FHD_1080P);
        assert_eq!(info.decoders, vec![Codec::Rle]);
        assert_eq!(info.encoders, vec![Codec::Rle]);
    }
}
