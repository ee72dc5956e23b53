//! Common types used throughout codecbench

use serde::{Deserialize, Serialize};

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    // Common resolutions
    pub const HD_720P: Self = Self::new(1280, 720);
    pub const FHD_1080P: Self = Self::new(1920, 1080);
    pub const UHD_4K: Self = Self::new(3840, 2160);

    /// Calculate total pixels
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// True if either dimension is zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Parse a `WIDTHxHEIGHT` string
    pub fn parse(s: &str) -> Option<Self> {
        let (w, h) = s.trim().split_once(['x', 'X'])?;
        let res = Self::new(w.parse().ok()?, h.parse().ok()?);
        (!res.is_empty()).then_some(res)
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::FHD_1080P
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel layout of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PixelFormat {
    /// NV12 - Y plane + interleaved UV at half resolution
    #[default]
    Nv12,
    /// YUV420P - Y, U, V planes, chroma at half resolution
    Yuv420p,
    /// RGBA - 32-bit packed
    Rgba,
    /// BGRA - 32-bit packed
    Bgra,
    /// Codec bitstream, not pixels
    Compressed,
}

impl PixelFormat {
    /// Size in bytes of one frame.
    ///
    /// `None` for bitstream buffers and for sizes that overflow `usize`.
    pub fn frame_size(&self, res: Resolution) -> Option<usize> {
        let w = res.width as usize;
        let h = res.height as usize;
        let (cw, ch) = chroma_dims(res);
        let luma = w.checked_mul(h)?;
        match self {
            PixelFormat::Nv12 | PixelFormat::Yuv420p => {
                luma.checked_add(cw.checked_mul(ch)?.checked_mul(2)?)
            }
            PixelFormat::Rgba | PixelFormat::Bgra => luma.checked_mul(4),
            PixelFormat::Compressed => None,
        }
    }

    /// Raw pixel layouts can be scaled and encoded
    pub fn is_raw(&self) -> bool {
        !matches!(self, PixelFormat::Compressed)
    }

    /// Four-character code used in container headers
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            PixelFormat::Nv12 => *b"NV12",
            PixelFormat::Yuv420p => *b"I420",
            PixelFormat::Rgba => *b"RGBA",
            PixelFormat::Bgra => *b"BGRA",
            PixelFormat::Compressed => *b"CMPR",
        }
    }

    pub fn from_fourcc(code: [u8; 4]) -> Option<Self> {
        match &code {
            b"NV12" => Some(PixelFormat::Nv12),
            b"I420" => Some(PixelFormat::Yuv420p),
            b"RGBA" => Some(PixelFormat::Rgba),
            b"BGRA" => Some(PixelFormat::Bgra),
            b"CMPR" => Some(PixelFormat::Compressed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = self.fourcc();
        write!(f, "{}", String::from_utf8_lossy(&code))
    }
}

/// Chroma plane dimensions for 4:2:0 layouts (rounded up for odd sizes)
pub(crate) fn chroma_dims(res: Resolution) -> (usize, usize) {
    (
        (res.width as usize).div_ceil(2),
        (res.height as usize).div_ceil(2),
    )
}

/// Framerate representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Framerate {
    pub num: u32,
    pub den: u32,
}

impl Framerate {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    pub const FPS_30: Self = Self::new(30, 1);
    pub const FPS_60: Self = Self::new(60, 1);

    /// Get framerate as f64
    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /// Frame duration in microseconds
    pub fn frame_duration_us(&self) -> i64 {
        if self.num == 0 {
            return 0;
        }
        (1_000_000 * self.den as i64) / self.num as i64
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self::FPS_30
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.den == 1 {
            write!(f, "{} fps", self.num)
        } else {
            write!(f, "{:.2} fps", self.as_f64())
        }
    }
}
