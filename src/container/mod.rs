//! Minimal single-track clip container
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! header: "CBV1" | u16 mime_len | mime | u32 width | u32 height
//!         | u32 fps_num | u32 fps_den | [u8; 4] pixel fourcc
//! record: i64 pts_us | u32 flags | u32 len | payload
//! ```
//!
//! End of file on a record boundary ends the stream.

mod reader;
mod writer;

pub use reader::Demuxer;
pub use writer::Muxer;

use crate::buffer::FrameBuffer;
use crate::codec::BufferFlags;

/// File magic
pub const MAGIC: [u8; 4] = *b"CBV1";

/// Largest payload a record may carry
pub const MAX_PAYLOAD: usize = 256 * 1024 * 1024;

/// Extension used by the CLI for clips
pub const EXTENSION: &str = "cbv";

/// One access unit read from a clip
#[derive(Debug)]
pub struct Sample {
    pub buffer: FrameBuffer,
    pub pts: i64,
    pub flags: BufferFlags,
}
