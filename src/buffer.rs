//! Frame buffers with position/limit bookkeeping
//!
//! A [`FrameBuffer`] holds either raw pixels or codec bitstream. It is moved
//! between stages, never shared: whoever holds the value owns the bytes.

use crate::error::{Error, Result};
use crate::types::PixelFormat;

/// Fixed-capacity byte block.
///
/// Invariant: `0 <= position <= limit <= capacity`. Bytes in
/// `position..limit` are the readable remainder.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    data: Vec<u8>,
    limit: usize,
    position: usize,
    pts: Option<i64>,
    format: PixelFormat,
}

impl FrameBuffer {
    /// Allocate an empty buffer with room for `capacity` bytes
    pub fn allocate(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            limit: 0,
            position: 0,
            pts: None,
            format: PixelFormat::Compressed,
        }
    }

    /// Wrap existing bytes; the whole vector is readable
    pub fn from_vec(data: Vec<u8>) -> Self {
        let limit = data.len();
        Self {
            data,
            limit,
            position: 0,
            pts: None,
            format: PixelFormat::Compressed,
        }
    }

    /// Zero-length buffer, used for end-of-stream markers
    pub fn empty() -> Self {
        Self::allocate(0)
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// Copy `bytes` in at the cursor, advancing it and growing the valid
    /// length if needed
    pub fn put(&mut self, bytes: &[u8]) -> Result<()> {
        let end = self.position + bytes.len();
        if end > self.data.len() {
            return Err(Error::CapacityExceeded {
                required: end,
                capacity: self.data.len(),
            });
        }
        self.data[self.position..end].copy_from_slice(bytes);
        self.position = end;
        self.limit = self.limit.max(end);
        Ok(())
    }

    /// Switch from writing to reading: limit at the cursor, cursor at zero
    pub fn flip(&mut self) {
        self.limit = self.position;
        self.position = 0;
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }

    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = 0;
    }

    pub fn set_position(&mut self, position: usize) -> Result<()> {
        if position > self.limit {
            return Err(Error::CapacityExceeded {
                required: position,
                capacity: self.limit,
            });
        }
        self.position = position;
        Ok(())
    }

    /// Bytes left between the cursor and the valid length
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Readable bytes, `position..limit`
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    /// Consume the buffer, keeping only the readable bytes
    pub fn into_vec(mut self) -> Vec<u8> {
        self.data.truncate(self.limit);
        if self.position > 0 {
            self.data.drain(..self.position);
        }
        self.data
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Valid length
    pub fn len(&self) -> usize {
        self.limit
    }

    pub fn is_empty(&self) -> bool {
        self.limit == 0
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Presentation timestamp in microseconds
    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("capacity", &self.capacity())
            .field("limit", &self.limit)
            .field("position", &self.position)
            .field("pts", &self.pts)
            .field("format", &self.format)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_is_empty() {
        let buf = FrameBuffer::allocate(16);
        assert_eq!(buf.capacity(), 16);
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_remaining_tracks_every_put() {
        let mut buf = FrameBuffer::allocate(10);
        for chunk in [&b"abc"[..], b"de", b"", b"fghij"] {
            buf.put(chunk).unwrap();
            assert_eq!(buf.remaining(), buf.len() - buf.position());
        }
        buf.flip();
        assert_eq!(buf.remaining(), 10);
        assert_eq!(buf.as_slice(), b"abcdefghij");
    }

    #[test]
    fn test_put_overflow_is_rejected() {
        let mut buf = FrameBuffer::allocate(4);
        buf.put(b"abc").unwrap();
        let err = buf.put(b"de").unwrap_err();
        assert!(matches!(
            err,
            Error::CapacityExceeded {
                required: 5,
                capacity: 4
            }
        ));
        // failed put leaves contents untouched
        assert_eq!(buf.position(), 3);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_overwrite_after_rewind_keeps_limit() {
        let mut buf = FrameBuffer::allocate(8);
        buf.put(b"12345").unwrap();
        buf.rewind();
        buf.put(b"ab").unwrap();
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.remaining(), 3);
        buf.rewind();
        assert_eq!(buf.as_slice(), b"ab345");
    }

    #[test]
    fn test_into_vec_skips_consumed_bytes() {
        let mut buf = FrameBuffer::from_vec(b"hello".to_vec());
        buf.set_position(2).unwrap();
        assert_eq!(buf.into_vec(), b"llo");
        assert!(FrameBuffer::from_vec(vec![1]).set_position(2).is_err());
    }
}
