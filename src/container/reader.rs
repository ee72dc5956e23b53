//! Clip reader

use super::{Sample, MAGIC, MAX_PAYLOAD};
use crate::buffer::FrameBuffer;
use crate::codec::{BufferFlags, MediaFormat};
use crate::error::{Error, Result};
use crate::types::{Framerate, PixelFormat, Resolution};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

/// Reads samples from a clip file in stored order
#[derive(Debug)]
pub struct Demuxer {
    path: PathBuf,
    reader: BufReader<File>,
    format: MediaFormat,
    samples: u64,
}

impl Demuxer {
    /// Open `path` and parse the track header
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = BufReader::new(File::open(&path)?);

        let magic: [u8; 4] = read_array(&mut reader, "magic")?;
        if magic != MAGIC {
            return Err(Error::Container(format!(
                "{} is not a clip (magic {:02x?})",
                path.display(),
                magic
            )));
        }

        let mime_len = u16::from_le_bytes(read_array(&mut reader, "mime length")?) as usize;
        let mut mime = vec![0u8; mime_len];
        read_exact(&mut reader, &mut mime, "mime")?;
        let mime = String::from_utf8(mime)
            .map_err(|_| Error::Container("mime type is not UTF-8".into()))?;

        let width = u32::from_le_bytes(read_array(&mut reader, "width")?);
        let height = u32::from_le_bytes(read_array(&mut reader, "height")?);
        let fps_num = u32::from_le_bytes(read_array(&mut reader, "framerate")?);
        let fps_den = u32::from_le_bytes(read_array(&mut reader, "framerate")?);
        let fourcc: [u8; 4] = read_array(&mut reader, "pixel format")?;
        let pixel_format = PixelFormat::from_fourcc(fourcc).ok_or_else(|| {
            Error::Container(format!(
                "unknown pixel format {}",
                String::from_utf8_lossy(&fourcc)
            ))
        })?;

        let format = MediaFormat {
            mime,
            resolution: Resolution::new(width, height),
            framerate: Framerate::new(fps_num, fps_den),
            pixel_format,
            bitrate: None,
            i_frame_interval: None,
        };

        tracing::debug!(
            "Demuxer opened: {} ({} {} {})",
            path.display(),
            format.mime,
            format.resolution,
            format.pixel_format
        );

        Ok(Self {
            path,
            reader,
            format,
            samples: 0,
        })
    }

    /// Format of the single track
    pub fn track_format(&self) -> &MediaFormat {
        &self.format
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn samples_read(&self) -> u64 {
        self.samples
    }

    /// Next sample, or `None` at end of stream
    pub fn read_sample(&mut self) -> Result<Option<Sample>> {
        let mut pts = [0u8; 8];
        if !fill_or_eof(&mut self.reader, &mut pts)? {
            return Ok(None);
        }
        let pts = i64::from_le_bytes(pts);
        let flags = u32::from_le_bytes(read_array(&mut self.reader, "sample flags")?);
        let len = u32::from_le_bytes(read_array(&mut self.reader, "sample length")?) as usize;
        if len > MAX_PAYLOAD {
            return Err(Error::Container(format!(
                "sample at pts {} claims {} bytes",
                pts, len
            )));
        }

        let mut payload = vec![0u8; len];
        read_exact(&mut self.reader, &mut payload, "sample payload")?;
        self.samples += 1;

        Ok(Some(Sample {
            buffer: FrameBuffer::from_vec(payload).with_pts(pts),
            pts,
            flags: BufferFlags::from_bits_truncate(flags),
        }))
    }
}

/// Fill `buf` completely. `Ok(false)` if the reader was already at end of
/// file; a partial fill is a truncated record.
fn fill_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(Error::Container(format!(
                    "truncated record: {} of {} header bytes",
                    filled,
                    buf.len()
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

fn read_exact(reader: &mut impl Read, buf: &mut [u8], what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => Error::Container(format!("truncated {}", what)),
        _ => Error::Io(e),
    })
}

fn read_array<const N: usize>(reader: &mut impl Read, what: &str) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    read_exact(reader, &mut buf, what)?;
    Ok(buf)
}
