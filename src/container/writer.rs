//! Clip writer

use super::{MAGIC, MAX_PAYLOAD};
use crate::codec::{BufferFlags, MediaFormat};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes one track of samples to a clip file
#[derive(Debug)]
pub struct Muxer {
    path: PathBuf,
    writer: BufWriter<File>,
    bytes_written: u64,
    samples: u64,
}

impl Muxer {
    /// Create (or overwrite) `path` and write the track header
    pub fn create(path: impl AsRef<Path>, format: &MediaFormat) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mime = format.mime.as_bytes();
        let mime_len = u16::try_from(mime.len())
            .map_err(|_| Error::Container(format!("mime type too long: {} bytes", mime.len())))?;

        let file = File::create(&path)?;
        let mut muxer = Self {
            path,
            writer: BufWriter::new(file),
            bytes_written: 0,
            samples: 0,
        };

        muxer.put(&MAGIC)?;
        muxer.put(&mime_len.to_le_bytes())?;
        muxer.put(mime)?;
        muxer.put(&format.resolution.width.to_le_bytes())?;
        muxer.put(&format.resolution.height.to_le_bytes())?;
        muxer.put(&format.framerate.num.to_le_bytes())?;
        muxer.put(&format.framerate.den.to_le_bytes())?;
        muxer.put(&format.pixel_format.fourcc())?;

        tracing::debug!(
            "Muxer created: {} ({} {})",
            muxer.path.display(),
            format.mime,
            format.resolution
        );
        Ok(muxer)
    }

    /// Append one record
    pub fn write_sample(&mut self, data: &[u8], pts: i64, flags: BufferFlags) -> Result<()> {
        if data.len() > MAX_PAYLOAD {
            return Err(Error::Container(format!(
                "sample of {} bytes exceeds the {} byte limit",
                data.len(),
                MAX_PAYLOAD
            )));
        }

        self.put(&pts.to_le_bytes())?;
        self.put(&flags.bits().to_le_bytes())?;
        self.put(&(data.len() as u32).to_le_bytes())?;
        self.put(data)?;
        self.samples += 1;
        Ok(())
    }

    /// Flush to disk and return the total file size
    pub fn finish(mut self) -> Result<u64> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        tracing::debug!(
            "Muxer finished: {} ({} samples, {} bytes)",
            self.path.display(),
            self.samples,
            self.bytes_written
        );
        Ok(self.bytes_written)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn samples_written(&self) -> u64 {
        self.samples
    }

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }
}
