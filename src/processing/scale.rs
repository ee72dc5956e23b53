//! Frame scaling

use super::{SurfaceKind, SurfacePool};
use crate::buffer::FrameBuffer;
use crate::error::{Error, Result};
use crate::types::{chroma_dims, PixelFormat, Resolution};

const FP_SHIFT: u32 = 16;
const FP_ONE: u64 = 1 << FP_SHIFT;
const FP_HALF: i64 = 1 << (FP_SHIFT - 1);

/// Resizes one decoded frame into a new buffer
pub trait ScalerStage: Send {
    /// Consume `input` and return a `dst_width x dst_height` frame in the
    /// same pixel format
    fn resize(
        &mut self,
        input: FrameBuffer,
        src_width: u32,
        src_height: u32,
        dst_width: u32,
        dst_height: u32,
    ) -> Result<FrameBuffer>;
}

/// Bilinear CPU scaler
///
/// Uploads the source into a leased texture, resamples each plane into a
/// leased render target, then reads the target back. Both leases go back to
/// the pool on every exit path.
pub struct CpuScaler {
    pool: SurfacePool,
}

impl CpuScaler {
    pub fn new() -> Self {
        Self::with_pool(SurfacePool::new())
    }

    /// Share a pool, e.g. to watch lease counts from outside
    pub fn with_pool(pool: SurfacePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SurfacePool {
        &self.pool
    }
}

impl Default for CpuScaler {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalerStage for CpuScaler {
    fn resize(
        &mut self,
        input: FrameBuffer,
        src_width: u32,
        src_height: u32,
        dst_width: u32,
        dst_height: u32,
    ) -> Result<FrameBuffer> {
        let format = input.format();
        let src = Resolution::new(src_width, src_height);
        let dst = Resolution::new(dst_width, dst_height);

        let planes = plane_layout(format, src)?;
        let src_size = format
            .frame_size(src)
            .ok_or_else(|| Error::UnsupportedPixelFormat(format.to_string()))?;
        if src.is_empty() || dst.is_empty() {
            return Err(Error::Scaling(format!("cannot scale {} to {}", src, dst)));
        }
        if input.remaining() < src_size {
            return Err(Error::Scaling(format!(
                "input is {} bytes, {} {} needs {}",
                input.remaining(),
                src,
                format,
                src_size
            )));
        }
        let dst_size = format
            .frame_size(dst)
            .ok_or_else(|| Error::UnsupportedPixelFormat(format.to_string()))?;
        let dst_planes = plane_layout(format, dst)?;

        let mut texture = self.pool.acquire(SurfaceKind::Texture, src_size);
        texture.upload(&input.as_slice()[..src_size]);
        let mut target = self.pool.acquire(SurfaceKind::RenderTarget, dst_size);

        let mut src_offset = 0;
        let mut dst_offset = 0;
        for (sp, dp) in planes.iter().zip(dst_planes.iter()) {
            let src_plane = &texture.bytes()[src_offset..src_offset + sp.len()];
            let dst_plane = &mut target.bytes_mut()[dst_offset..dst_offset + dp.len()];
            resample_plane(src_plane, *sp, dst_plane, *dp);
            src_offset += sp.len();
            dst_offset += dp.len();
        }
        drop(texture);

        let mut output = FrameBuffer::from_vec(target.read_back()).with_format(format);
        if let Some(pts) = input.pts() {
            output = output.with_pts(pts);
        }
        Ok(output)
    }
}

/// Geometry of one plane
#[derive(Debug, Clone, Copy)]
struct Plane {
    width: usize,
    height: usize,
    channels: usize,
}

impl Plane {
    fn len(&self) -> usize {
        self.width * self.height * self.channels
    }
}

fn plane_layout(format: PixelFormat, res: Resolution) -> Result<Vec<Plane>> {
    let (w, h) = (res.width as usize, res.height as usize);
    let (cw, ch) = chroma_dims(res);
    let plane = |width, height, channels| Plane {
        width,
        height,
        channels,
    };
    match format {
        PixelFormat::Rgba | PixelFormat::Bgra => Ok(vec![plane(w, h, 4)]),
        PixelFormat::Nv12 => Ok(vec![plane(w, h, 1), plane(cw, ch, 2)]),
        PixelFormat::Yuv420p => Ok(vec![plane(w, h, 1), plane(cw, ch, 1), plane(cw, ch, 1)]),
        PixelFormat::Compressed => Err(Error::UnsupportedPixelFormat(format!(
            "{} buffers hold bitstream, not pixels",
            format
        ))),
    }
}

/// Source sample positions for each destination coordinate, as an index
/// pair plus the 16.16 weight of the second sample
fn sample_positions(src_len: usize, dst_len: usize) -> Vec<(usize, usize, u64)> {
    let max_fp = ((src_len as i64) - 1) << FP_SHIFT;
    (0..dst_len)
        .map(|d| {
            // centre of destination pixel d, mapped into source space
            let centre = ((2 * d as i64 + 1) * (src_len as i64) << FP_SHIFT) / (2 * dst_len as i64);
            let fp = (centre - FP_HALF).clamp(0, max_fp);
            let i0 = (fp >> FP_SHIFT) as usize;
            let i1 = (i0 + 1).min(src_len - 1);
            (i0, i1, (fp as u64) & (FP_ONE - 1))
        })
        .collect()
}

fn resample_plane(src: &[u8], sp: Plane, dst: &mut [u8], dp: Plane) {
    let xs = sample_positions(sp.width, dp.width);
    let ys = sample_positions(sp.height, dp.height);
    let c = sp.channels;
    let src_stride = sp.width * c;

    for (dy, &(y0, y1, fy)) in ys.iter().enumerate() {
        let row0 = &src[y0 * src_stride..(y0 + 1) * src_stride];
        let row1 = &src[y1 * src_stride..(y1 + 1) * src_stride];
        let out = &mut dst[dy * dp.width * c..(dy + 1) * dp.width * c];

        for (dx, &(x0, x1, fx)) in xs.iter().enumerate() {
            let w00 = (FP_ONE - fx) * (FP_ONE - fy);
            let w01 = fx * (FP_ONE - fy);
            let w10 = (FP_ONE - fx) * fy;
            let w11 = fx * fy;
            for k in 0..c {
                let sum = row0[x0 * c + k] as u64 * w00
                    + row0[x1 * c + k] as u64 * w01
                    + row1[x0 * c + k] as u64 * w10
                    + row1[x1 * c + k] as u64 * w11;
                out[dx * c + k] = ((sum + (1 << 31)) >> 32) as u8;
            }
        }
    }
}
