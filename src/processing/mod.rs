//! Video processing module
//!
//! Frame resizing behind the [`ScalerStage`] trait, plus the scoped surface
//! pool the scaler draws its working memory from.

mod scale;

pub use scale::{CpuScaler, ScalerStage};

use parking_lot::Mutex;
use std::sync::Arc;

/// What a surface is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// Holds the uploaded source frame
    Texture,
    /// Receives the resampled frame
    RenderTarget,
}

/// Lease counters for a [`SurfacePool`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Leases currently outstanding
    pub live: usize,
    /// Most leases outstanding at once
    pub peak: usize,
    /// Leases handed out over the pool's lifetime
    pub total: u64,
}

/// Source of scoped scratch surfaces.
///
/// Cloning shares the counters.
#[derive(Debug, Clone, Default)]
pub struct SurfacePool {
    stats: Arc<Mutex<PoolStats>>,
}

impl SurfacePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lease a zeroed surface of `size` bytes; it returns to the pool on drop
    pub fn acquire(&self, kind: SurfaceKind, size: usize) -> SurfaceLease {
        {
            let mut stats = self.stats.lock();
            stats.live += 1;
            stats.total += 1;
            stats.peak = stats.peak.max(stats.live);
        }
        tracing::trace!("Leased {:?} surface ({} bytes)", kind, size);
        SurfaceLease {
            kind,
            data: vec![0u8; size],
            stats: self.stats.clone(),
        }
    }

    pub fn stats(&self) -> PoolStats {
        *self.stats.lock()
    }
}

/// A surface checked out of a [`SurfacePool`]
pub struct SurfaceLease {
    kind: SurfaceKind,
    data: Vec<u8>,
    stats: Arc<Mutex<PoolStats>>,
}

impl SurfaceLease {
    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    /// Copy `bytes` to the start of the surface
    pub fn upload(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(self.data.len());
        self.data[..n].copy_from_slice(&bytes[..n]);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Move the surface contents out, ending the lease
    pub fn read_back(mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }
}

impl Drop for SurfaceLease {
    fn drop(&mut self) {
        self.stats.lock().live -= 1;
    }
}
