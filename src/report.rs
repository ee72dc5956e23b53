//! Stage timings and the benchmark report

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Decode,
    Resize,
    Encode,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 3] = [Stage::Decode, Stage::Resize, Stage::Encode];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Decode => "decode",
            Stage::Resize => "resize",
            Stage::Encode => "encode",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Monotonic start/end of one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTiming {
    stage: Stage,
    started: Instant,
    ended: Instant,
}

impl StageTiming {
    pub fn new(stage: Stage, started: Instant, ended: Instant) -> Self {
        Self {
            stage,
            started,
            ended,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn ended(&self) -> Instant {
        self.ended
    }

    /// Elapsed time; zero if the clock readings were out of order
    pub fn duration(&self) -> Duration {
        self.ended.saturating_duration_since(self.started)
    }

    pub fn duration_millis(&self) -> f64 {
        self.duration().as_secs_f64() * 1000.0
    }
}

/// Result of one complete pipeline run
#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    timings: [StageTiming; 3],
    output_path: PathBuf,
    output_bytes: u64,
    frame_count: usize,
}

impl BenchmarkReport {
    pub fn new(
        decode: StageTiming,
        resize: StageTiming,
        encode: StageTiming,
        output_path: PathBuf,
        output_bytes: u64,
        frame_count: usize,
    ) -> Self {
        debug_assert_eq!(
            [decode.stage(), resize.stage(), encode.stage()],
            Stage::ALL
        );
        Self {
            timings: [decode, resize, encode],
            output_path,
            output_bytes,
            frame_count,
        }
    }

    /// Timings in stage order: decode, resize, encode
    pub fn timings(&self) -> &[StageTiming] {
        &self.timings
    }

    pub fn timing(&self, stage: Stage) -> &StageTiming {
        match stage {
            Stage::Decode => &self.timings[0],
            Stage::Resize => &self.timings[1],
            Stage::Encode => &self.timings[2],
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.timings.iter().map(|t| t.duration()).sum()
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn output_bytes(&self) -> u64 {
        self.output_bytes
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Serializable snapshot
    pub fn summary(&self) -> ReportSummary {
        let stages = self
            .timings
            .iter()
            .map(|t| {
                let secs = t.duration().as_secs_f64();
                StageSummary {
                    stage: t.stage(),
                    duration_ms: t.duration_millis(),
                    fps: if secs > 0.0 {
                        self.frame_count as f64 / secs
                    } else {
                        0.0
                    },
                }
            })
            .collect();

        ReportSummary {
            frame_count: self.frame_count,
            output_path: self.output_path.clone(),
            output_bytes: self.output_bytes,
            total_ms: self.total_duration().as_secs_f64() * 1000.0,
            stages,
        }
    }
}

impl std::fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Transcoding complete ({} frames)", self.frame_count)?;
        for timing in &self.timings {
            writeln!(
                f,
                "  - {:<7} {:>10.2} ms",
                timing.stage(),
                timing.duration_millis()
            )?;
        }
        write!(
            f,
            "  Saved to: {} ({} bytes)",
            self.output_path.display(),
            self.output_bytes
        )
    }
}

/// Report snapshot suitable for TOML output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub frame_count: usize,
    pub output_path: PathBuf,
    pub output_bytes: u64,
    pub total_ms: f64,
    pub stages: Vec<StageSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: Stage,
    pub duration_ms: f64,
    /// Frames per second through this stage
    pub fps: f64,
}
