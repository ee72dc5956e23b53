//! Configuration types for codecbench

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::types::{Framerate, Resolution};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Slot and polling limits for a codec port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Bounded wait for each dequeue poll, in microseconds
    pub poll_timeout_us: u64,
    /// Consecutive empty polls before a stage is declared stalled
    pub max_idle_polls: u32,
    /// Input slots the caller may hold or have in flight
    pub input_slots: usize,
    /// Output slots the engine may fill before the caller releases them
    pub output_slots: usize,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            poll_timeout_us: 10_000,
            max_idle_polls: 500,
            input_slots: 4,
            output_slots: 4,
        }
    }
}

impl PortConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_micros(self.poll_timeout_us)
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout_us = timeout.as_micros() as u64;
        self
    }

    pub fn with_max_idle_polls(mut self, polls: u32) -> Self {
        self.max_idle_polls = polls;
        self
    }

    pub fn with_slots(mut self, input: usize, output: usize) -> Self {
        self.input_slots = input;
        self.output_slots = output;
        self
    }

    /// Longest a stage may sit idle before failing
    pub fn stall_budget(&self) -> Duration {
        self.poll_timeout() * self.max_idle_polls
    }
}

/// Encoder settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// Output codec
    pub codec: Codec,
    /// Target bitrate in bits/sec
    pub bitrate: u32,
    /// Output framerate
    pub framerate: Framerate,
    /// Keyframe interval in seconds
    pub i_frame_interval: u32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            codec: Codec::Rle,
            bitrate: 4_000_000,
            framerate: Framerate::FPS_30,
            i_frame_interval: 1,
        }
    }
}

impl EncoderSettings {
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.framerate = Framerate::new(fps, 1);
        self
    }
}

/// Full benchmark run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Source clip
    pub input: PathBuf,
    /// Encoded artifact, always overwritten
    pub output: PathBuf,
    /// Resize target
    pub target: Resolution,
    pub encoder: EncoderSettings,
    pub port: PortConfig,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("4k_input.cbv"),
            output: PathBuf::from("output_1080p.cbv"),
            target: Resolution::FHD_1080P,
            encoder: EncoderSettings::default(),
            port: PortConfig::default(),
        }
    }
}

impl BenchmarkConfig {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            ..Default::default()
        }
    }

    /// Load from a TOML file; missing fields take defaults
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_target(mut self, width: u32, height: u32) -> Self {
        self.target = Resolution::new(width, height);
        self
    }

    pub fn with_encoder(mut self, encoder: EncoderSettings) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_port(mut self, port: PortConfig) -> Self {
        self.port = port;
        self
    }

    /// Apply a preset's target and encoder settings
    pub fn with_preset(mut self, preset: Preset) -> Self {
        let (target, encoder) = preset.settings();
        self.target = target;
        self.encoder = encoder;
        self
    }

    /// Reject settings no run could succeed with
    pub fn validate(&self) -> Result<()> {
        if self.target.is_empty() {
            return Err(Error::Config(format!(
                "target resolution {} is empty",
                self.target
            )));
        }
        if self.encoder.framerate.num == 0 || self.encoder.framerate.den == 0 {
            return Err(Error::Config(format!(
                "invalid framerate {}/{}",
                self.encoder.framerate.num, self.encoder.framerate.den
            )));
        }
        if self.port.input_slots == 0 || self.port.output_slots == 0 {
            return Err(Error::Config("ports need at least one slot each way".into()));
        }
        if self.port.poll_timeout_us == 0 || self.port.max_idle_polls == 0 {
            return Err(Error::Config(
                "poll timeout and idle poll budget must be non-zero".into(),
            ));
        }
        if self.input == self.output {
            return Err(Error::Config(format!(
                "output would overwrite input {}",
                self.input.display()
            )));
        }
        Ok(())
    }
}

/// Common benchmark shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preset {
    /// 4K source to 1080p30 at 4 Mbps
    Uhd4kTo1080p30,
    /// 4K60 source to 1080p60 at 6 Mbps
    Uhd4kTo1080p60,
    /// 1080p source to 720p30 at 3 Mbps
    Fhd1080pTo720p30,
}

impl Preset {
    pub const ALL: [Preset; 3] = [
        Preset::Uhd4kTo1080p30,
        Preset::Uhd4kTo1080p60,
        Preset::Fhd1080pTo720p30,
    ];

    /// Target resolution and encoder settings
    pub fn settings(&self) -> (Resolution, EncoderSettings) {
        match self {
            Preset::Uhd4kTo1080p30 => (Resolution::FHD_1080P, EncoderSettings::default()),
            Preset::Uhd4kTo1080p60 => (
                Resolution::FHD_1080P,
                EncoderSettings::default().with_bitrate(6_000_000).with_fps(60),
            ),
            Preset::Fhd1080pTo720p30 => (
                Resolution::HD_720P,
                EncoderSettings::default().with_bitrate(3_000_000),
            ),
        }
    }

    /// Short name used on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Preset::Uhd4kTo1080p30 => "4k-1080p30",
            Preset::Uhd4kTo1080p60 => "4k-1080p60",
            Preset::Fhd1080pTo720p30 => "1080p-720p30",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }
}
