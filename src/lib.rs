//! codecbench: pipelined decode/scale/encode benchmark
//!
//! Measures how long a clip takes to decode, resize and re-encode through
//! buffer-queue codec ports, the way a hardware media codec is driven.
//!
//! # Features
//!
//! - **Codec ports**: slot-based asynchronous coder model with bounded polls
//! - **Scaling**: deterministic fixed-point bilinear resampling
//! - **Reporting**: per-stage monotonic timings and a serializable summary
//!
//! # Example
//!
//! ```rust,no_run
//! use codecbench::{CancelToken, PipelineBuilder};
//!
//! fn main() -> codecbench::Result<()> {
//!     let mut pipeline = PipelineBuilder::new()
//!         .input("4k_input.cbv")
//!         .output("output_1080p.cbv")
//!         .target(1920, 1080)
//!         .build()?;
//!
//!     let report = pipeline.run(&CancelToken::new(), &())?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod codec;
pub mod config;
pub mod container;
pub mod error;
pub mod pipeline;
pub mod processing;
pub mod report;
pub mod status;
pub mod synth;
pub mod types;

// Re-exports for convenience
pub use buffer::FrameBuffer;
pub use codec::{Codec, CodecPort, CodecProvider, Direction, MediaFormat, SoftwareProvider};
pub use config::{BenchmarkConfig, EncoderSettings, PortConfig, Preset};
pub use error::{Error, ErrorKind, Result};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineHandle};
pub use processing::{CpuScaler, ScalerStage};
pub use report::{BenchmarkReport, Stage, StageTiming};
pub use status::{CancelToken, StatusEvent, StatusListener};
pub use synth::SyntheticClip;
pub use types::{Framerate, PixelFormat, Resolution};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
