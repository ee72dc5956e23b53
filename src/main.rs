//! codecbench CLI
//!
//! Generates synthetic clips and runs the transcode benchmark on them.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use codecbench::{
    codec::{probe, Codec},
    BenchmarkConfig, PipelineBuilder, PixelFormat, Preset, Resolution, SoftwareProvider,
    StatusEvent, SyntheticClip,
};
use std::path::PathBuf;

/// Raw layout for generated clips
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum Layout {
    #[default]
    Nv12,
    I420,
    Rgba,
    Bgra,
}

impl From<Layout> for PixelFormat {
    fn from(l: Layout) -> Self {
        match l {
            Layout::Nv12 => PixelFormat::Nv12,
            Layout::I420 => PixelFormat::Yuv420p,
            Layout::Rgba => PixelFormat::Rgba,
            Layout::Bgra => PixelFormat::Bgra,
        }
    }
}

#[derive(Parser)]
#[command(name = "codecbench")]
#[command(about = "Decode, resize and re-encode a clip, timing each stage")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show codec provider capabilities
    Info,

    /// Write a synthetic letter-frame clip
    Generate {
        /// Output clip path
        #[arg(short, long, default_value = "4k_input.cbv")]
        output: PathBuf,

        /// Resolution (e.g., 3840x2160)
        #[arg(short, long, default_value = "3840x2160")]
        resolution: String,

        /// Number of frames
        #[arg(short, long, default_value = "10")]
        frames: usize,

        /// Framerate
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Raw pixel layout
        #[arg(short, long, value_enum, default_value = "nv12")]
        layout: Layout,
    },

    /// Run the decode/resize/encode benchmark
    Run {
        /// TOML configuration file; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Source clip
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Encoded artifact (always overwritten)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Target resolution (e.g., 1920x1080)
        #[arg(short, long)]
        resolution: Option<String>,

        /// Use preset instead of manual settings
        #[arg(short, long)]
        preset: Option<String>,

        /// Output codec
        #[arg(long)]
        codec: Option<String>,

        /// Write the report summary as TOML
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List available presets
    Presets,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("codecbench=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info => cmd_info(),
        Commands::Generate {
            output,
            resolution,
            frames,
            fps,
            layout,
        } => cmd_generate(output, resolution, frames, fps, layout),
        Commands::Run {
            config,
            input,
            output,
            resolution,
            preset,
            codec,
            report,
        } => {
            let config = build_config(config, input, output, resolution, preset, codec)?;
            cmd_run(config, report).await
        }
        Commands::Presets => cmd_presets(),
    }
}

fn cmd_info() -> anyhow::Result<()> {
    println!("codecbench {}", codecbench::VERSION);
    println!("==============\n");

    let info = probe(&SoftwareProvider, Resolution::UHD_4K);
    println!("=== Provider: {} ===", info.name);
    for codec in Codec::ALL {
        let dec = info.decoders.contains(&codec);
        let enc = info.encoders.contains(&codec);
        println!(
            "  {:<16} {:<10} decode: {:<3}  encode: {}",
            codec.display_name(),
            codec.mime(),
            if dec { "Yes" } else { "No" },
            if enc { "Yes" } else { "No" }
        );
    }

    Ok(())
}

fn cmd_generate(
    output: PathBuf,
    resolution: String,
    frames: usize,
    fps: u32,
    layout: Layout,
) -> anyhow::Result<()> {
    let resolution = Resolution::parse(&resolution)
        .with_context(|| format!("invalid resolution '{}'", resolution))?;

    let clip = SyntheticClip::new(resolution, frames)
        .with_framerate(codecbench::Framerate::new(fps, 1))
        .with_pixel_format(layout.into());
    let bytes = clip.write(&output)?;

    println!(
        "Wrote {} frames of {} {} to {} ({} bytes)",
        frames,
        resolution,
        clip.pixel_format,
        output.display(),
        bytes
    );
    Ok(())
}

fn build_config(
    path: Option<PathBuf>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    resolution: Option<String>,
    preset: Option<String>,
    codec: Option<String>,
) -> anyhow::Result<BenchmarkConfig> {
    let mut config = match path {
        Some(path) => BenchmarkConfig::from_toml_file(&path)?,
        None => BenchmarkConfig::default(),
    };

    // Apply preset if specified
    if let Some(name) = preset {
        let preset = Preset::parse(&name).with_context(|| {
            format!(
                "unknown preset '{}'; use 'codecbench presets' to see available",
                name
            )
        })?;
        config = config.with_preset(preset);
    }

    if let Some(input) = input {
        config.input = input;
    }
    if let Some(output) = output {
        config.output = output;
    }
    if let Some(res) = resolution {
        config.target =
            Resolution::parse(&res).with_context(|| format!("invalid resolution '{}'", res))?;
    }
    if let Some(name) = codec {
        config.encoder.codec =
            Codec::parse(&name).with_context(|| format!("unknown codec '{}'", name))?;
    }

    config.validate()?;
    Ok(config)
}

async fn cmd_run(config: BenchmarkConfig, report_path: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Configuration:");
    println!("  Input:  {}", config.input.display());
    println!("  Output: {}", config.output.display());
    println!("  Target: {}", config.target);
    println!("  Codec:  {}", config.encoder.codec);
    println!();

    let pipeline = PipelineBuilder::new().config(config).build()?;
    let handle = pipeline.spawn()?;
    let cancel = handle.cancel_token().clone();
    let events = handle.events().clone();

    let printer = tokio::task::spawn_blocking(move || {
        for event in events.iter() {
            let terminal = event.is_terminal();
            print_event(&event);
            if terminal {
                break;
            }
        }
    });
    let mut join = tokio::task::spawn_blocking(move || handle.join());

    println!("Running. Press Ctrl+C to cancel.\n");

    let result = tokio::select! {
        res = &mut join => res?,
        _ = tokio::signal::ctrl_c() => {
            println!("\nCancelling after the current stage...");
            cancel.cancel();
            join.await?
        }
    };
    printer.await?;

    let report = result?;
    println!("\n{}", report);

    if let Some(path) = report_path {
        let text = toml::to_string_pretty(&report.summary())?;
        std::fs::write(&path, text)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}

fn print_event(event: &StatusEvent) {
    match event {
        StatusEvent::StageStarted(stage) => println!("  {} ...", stage),
        StatusEvent::StageFinished { stage, elapsed } => {
            println!("  {} done in {:.2} ms", stage, elapsed.as_secs_f64() * 1000.0)
        }
        StatusEvent::Completed(_) => println!("  complete"),
        StatusEvent::Failed {
            stage,
            kind,
            message,
        } => match stage {
            Some(stage) => eprintln!("  {} failed ({}): {}", stage, kind, message),
            None => eprintln!("  failed ({}): {}", kind, message),
        },
    }
}

fn cmd_presets() -> anyhow::Result<()> {
    println!("Available Presets");
    println!("=================\n");

    for preset in Preset::ALL {
        let (target, encoder) = preset.settings();
        println!(
            "  {:<14} {} @ {}, {}, {} Mbps",
            preset.name(),
            target,
            encoder.framerate,
            encoder.codec,
            encoder.bitrate / 1_000_000
        );
    }

    println!("\nUsage: codecbench run --preset <name>");

    Ok(())
}
