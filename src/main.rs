mod capture;
mod composite;
mod controls;
mod error;
mod output;
mod pipeline;
mod segmentation;

use anyhow::{Context, Result};
use capture::{CaptureConstraints, CaptureSource, WebcamCapture};
use clap::Parser;
use composite::{BlurLevel, CompositeMode, CompositeParameters};
use controls::Controls;
use output::{BackdropLibrary, OutputSink, V4L2Output};
use pipeline::Pipeline;
use segmentation::{ModelType, Runtime, SegmenterConfig, SelfieSegmenterFactory};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Capture and output width
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Capture and output height
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Target frames per second
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..=240))]
    fps: u32,

    /// Path to the selfie segmentation model (ONNX file)
    #[arg(long)]
    model: PathBuf,

    /// Selfie segmentation variant
    #[arg(long, value_enum, default_value_t = ModelType::General)]
    model_type: ModelType,

    /// Execution provider for inference
    #[arg(long, value_enum, default_value_t = Runtime::Cpu)]
    runtime: Runtime,

    /// Directory holding bg<ID>.jpg background images
    #[arg(long, default_value = "assets")]
    assets_dir: PathBuf,

    /// Start in background-image mode with this image
    #[arg(long, value_name = "ID")]
    background: Option<u32>,

    /// Initial blur level
    #[arg(long, value_enum, default_value_t = BlurLevel::None)]
    blur: BlurLevel,

    /// Person probability at which a pixel counts as foreground
    #[arg(long, default_value_t = 0.5, value_parser = parse_threshold)]
    foreground_threshold: f32,

    /// Softening applied across the person outline
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(0..=64))]
    edge_blur: u32,

    /// Show matte visualization (grayscale silhouette) instead of the composite
    #[arg(long)]
    show_matte: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn parse_threshold(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is not in [0, 1]"))
    }
}

impl Args {
    fn initial_params(&self) -> CompositeParameters {
        let (mode, background_image_id) = match self.background {
            Some(id) => (CompositeMode::Image, Some(id)),
            None => (CompositeMode::Blur, None),
        };
        CompositeParameters {
            mode,
            blur_amount: self.blur.amount(),
            foreground_threshold: self.foreground_threshold,
            edge_blur_amount: self.edge_blur,
            background_image_id,
        }
    }
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!("Failed to start runtime: {}", err);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(run(args));
    // A pending stdin read must not hold up exit
    runtime.shutdown_timeout(Duration::from_millis(100));

    if let Err(err) = result {
        tracing::error!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    tracing::info!("Camola bokeh starting");
    tracing::info!("Surface: {}x{} @ {}fps", args.width, args.height, args.fps);

    let constraints = CaptureConstraints {
        frame_rate: args.fps,
        width: args.width,
        height: args.height,
    };

    let capture = WebcamCapture::acquire(args.input_device, constraints)
        .context("Failed to initialize webcam capture")?;
    let (capture_width, capture_height) = capture.resolution();
    tracing::info!("Capture: {}x{}", capture_width, capture_height);

    let output = V4L2Output::new(&args.output_device, args.width, args.height)
        .context("Failed to initialize v4l2loopback output")?;
    let (output_width, output_height) = output.resolution();
    tracing::info!("Output: {}x{}", output_width, output_height);

    let segmenter_config = SegmenterConfig {
        runtime: args.runtime,
        model_asset_path: args.model.clone(),
        model_type: args.model_type,
    };

    let controls = Controls::new(args.initial_params());
    tracing::info!("Initial parameters: {:?}", controls.current().params);
    let backdrops = BackdropLibrary::new(&args.assets_dir, args.width, args.height);

    let mut pipeline = Pipeline::new(
        capture,
        output,
        Arc::new(SelfieSegmenterFactory),
        segmenter_config,
        backdrops,
        controls.subscribe(),
        (args.width, args.height),
        args.fps,
    )
    .with_show_matte(args.show_matte);

    tracing::info!("Commands: none | low | med | high | bg <id> | quit (Ctrl+C also stops)");

    let driver = pipeline.run(controls.stop_signal());
    tokio::pin!(driver);
    let commands = controls.run_commands(BufReader::new(tokio::io::stdin()));
    tokio::pin!(commands);
    let mut commands_done = false;

    loop {
        tokio::select! {
            result = &mut driver => return result,
            result = &mut commands, if !commands_done => {
                commands_done = true;
                if let Err(err) = result {
                    tracing::warn!("Command input closed: {:#}", err);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping");
                controls.stop();
            }
        }
    }
}
