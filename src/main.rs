//! CLI entry point for the acquisition engine.

use std::path::PathBuf;
use std::sync::Arc;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::Parser;
use tracing::{info, warn};

use meteorwatch::analysis_sink::NullAnalysisSink;
use meteorwatch::capture::{CaptureSource, FormatDescriptor, SimulatedCaptureSource, V4lCaptureSource};
use meteorwatch::config::Config;
use meteorwatch::error::{CaptureError, CaptureResult};
use meteorwatch::pipeline::AcquisitionPipeline;

#[derive(Parser, Debug)]
#[command(author, version, about = "Continuous video-surveillance acquisition engine", long_about = None)]
struct CliArgs {
    /// Path to a TOML configuration file; falls back to built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// V4L2 device path, e.g. /dev/video0. Ignored with `--simulate`.
    #[arg(long, default_value = "/dev/video0")]
    device: String,

    /// Run against an in-memory synthetic capture source instead of real
    /// hardware; useful for smoke-testing the pipeline without a camera.
    #[arg(long)]
    simulate: bool,

    /// Force headless mode (no annotated frame buffer), overriding config.
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = CliArgs::parse();
    let mut config = (*Config::load(args.config.as_deref())?).clone();
    if args.headless {
        config.headless = true;
    }
    let config = Arc::new(config);

    let sink = Arc::new(NullAnalysisSink);

    if args.simulate {
        info!("starting pipeline against a simulated capture source");
        let capture = SimulatedCaptureSource::new(config.width, config.height, config.buffer_count as usize, 33_333);
        run_and_wait(config, capture, sink).await?;
    } else {
        info!(device = %args.device, "starting pipeline against a V4L2 device");
        let format = FormatDescriptor {
            width: config.width,
            height: config.height,
            pixel_format: config.pixel_format,
            buffer_count: config.buffer_count,
        };
        let capture = open_v4l_device(&args.device, format)?;
        run_and_wait(config, capture, sink).await?;
    }

    Ok(())
}

/// Opens and formats a V4L2 device. In a fuller deployment this step
/// belongs to a separate enumeration component (§1 Non-goals); this is
/// the minimal inline stand-in needed to get a runnable binary.
fn open_v4l_device(path: &str, format: FormatDescriptor) -> CaptureResult<V4lCaptureSource> {
    use v4l::video::Capture;

    let fourcc = match format.pixel_format {
        meteorwatch::config::PixelFormat::Grey => v4l::FourCC::new(b"GREY"),
        meteorwatch::config::PixelFormat::Yuyv => v4l::FourCC::new(b"YUYV"),
        meteorwatch::config::PixelFormat::Mjpeg => v4l::FourCC::new(b"MJPG"),
    };

    let mut device = v4l::Device::with_path(path)
        .map_err(|e| CaptureError::DeviceBusy(format!("{path}: {e}")))?;

    let mut dev_format = device
        .format()
        .map_err(|e| CaptureError::UnsupportedFormat(e.to_string()))?;
    dev_format.width = format.width as u32;
    dev_format.height = format.height as u32;
    dev_format.fourcc = fourcc;
    device
        .set_format(&dev_format)
        .map_err(|e| CaptureError::UnsupportedFormat(e.to_string()))?;

    V4lCaptureSource::open(device, format)
}

async fn run_and_wait<C: CaptureSource + Send + 'static>(
    config: Arc<Config>,
    capture: C,
    sink: Arc<dyn meteorwatch::analysis_sink::AnalysisSink>,
) -> anyhow::Result<()> {
    let pipeline = AcquisitionPipeline::new(config, capture, sink);
    let (handle, mut observers) = pipeline.run();

    tokio::spawn(async move {
        // Drains the observer mailboxes so they never silently overflow; a
        // real deployment would forward these to a UI or logger instead.
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(100));
        loop {
            ticker.tick().await;
            while observers.frames.pop().is_some() {}
            while observers.stats.pop().is_some() {}
            while observers.clip_events.pop().is_some() {}
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, stopping capture loop");
    handle.stop();
    handle.join().await;
    warn!("pipeline stopped");
    Ok(())
}
