use std::path::PathBuf;
use clap::{Args, Parser, Subcommand};
use safety_monitor::data::MonitorConfig;

#[derive(Parser)]
#[command(name = "safety_monitor", version, about = "Hazard detection and automatic machine stop")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ConfigArg {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the monitor over the camera, a video or a directory of frames
    Run {
        #[command(flatten)]
        config: ConfigArg,
        /// Fallback video used when the camera is unavailable
        #[arg(long)]
        input: Option<String>,
        #[arg(long)]
        camera_index: Option<i32>,
        #[arg(long)]
        event_log: Option<String>,
        #[arg(long)]
        output_video: Option<String>,
        /// Read frames from this directory instead of a camera or video
        #[arg(long)]
        frames_dir: Option<String>,
        /// ONNX model weights
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        max_frames: Option<u64>,
    },
    /// Serve the web dashboard
    Dashboard {
        #[command(flatten)]
        config: ConfigArg,
        #[arg(long)]
        bind: Option<String>,
    },
    /// Check that the configured source delivers frames
    Probe {
        #[command(flatten)]
        config: ConfigArg,
        #[arg(long, default_value_t = 30)]
        frames: u64,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Run { config, input, camera_index, event_log, output_video, frames_dir, model, max_frames } => {
            let mut config = MonitorConfig::load(config.config.as_deref())?;
            if let Some(input) = input {
                config.source.fallback_video = input;
            }
            if let Some(index) = camera_index {
                config.source.camera_index = index;
            }
            if let Some(path) = event_log {
                config.output.event_log = path;
            }
            if let Some(path) = output_video {
                config.output.video_path = path;
            }
            if frames_dir.is_some() {
                config.source.frames_dir = frames_dir;
            }
            if let Some(weights) = model {
                config.model.weights_path = weights;
            }
            if max_frames.is_some() {
                config.source.max_frames = max_frames;
            }

            safety_monitor::run_monitor(&config)?;
        }
        Command::Dashboard { config, bind } => {
            let mut config = MonitorConfig::load(config.config.as_deref())?;
            if let Some(bind) = bind {
                config.dashboard.bind = bind;
            }

            let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
            runtime.block_on(safety_monitor::dashboard::serve(config))?;
        }
        Command::Probe { config, frames } => {
            let config = MonitorConfig::load(config.config.as_deref())?;
            let report = safety_monitor::probe_source(&config, frames)?;
            match report.resolution {
                Some((w, h)) => log::info!("{}: read {} frames at {}x{}", report.source, report.frames, w, h),
                None => log::warn!("{}: no frames could be read", report.source),
            }
        }
    }

    Ok(())
}
