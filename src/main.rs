use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use icon_mosaic::config::{MosaicConfig, DEFAULT_COLUMN_COUNT};
use icon_mosaic::core::pipeline::encode_video;
use icon_mosaic::core::preview::{preview_middle_frame, thumbnail, PREVIEW_MAX_SIZE};
use icon_mosaic::decoder::probe::probe_video;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Worker threads for per-frame processing
    #[arg(long, global = true, default_value_t = num_cpus::get())]
    threads: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn a whole video into an icon mosaic video
    Render {
        #[arg(long)]
        video: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        mosaic: MosaicArgs,
        /// Output frame rate
        #[arg(long)]
        fps: Option<u32>,
    },
    /// Render the middle frame of a video to an image
    Preview {
        #[arg(long)]
        video: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        mosaic: MosaicArgs,
        /// Longest edge of the saved preview, 0 keeps full size
        #[arg(long, default_value_t = PREVIEW_MAX_SIZE)]
        max_size: u32,
    },
    /// Print resolution, frame rate and frame count of a video
    Probe {
        #[arg(long)]
        video: PathBuf,
    },
}

#[derive(Args)]
struct MosaicArgs {
    /// JSON file with icon_paths, thresholds, column_count, output_fps
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Icon image, one per brightness level, darkest first
    #[arg(short, long = "icon")]
    icons: Vec<PathBuf>,
    /// Brightness threshold (0-255), one per icon
    #[arg(short, long = "threshold")]
    thresholds: Vec<u8>,
    /// Grid columns across the frame width
    #[arg(short = 'g', long)]
    columns: Option<u32>,
}

impl MosaicArgs {
    /// Config file first, then any flags given on the command line.
    fn resolve(&self) -> Result<MosaicConfig> {
        let mut config = match &self.config {
            Some(path) => MosaicConfig::from_json_file(path)?,
            None => MosaicConfig::new(Vec::new(), DEFAULT_COLUMN_COUNT),
        };
        if !self.icons.is_empty() {
            let thresholds = if self.thresholds.is_empty() {
                MosaicConfig::new(self.icons.clone(), config.column_count).thresholds
            } else {
                self.thresholds.clone()
            };
            config.icon_paths = self.icons.clone();
            config.thresholds = thresholds;
        } else if !self.thresholds.is_empty() {
            config.thresholds = self.thresholds.clone();
        }
        if let Some(columns) = self.columns {
            config.column_count = columns;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads.max(1))
        .build_global()
        .context("Failed to configure worker threads")?;

    match &cli.command {
        Commands::Render { video, output, mosaic, fps } => {
            let mut config = mosaic.resolve()?;
            if let Some(fps) = fps {
                config.output_fps = *fps;
            }
            render(video, output, &config)?;
        }
        Commands::Preview { video, output, mosaic, max_size } => {
            let config = mosaic.resolve()?;
            preview(video, output, &config, *max_size)?;
        }
        Commands::Probe { video } => {
            let info = probe_video(video)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
    }

    Ok(())
}

fn render(video: &Path, output: &Path, config: &MosaicConfig) -> Result<()> {
    let running = Arc::new(AtomicBool::new(false));
    let cancel = Arc::clone(&running);
    ctrlc::set_handler(move || {
        cancel.store(true, Ordering::SeqCst);
        eprintln!("\nInterrupted, finishing the frames encoded so far...");
    })
    .context("Error registering Ctrl-C handler")?;

    let report = encode_video(video, output, config, Some(running))
        .with_context(|| format!("Failed to render {}", video.display()))?;

    println!(
        "{} frames written to {} in {:.1?}",
        report.frames_written,
        output.display(),
        report.elapsed
    );
    if let Some(err) = &report.decode_error {
        log::warn!("source ended early: {}", err);
    }
    Ok(())
}

fn preview(video: &Path, output: &Path, config: &MosaicConfig, max_size: u32) -> Result<()> {
    let frame = preview_middle_frame(video, config)
        .with_context(|| format!("Failed to preview {}", video.display()))?;
    let max_size = if max_size == 0 { u32::MAX } else { max_size };
    let image = thumbnail(frame, max_size)?;
    image
        .save(output)
        .with_context(|| format!("Failed to save preview to {}", output.display()))?;
    println!(
        "Preview {}x{} saved to {}",
        image.width(),
        image.height(),
        output.display()
    );
    Ok(())
}
