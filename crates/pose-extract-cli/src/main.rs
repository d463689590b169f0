//! Pose Extract CLI - landmark extraction and annotated rendering
//!
//! Command-line interface over the frame-chunked pose pipeline.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::extract::ExtractCommand;
use commands::render::RenderCommand;

#[derive(Parser)]
#[command(
    name = "pose-extract",
    version,
    about = "Per-frame body-pose landmark extraction and annotated video rendering",
    long_about = "Extract per-frame body-pose landmarks from a video, or render the\n\
                  landmarks back onto a copy of the video as a browser-playable MP4.\n\n\
                  Extraction partitions the video's frames into contiguous chunks and\n\
                  processes them on parallel workers, each with its own decoder and\n\
                  inference session; results are merged back into frame order.",
    after_help = "EXAMPLES:\n  \
                  # Extract landmarks for every frame, print JSON\n  \
                  pose-extract extract video.mp4\n\n  \
                  # Sample every 5th frame across 8 workers\n  \
                  pose-extract extract --sample-rate 5 --parallel --workers 8 video.mp4\n\n  \
                  # Render the annotated video next to the input\n  \
                  pose-extract render video.mp4\n\n  \
                  # Render with the heavy model to an explicit path\n  \
                  pose-extract render --model-complexity 2 -o annotated.mp4 video.mp4"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract per-frame pose landmarks as JSON
    Extract(ExtractCommand),

    /// Render landmarks onto a copy of the video
    Render(RenderCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Extract(cmd) => cmd.execute(),
        Commands::Render(cmd) => cmd.execute(),
    }
}
