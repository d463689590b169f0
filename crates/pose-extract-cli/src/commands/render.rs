//! Render subcommand - annotated video output

use anyhow::{Context as _, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use pose_video_common::ModelComplexity;
use pose_video_pipeline::RenderOptions;

#[derive(Args)]
pub struct RenderCommand {
    /// Input video file path
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output path (defaults to <stem>_landmarks.mp4 beside the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Model complexity (0 = lite, 1 = full, 2 = heavy)
    #[arg(long, default_value = "1")]
    model_complexity: u8,

    /// Disable hardware acceleration in the encoder
    #[arg(long, default_value = "false")]
    no_hw_accel: bool,

    /// Worker count for the extraction pass
    #[arg(long)]
    workers: Option<usize>,

    /// Extract landmarks sequentially instead of in parallel
    #[arg(long, default_value = "false")]
    sequential: bool,

    /// Directory containing the pose landmark ONNX models
    #[arg(long, default_value = "models/pose-landmark")]
    model_dir: PathBuf,
}

impl RenderCommand {
    pub fn execute(self) -> Result<()> {
        let start = Instant::now();

        if !self.input.exists() {
            anyhow::bail!("Input file does not exist: {}", self.input.display());
        }

        let complexity = ModelComplexity::from_level(self.model_complexity)
            .context("model complexity must be 0, 1, or 2")?;

        let options = RenderOptions {
            model_complexity: complexity,
            use_hw_accel: !self.no_hw_accel,
            worker_count: self.workers,
            use_parallel: !self.sequential,
        };

        let output_path = pose_video_pipeline::render_landmarks_video(
            &self.input,
            self.output.as_deref(),
            &options,
            &self.model_dir,
        )
        .with_context(|| format!("Failed to render {}", self.input.display()))?;

        println!("Annotated video written to {}", output_path.display());
        info!("Render finished in {:.2?}", start.elapsed());
        Ok(())
    }
}
