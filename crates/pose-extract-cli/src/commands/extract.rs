//! Extract subcommand - landmarks to JSON

use anyhow::{Context as _, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use pose_extract_core::ExtractOptions;
use pose_video_common::ModelComplexity;

#[derive(Args)]
pub struct ExtractCommand {
    /// Input video file path
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Process every Nth frame (1 = every frame)
    #[arg(long, default_value = "1")]
    sample_rate: u32,

    /// Fan extraction out across parallel chunk workers
    #[arg(long, default_value = "false")]
    parallel: bool,

    /// Worker count (clamped to hardware and available work)
    #[arg(long)]
    workers: Option<usize>,

    /// Model complexity (0 = lite, 1 = full, 2 = heavy)
    #[arg(long, default_value = "1")]
    model_complexity: u8,

    /// Directory containing the pose landmark ONNX models
    #[arg(long, default_value = "models/pose-landmark")]
    model_dir: PathBuf,

    /// Write JSON to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl ExtractCommand {
    pub fn execute(self) -> Result<()> {
        let start = Instant::now();

        if !self.input.exists() {
            anyhow::bail!("Input file does not exist: {}", self.input.display());
        }

        let complexity = ModelComplexity::from_level(self.model_complexity)
            .context("model complexity must be 0, 1, or 2")?;

        let options = ExtractOptions {
            sample_rate: self.sample_rate.max(1),
            use_parallel: self.parallel,
            worker_count: self.workers,
        };

        let landmarks =
            pose_video_pipeline::extract(&self.input, &options, complexity, &self.model_dir)
                .with_context(|| format!("Failed to process {}", self.input.display()))?;

        let json = serde_json::to_string_pretty(&landmarks)?;
        match &self.output {
            Some(path) => {
                std::fs::write(path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!(
                    "Wrote {} landmark entries to {}",
                    landmarks.len(),
                    path.display()
                );
            }
            None => println!("{json}"),
        }

        info!("Extraction finished in {:.2?}", start.elapsed());
        Ok(())
    }
}
