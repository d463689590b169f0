//! End-to-end pipeline drivers
//!
//! Sequences the extraction and rendering crates into complete jobs:
//! plan, fan out, merge, optionally overlay and encode. A render job
//! walks `PLANNING -> EXTRACTING -> MERGING -> OVERLAYING -> ENCODING
//! -> DONE`, with any stage failure transitioning to `FAILED` and
//! best-effort cleanup of intermediates already created. There is no
//! retry state; resubmitting a job is the caller's call.

use crossbeam_channel::unbounded;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{error, info};

use pose_extract_core::{
    extract_landmarks, merge_chunk_results, plan_chunks, run_chunks, EstimatorFactory,
    ExtractOptions, DEFAULT_WORKER_COUNT,
};
use pose_video_common::{LandmarkFrame, ModelComplexity, ProcessingError, Result};
use pose_video_decoder::{FfmpegOpener, VideoOpener};
use pose_video_encoder::{mux_with_audio, MuxConfig, OverlayWriter};
use pose_video_estimation::BlazePoseLandmarkerFactory;
use pose_video_overlay::{render_overlay, OverlayStyle};

/// Render jobs always extract densely; sparse sampling would produce
/// visually choppy overlays. Extraction sample rate and render sample
/// rate are deliberately decoupled.
const RENDER_SAMPLE_RATE: u32 = 1;

/// Stages of a render job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Planning,
    Extracting,
    Merging,
    Overlaying,
    Encoding,
    Done,
    Failed,
}

impl JobStage {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            JobStage::Planning => "planning",
            JobStage::Extracting => "extracting",
            JobStage::Merging => "merging",
            JobStage::Overlaying => "overlaying",
            JobStage::Encoding => "encoding",
            JobStage::Done => "done",
            JobStage::Failed => "failed",
        }
    }

    /// Terminal stages accept no further transitions
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Done | JobStage::Failed)
    }
}

/// Logs stage transitions for one job
struct StageTracker {
    label: String,
    stage: JobStage,
}

impl StageTracker {
    fn new(input: &Path) -> Self {
        info!("[{}] job started: planning", input.display());
        Self {
            label: input.display().to_string(),
            stage: JobStage::Planning,
        }
    }

    fn advance(&mut self, stage: JobStage) {
        info!("[{}] {} -> {}", self.label, self.stage.name(), stage.name());
        self.stage = stage;
    }

    fn fail(&mut self, err: &ProcessingError) {
        error!("[{}] {} -> failed: {}", self.label, self.stage.name(), err);
        self.stage = JobStage::Failed;
    }
}

/// Removes the job-scoped intermediate file on every exit path
struct IntermediateGuard(PathBuf);

impl Drop for IntermediateGuard {
    fn drop(&mut self) {
        if self.0.exists() {
            let _ = fs::remove_file(&self.0);
        }
    }
}

/// Options for one render job
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub model_complexity: ModelComplexity,
    /// Pass `-hwaccel auto` to the encoder
    pub use_hw_accel: bool,
    /// Requested extraction worker count; `None` uses the default
    pub worker_count: Option<usize>,
    /// Fan landmark extraction out across chunk workers
    pub use_parallel: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            model_complexity: ModelComplexity::default(),
            use_hw_accel: true,
            worker_count: None,
            use_parallel: true,
        }
    }
}

/// Extract pose landmarks using the FFmpeg decoder and the BlazePose
/// landmarker
///
/// # Errors
///
/// `VideoNotFound` for a missing input; otherwise the first decode or
/// inference failure (fail-fast).
pub fn extract(
    video_path: &Path,
    options: &ExtractOptions,
    complexity: ModelComplexity,
    model_dir: &Path,
) -> Result<Vec<LandmarkFrame>> {
    let opener = FfmpegOpener;
    let factory = BlazePoseLandmarkerFactory::new(model_dir, complexity);
    extract_landmarks(video_path, options, &opener, &factory)
}

/// Render pose landmarks onto a copy of the input video
///
/// Wires the concrete FFmpeg and BlazePose adapters into
/// [`render_landmarks_video_with`].
///
/// # Errors
///
/// See [`render_landmarks_video_with`].
pub fn render_landmarks_video(
    input: &Path,
    output: Option<&Path>,
    options: &RenderOptions,
    model_dir: &Path,
) -> Result<PathBuf> {
    let opener = FfmpegOpener;
    let factory = BlazePoseLandmarkerFactory::new(model_dir, options.model_complexity);
    render_landmarks_video_with(input, output, options, &opener, &factory)
}

/// Render pose landmarks onto a copy of the input video and return the
/// output path
///
/// Extracts densely (every frame), draws the merged landmark stream onto
/// an intermediate silent video, then transcodes to H.264/AAC with the
/// original audio remuxed in. The intermediate file is deleted whether
/// the job succeeds or fails.
///
/// # Errors
///
/// `VideoNotFound` for a missing input; any stage failure afterwards
/// fails the whole job with the stage's error.
pub fn render_landmarks_video_with(
    input: &Path,
    output: Option<&Path>,
    options: &RenderOptions,
    opener: &dyn VideoOpener,
    factory: &dyn EstimatorFactory,
) -> Result<PathBuf> {
    let mut tracker = StageTracker::new(input);
    let result = run_render(input, output, options, opener, factory, &mut tracker);

    match &result {
        Ok(path) => {
            tracker.advance(JobStage::Done);
            info!("Annotated video ready: {}", path.display());
        }
        Err(err) => tracker.fail(err),
    }

    result
}

fn run_render(
    input: &Path,
    output: Option<&Path>,
    options: &RenderOptions,
    opener: &dyn VideoOpener,
    factory: &dyn EstimatorFactory,
    tracker: &mut StageTracker,
) -> Result<PathBuf> {
    if !input.exists() {
        return Err(ProcessingError::VideoNotFound(input.to_path_buf()));
    }

    let output_path = match output {
        Some(path) => path.to_path_buf(),
        None => default_output_path(input),
    };
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let intermediate = intermediate_path(&output_path);

    let source_info = opener.open(input)?.info().clone();
    let requested = options.worker_count.unwrap_or(DEFAULT_WORKER_COUNT);
    let chunks = plan_chunks(source_info.total_frames, requested, RENDER_SAMPLE_RATE);

    tracker.advance(JobStage::Extracting);
    let parts = if chunks.is_empty() {
        Vec::new()
    } else if options.use_parallel {
        run_chunks(input, &chunks, RENDER_SAMPLE_RATE, opener, factory)?
    } else {
        let sequential = ExtractOptions {
            sample_rate: RENDER_SAMPLE_RATE,
            use_parallel: false,
            worker_count: None,
        };
        vec![extract_landmarks(input, &sequential, opener, factory)?]
    };

    tracker.advance(JobStage::Merging);
    let landmarks = merge_chunk_results(parts);
    info!("Landmarks extraction complete, got {} frames", landmarks.len());

    tracker.advance(JobStage::Overlaying);
    let _guard = IntermediateGuard(intermediate.clone());
    {
        let mut source = opener.open(input)?;
        let mut writer = OverlayWriter::create(
            &intermediate,
            source_info.width,
            source_info.height,
            source_info.fps,
        )?;
        render_overlay(source.as_mut(), &landmarks, &mut writer, &OverlayStyle::default())?;
        writer.finish()?;
    }

    tracker.advance(JobStage::Encoding);
    let mux_config = MuxConfig {
        use_hw_accel: options.use_hw_accel,
    };
    mux_with_audio(&intermediate, input, &output_path, &mux_config)?;

    Ok(output_path)
}

/// `<stem>_landmarks.mp4` beside the input
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "output".to_string(), |s| s.to_string_lossy().into_owned());
    input.with_file_name(format!("{stem}_landmarks.mp4"))
}

/// The job-scoped temp file the overlay stage writes before transcoding
fn intermediate_path(output: &Path) -> PathBuf {
    let mut path = output.as_os_str().to_os_string();
    path.push(".tmp.mp4");
    PathBuf::from(path)
}

/// Extract landmarks for several videos concurrently
///
/// One video per worker, each processed sequentially inside (no nested
/// parallelism), at most one worker per core. Failures are reported per
/// video instead of failing the batch; results keep the input order.
pub fn extract_landmarks_many(
    video_paths: &[PathBuf],
    sample_rate: u32,
    complexity: ModelComplexity,
    model_dir: &Path,
) -> Vec<(PathBuf, Result<Vec<LandmarkFrame>>)> {
    let opener = FfmpegOpener;
    let factory = BlazePoseLandmarkerFactory::new(model_dir, complexity);
    let options = ExtractOptions {
        sample_rate,
        use_parallel: false,
        worker_count: None,
    };

    let worker_limit = num_cpus::get().min(video_paths.len()).max(1);
    info!(
        "Processing {} videos with {} workers",
        video_paths.len(),
        worker_limit
    );

    let (job_tx, job_rx) = unbounded::<(usize, &Path)>();
    let (result_tx, result_rx) = unbounded();

    let mut slots: Vec<Option<Result<Vec<LandmarkFrame>>>> =
        (0..video_paths.len()).map(|_| None).collect();

    thread::scope(|scope| {
        for (idx, path) in video_paths.iter().enumerate() {
            // Queue never blocks; workers drain it as they free up.
            let _ = job_tx.send((idx, path.as_path()));
        }
        drop(job_tx);

        for _ in 0..worker_limit {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let options = &options;
            let opener = &opener;
            let factory = &factory;
            scope.spawn(move || {
                for (idx, path) in job_rx.iter() {
                    let result = extract_landmarks(path, options, opener, factory);
                    let _ = result_tx.send((idx, result));
                }
            });
        }
        drop(result_tx);

        for (idx, result) in result_rx.iter() {
            match &result {
                Ok(entries) => info!(
                    "Completed processing: {} ({} entries)",
                    video_paths[idx].display(),
                    entries.len()
                ),
                Err(err) => error!(
                    "Error processing video {}: {}",
                    video_paths[idx].display(),
                    err
                ),
            }
            slots[idx] = Some(result);
        }
    });

    video_paths
        .iter()
        .cloned()
        .zip(slots.into_iter().map(|slot| {
            slot.unwrap_or_else(|| Err(ProcessingError::Other("worker did not report".to_string())))
        }))
        .collect()
}
