//! Extraction entry points: sequential and parallel frame-chunked paths

use crossbeam_channel::unbounded;
use std::path::Path;
use std::thread;
use tracing::{error, info};

use pose_video_common::{LandmarkFrame, ProcessingError, Result};
use pose_video_decoder::VideoOpener;

use crate::chunk::{plan_chunks, Chunk, DEFAULT_WORKER_COUNT};
use crate::estimator::EstimatorFactory;
use crate::merge::merge_chunk_results;
use crate::worker::{frame_to_image, process_chunk};

/// Options for one extraction job, immutable for the job's lifetime
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Process every `sample_rate`-th frame (1 = every frame)
    pub sample_rate: u32,
    /// Fan out across chunk workers (faster for long videos)
    pub use_parallel: bool,
    /// Requested worker count; the planner clamps it to the hardware
    /// budget and the amount of useful work. `None` uses
    /// [`DEFAULT_WORKER_COUNT`].
    pub worker_count: Option<usize>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            sample_rate: 1,
            use_parallel: false,
            worker_count: None,
        }
    }
}

/// Extract pose landmarks for every sampled frame of a video
///
/// Returns one `LandmarkFrame` per sampled frame, in ascending frame
/// order, regardless of which path (sequential or parallel) produced
/// them.
///
/// # Errors
///
/// `VideoNotFound` before any worker is spawned when the path does not
/// exist; otherwise the first decode or inference failure aborts the
/// whole job (fail-fast, no partial results).
pub fn extract_landmarks(
    video_path: &Path,
    options: &ExtractOptions,
    opener: &dyn VideoOpener,
    factory: &dyn EstimatorFactory,
) -> Result<Vec<LandmarkFrame>> {
    if !video_path.exists() {
        return Err(ProcessingError::VideoNotFound(video_path.to_path_buf()));
    }

    info!(
        "Opening video for processing: {} (parallel={})",
        video_path.display(),
        options.use_parallel
    );

    if options.use_parallel {
        extract_parallel(video_path, options, opener, factory)
    } else {
        extract_sequential(video_path, options, opener, factory)
    }
}

fn extract_sequential(
    video_path: &Path,
    options: &ExtractOptions,
    opener: &dyn VideoOpener,
    factory: &dyn EstimatorFactory,
) -> Result<Vec<LandmarkFrame>> {
    let mut source = opener.open(video_path)?;
    let mut estimator = factory.create()?;
    let sample_rate = u64::from(options.sample_rate.max(1));

    let mut results = Vec::new();
    let mut frames_read = 0u64;

    while let Some(frame) = source.read_frame()? {
        frames_read += 1;
        if !frame.index.is_multiple_of(sample_rate) {
            continue;
        }

        let index = frame.index;
        let time = frame.timestamp;
        let image = frame_to_image(frame)?;
        let landmarks = estimator.infer(&image)?;

        results.push(LandmarkFrame {
            frame: index,
            time,
            landmarks,
        });
    }

    info!(
        "Frame processing finished for {}, frames={}",
        video_path.display(),
        frames_read
    );

    Ok(results)
}

fn extract_parallel(
    video_path: &Path,
    options: &ExtractOptions,
    opener: &dyn VideoOpener,
    factory: &dyn EstimatorFactory,
) -> Result<Vec<LandmarkFrame>> {
    // Probe once for frame count and fps, then release the handle;
    // every worker opens its own.
    let source_info = opener.open(video_path)?.info().clone();

    let requested = options.worker_count.unwrap_or(DEFAULT_WORKER_COUNT);
    let chunks = plan_chunks(source_info.total_frames, requested, options.sample_rate);

    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let seconds_per_chunk = if source_info.fps > 0.0 {
        chunks[0].len() as f64 / source_info.fps
    } else {
        0.0
    };
    info!(
        "Processing video in {} chunks ({:.1} seconds per chunk) with {} workers",
        chunks.len(),
        seconds_per_chunk,
        chunks.len()
    );

    let parts = run_chunks(video_path, &chunks, options.sample_rate, opener, factory)?;

    let merged = merge_chunk_results(parts);
    info!("Parallel processing finished, total results: {}", merged.len());
    Ok(merged)
}

/// Fan chunks out to one worker each and collect their results
///
/// Workers run on scoped threads and report over a channel in whatever
/// order they complete; the returned parts are in completion order and
/// still need [`merge_chunk_results`]. On the first failure the
/// coordinator stops collecting, lets the siblings run out, discards
/// their results, and surfaces that first error.
///
/// # Errors
///
/// The first chunk failure, verbatim.
pub fn run_chunks(
    video_path: &Path,
    chunks: &[Chunk],
    sample_rate: u32,
    opener: &dyn VideoOpener,
    factory: &dyn EstimatorFactory,
) -> Result<Vec<Vec<LandmarkFrame>>> {
    let (tx, rx) = unbounded();
    let mut collected = Vec::with_capacity(chunks.len());
    let mut first_error: Option<ProcessingError> = None;

    thread::scope(|scope| {
        for chunk in chunks {
            let tx = tx.clone();
            scope.spawn(move || {
                let result = run_single_chunk(video_path, chunk, sample_rate, opener, factory);
                // The coordinator may have stopped listening after a
                // sibling failure.
                let _ = tx.send((chunk.worker_id, result));
            });
        }
        drop(tx);

        let mut completed = 0usize;
        for (worker_id, result) in rx.iter() {
            match result {
                Ok(entries) => {
                    completed += 1;
                    info!(
                        "Chunk {}/{} completed, {} frames processed",
                        completed,
                        chunks.len(),
                        entries.len()
                    );
                    collected.push(entries);
                }
                Err(err) => {
                    error!("Chunk {worker_id} failed: {err}");
                    first_error = Some(err);
                    break;
                }
            }
        }
    });

    match first_error {
        Some(err) => Err(err),
        None => Ok(collected),
    }
}

fn run_single_chunk(
    video_path: &Path,
    chunk: &Chunk,
    sample_rate: u32,
    opener: &dyn VideoOpener,
    factory: &dyn EstimatorFactory,
) -> Result<Vec<LandmarkFrame>> {
    let mut source = opener.open(video_path)?;
    let mut estimator = factory.create()?;
    process_chunk(source.as_mut(), estimator.as_mut(), chunk, sample_rate)
}
