//! Core parallel frame-chunked landmark extraction
//!
//! This crate implements the pipeline's hard part: partitioning a
//! video's frames into disjoint contiguous chunks, fanning the chunks
//! out to isolated workers (each owning a private decode handle and a
//! private inference session), and deterministically resequencing the
//! out-of-order completions into one frame-ordered landmark stream.
//!
//! The pose-inference capability is injected through the
//! [`PoseEstimator`]/[`EstimatorFactory`] seams; video access is
//! injected through `pose_video_decoder::VideoOpener`. Concrete
//! adapters live in their own crates.

pub mod chunk;
pub mod estimator;
pub mod extract;
pub mod merge;
pub mod worker;

pub use chunk::{plan_chunks, plan_chunks_with_budget, Chunk, DEFAULT_WORKER_COUNT};
pub use estimator::{EstimatorFactory, PoseEstimator};
pub use extract::{extract_landmarks, run_chunks, ExtractOptions};
pub use merge::merge_chunk_results;
pub use worker::process_chunk;
