//! Chunk planning: disjoint, contiguous, order-covering frame ranges

/// Contiguous range of frame indices assigned to one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub worker_id: usize,
    /// Inclusive
    pub start_frame: u64,
    /// Exclusive
    pub end_frame: u64,
}

impl Chunk {
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end_frame - self.start_frame
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Default requested worker count before clamping
pub const DEFAULT_WORKER_COUNT: usize = 12;

/// Plan chunks using the machine's hardware parallelism
#[must_use]
pub fn plan_chunks(total_frames: u64, requested_workers: usize, sample_rate: u32) -> Vec<Chunk> {
    plan_chunks_with_budget(total_frames, requested_workers, sample_rate, num_cpus::get())
}

/// Plan chunks with an explicit hardware-parallelism budget
///
/// Guarantees: chunks are contiguous, disjoint, and their union is
/// exactly `[0, total_frames)`. The last chunk absorbs any division
/// remainder, so sizes are not perfectly equal for non-exact divisions.
/// Sample-rate filtering happens inside chunk processing, never in
/// chunk boundaries.
#[must_use]
pub fn plan_chunks_with_budget(
    total_frames: u64,
    requested_workers: usize,
    sample_rate: u32,
    cpu_count: usize,
) -> Vec<Chunk> {
    let sample_rate = u64::from(sample_rate.max(1));
    let frames_to_sample = total_frames.div_ceil(sample_rate);

    // Never spawn more workers than available cores (minus one for the
    // coordinator) or than there are sampled frames.
    let mut workers = requested_workers.max(1);
    workers = workers.min(cpu_count.saturating_sub(1).max(1));
    workers = workers.min(usize::try_from(frames_to_sample).unwrap_or(usize::MAX).max(1));

    let frames_per_chunk = (total_frames / workers as u64).max(1);

    let mut chunks = Vec::with_capacity(workers);
    for i in 0..workers {
        let start_frame = i as u64 * frames_per_chunk;
        // Last chunk absorbs any remaining frames.
        let end_frame = if i == workers - 1 {
            total_frames
        } else {
            (i as u64 + 1) * frames_per_chunk
        };

        if start_frame < total_frames {
            chunks.push(Chunk {
                worker_id: i,
                start_frame,
                end_frame,
            });
        }
    }

    chunks
}
