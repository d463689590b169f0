//! Result merging: restore global frame order from per-chunk results

use pose_video_common::LandmarkFrame;

/// Concatenate per-chunk results (in whatever order they completed) and
/// restore global frame-index order
///
/// The sort is stable, so equal frame indices would stay deterministic;
/// disjoint chunk ranges mean equal indices cannot actually occur.
#[must_use]
pub fn merge_chunk_results(chunk_results: Vec<Vec<LandmarkFrame>>) -> Vec<LandmarkFrame> {
    let total: usize = chunk_results.iter().map(Vec::len).sum();
    let mut merged = Vec::with_capacity(total);
    for part in chunk_results {
        merged.extend(part);
    }
    merged.sort_by_key(|entry| entry.frame);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(frame: u64) -> LandmarkFrame {
        LandmarkFrame {
            frame,
            time: frame as f64 / 30.0,
            landmarks: None,
        }
    }

    #[test]
    fn test_merge_restores_frame_order() {
        // Chunks arrive in completion order, not worker order.
        let parts = vec![
            vec![entry(6), entry(7), entry(8)],
            vec![entry(0), entry(1), entry(2)],
            vec![entry(3), entry(4), entry(5)],
        ];

        let merged = merge_chunk_results(parts);
        let frames: Vec<u64> = merged.iter().map(|e| e.frame).collect();
        assert_eq!(frames, (0..9).collect::<Vec<u64>>());
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge_chunk_results(Vec::new()).is_empty());
        assert!(merge_chunk_results(vec![Vec::new(), Vec::new()]).is_empty());
    }

    #[test]
    fn test_merge_sampled_chunks() {
        let parts = vec![
            vec![entry(4), entry(6)],
            vec![entry(0), entry(2)],
            vec![entry(8)],
        ];

        let merged = merge_chunk_results(parts);
        let frames: Vec<u64> = merged.iter().map(|e| e.frame).collect();
        assert_eq!(frames, vec![0, 2, 4, 6, 8]);
    }
}
