//! Chunk worker: seek once, then read and infer strictly sequentially

use image::RgbImage;
use tracing::debug;

use pose_video_common::{LandmarkFrame, ProcessingError, Result};
use pose_video_decoder::{Frame, FrameSource};

use crate::chunk::Chunk;
use crate::estimator::PoseEstimator;

/// Process one chunk end-to-end
///
/// Returns landmark records for exactly the frames in
/// `[chunk.start_frame, chunk.end_frame)` whose index is divisible by
/// `sample_rate`, in ascending frame order. The source is positioned
/// once at the chunk start and then read sequentially; frames that do
/// not match the sample rate are read (to keep the stream position
/// advancing) but never passed to inference. The stream ending before
/// `end_frame` is tolerated as a normal short chunk.
///
/// # Errors
///
/// Any decode or inference failure aborts the chunk; the caller's
/// fail-fast policy turns that into a whole-job failure.
pub fn process_chunk(
    source: &mut dyn FrameSource,
    estimator: &mut dyn PoseEstimator,
    chunk: &Chunk,
    sample_rate: u32,
) -> Result<Vec<LandmarkFrame>> {
    let sample_rate = u64::from(sample_rate.max(1));

    if chunk.start_frame > 0 {
        source.seek_to_frame(chunk.start_frame)?;
    }

    let expected = chunk.len().div_ceil(sample_rate);
    let mut results = Vec::with_capacity(usize::try_from(expected).unwrap_or(0));

    while let Some(frame) = source.read_frame()? {
        if frame.index >= chunk.end_frame {
            break;
        }
        if frame.index < chunk.start_frame {
            continue;
        }
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

    debug!(
        "Chunk {} [{}, {}) produced {} entries",
        chunk.worker_id,
        chunk.start_frame,
        chunk.end_frame,
        results.len()
    );

    Ok(results)
}

/// Reinterpret a decoded RGB24 frame as an image buffer
pub(crate) fn frame_to_image(frame: Frame) -> Result<RgbImage> {
    let width = frame.width;
    let height = frame.height;
    RgbImage::from_raw(width, height, frame.data).ok_or_else(|| {
        ProcessingError::ImageError(format!(
            "frame buffer does not match {width}x{height} RGB24 layout"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pose_video_common::{Landmark, VideoInfo};
    use std::path::PathBuf;

    /// Frame source producing flat synthetic frames for [0, end)
    struct SyntheticSource {
        info: VideoInfo,
        next: u64,
        end: u64,
    }

    impl SyntheticSource {
        fn new(total: u64) -> Self {
            Self {
                info: VideoInfo {
                    path: PathBuf::from("synthetic.mp4"),
                    total_frames: total,
                    fps: 30.0,
                    width: 8,
                    height: 8,
                },
                next: 0,
                end: total,
            }
        }

        /// Source whose stream ends before the reported frame count
        fn truncated(total: u64, actual_end: u64) -> Self {
            let mut source = Self::new(total);
            source.end = actual_end;
            source
        }
    }

    impl FrameSource for SyntheticSource {
        fn info(&self) -> &VideoInfo {
            &self.info
        }

        fn seek_to_frame(&mut self, frame_index: u64) -> Result<()> {
            self.next = frame_index;
            Ok(())
        }

        fn read_frame(&mut self) -> Result<Option<Frame>> {
            if self.next >= self.end {
                return Ok(None);
            }
            let index = self.next;
            self.next += 1;
            Ok(Some(Frame {
                index,
                timestamp: index as f64 / self.info.fps,
                width: self.info.width,
                height: self.info.height,
                data: vec![0u8; (self.info.width * self.info.height * 3) as usize],
            }))
        }
    }

    struct StubEstimator {
        calls: u64,
    }

    impl PoseEstimator for StubEstimator {
        fn infer(&mut self, _image: &RgbImage) -> Result<Option<Vec<Landmark>>> {
            self.calls += 1;
            Ok(Some(vec![Landmark::new(0.5, 0.5, 0.0, Some(1.0)); 33]))
        }
    }

    struct FailingEstimator {
        remaining: u64,
    }

    impl PoseEstimator for FailingEstimator {
        fn infer(&mut self, _image: &RgbImage) -> Result<Option<Vec<Landmark>>> {
            if self.remaining == 0 {
                return Err(ProcessingError::InferenceFailed("model blew up".into()));
            }
            self.remaining -= 1;
            Ok(None)
        }
    }

    #[test]
    fn test_sample_rate_selects_multiples() {
        let mut source = SyntheticSource::new(10);
        let mut estimator = StubEstimator { calls: 0 };
        let chunk = Chunk {
            worker_id: 0,
            start_frame: 0,
            end_frame: 10,
        };

        let results = process_chunk(&mut source, &mut estimator, &chunk, 2).unwrap();

        let frames: Vec<u64> = results.iter().map(|e| e.frame).collect();
        assert_eq!(frames, vec![0, 2, 4, 6, 8]);
        assert_eq!(estimator.calls, 5);
    }

    #[test]
    fn test_chunk_bounds_respected() {
        let mut source = SyntheticSource::new(100);
        let mut estimator = StubEstimator { calls: 0 };
        let chunk = Chunk {
            worker_id: 3,
            start_frame: 40,
            end_frame: 60,
        };

        let results = process_chunk(&mut source, &mut estimator, &chunk, 1).unwrap();

        assert_eq!(results.len(), 20);
        assert_eq!(results.first().unwrap().frame, 40);
        assert_eq!(results.last().unwrap().frame, 59);
    }

    #[test]
    fn test_early_stream_end_is_short_chunk() {
        let mut source = SyntheticSource::truncated(100, 50);
        let mut estimator = StubEstimator { calls: 0 };
        let chunk = Chunk {
            worker_id: 1,
            start_frame: 40,
            end_frame: 100,
        };

        let results = process_chunk(&mut source, &mut estimator, &chunk, 1).unwrap();

        assert_eq!(results.len(), 10);
        assert_eq!(results.last().unwrap().frame, 49);
    }

    #[test]
    fn test_inference_failure_aborts_chunk() {
        let mut source = SyntheticSource::new(20);
        let mut estimator = FailingEstimator { remaining: 5 };
        let chunk = Chunk {
            worker_id: 0,
            start_frame: 0,
            end_frame: 20,
        };

        let result = process_chunk(&mut source, &mut estimator, &chunk, 1);
        assert!(matches!(result, Err(ProcessingError::InferenceFailed(_))));
    }

    #[test]
    fn test_absent_pose_recorded_as_null() {
        let mut source = SyntheticSource::new(4);
        let mut estimator = FailingEstimator { remaining: 100 };
        let chunk = Chunk {
            worker_id: 0,
            start_frame: 0,
            end_frame: 4,
        };

        let results = process_chunk(&mut source, &mut estimator, &chunk, 1).unwrap();
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|e| e.landmarks.is_none()));
    }
}
