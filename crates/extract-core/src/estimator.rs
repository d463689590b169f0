//! Capability seams for pose inference

use image::RgbImage;
use pose_video_common::{Landmark, Result};

/// Per-frame pose inference
///
/// The landmark sequence length and ordering are model-defined; index
/// position encodes joint identity. `None` means no pose was detected,
/// which is a normal result, not an error.
pub trait PoseEstimator {
    fn infer(&mut self, image: &RgbImage) -> Result<Option<Vec<Landmark>>>;
}

/// Builds fresh estimator instances
///
/// Each chunk worker calls `create` once inside its own execution
/// context, so inference state is never shared across workers.
pub trait EstimatorFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn PoseEstimator>>;
}
