//! Pose landmark estimation using BlazePose via ONNX Runtime
//!
//! Wraps the single-person BlazePose landmark models exported to ONNX.
//! Each inference returns the model's 33 body landmarks (x, y, z plus a
//! visibility score) or nothing when no pose is present in the frame.
//!
//! # Features
//! - Three model tiers (lite/full/heavy) mapped from the 0/1/2
//!   complexity levels accepted at the API boundary
//! - Pose-presence gating with a configurable detection threshold
//! - One ONNX session per estimator instance, so chunk workers never
//!   contend on a shared session
//!
//! # Example
//! ```no_run
//! use pose_video_estimation::{BlazePoseLandmarker, PoseEstimationConfig};
//! use image::open;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = PoseEstimationConfig::default();
//! let mut landmarker =
//!     BlazePoseLandmarker::new("models/pose-landmark/pose_landmark_full.onnx", config)?;
//!
//! let img = open("frame.jpg")?.to_rgb8();
//! if let Some(landmarks) = landmarker.infer_image(&img)? {
//!     println!("Pose detected with {} landmarks", landmarks.len());
//! }
//! # Ok(())
//! # }
//! ```

use image::RgbImage;
use ndarray::Array;
use ort::{
    session::{Session, SessionOutputs},
    value::TensorRef,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use pose_extract_core::{EstimatorFactory, PoseEstimator};
use pose_video_common::{Landmark, ModelComplexity, ProcessingError};

/// Number of body landmarks the BlazePose models report
pub const POSE_LANDMARK_COUNT: usize = 33;

/// Values per landmark row in the raw model output
/// (x, y, z, visibility logit, presence logit)
const LANDMARK_STRIDE: usize = 5;

/// BlazePose landmark model tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlazePoseModel {
    /// Lite - smallest model, fastest inference
    Lite,
    /// Full - balanced speed/accuracy
    Full,
    /// Heavy - highest accuracy, slowest inference
    Heavy,
}

impl BlazePoseModel {
    /// Get the typical model filename for this tier
    #[must_use]
    pub fn filename(&self) -> &'static str {
        match self {
            BlazePoseModel::Lite => "pose_landmark_lite.onnx",
            BlazePoseModel::Full => "pose_landmark_full.onnx",
            BlazePoseModel::Heavy => "pose_landmark_heavy.onnx",
        }
    }

    /// Get approximate model size in bytes
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        match self {
            BlazePoseModel::Lite => 3_000_000,
            BlazePoseModel::Full => 6_500_000,
            BlazePoseModel::Heavy => 26_000_000,
        }
    }

    /// Map an API-level complexity tier to a model
    #[must_use]
    pub fn from_complexity(complexity: ModelComplexity) -> Self {
        match complexity {
            ModelComplexity::Lite => BlazePoseModel::Lite,
            ModelComplexity::Full => BlazePoseModel::Full,
            ModelComplexity::Heavy => BlazePoseModel::Heavy,
        }
    }
}

/// Configuration for pose landmark estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseEstimationConfig {
    /// Minimum pose-presence score to report a detection (0.0-1.0)
    pub detection_threshold: f32,
    /// Input image size (BlazePose landmark models take 256x256)
    pub input_size: u32,
}

impl Default for PoseEstimationConfig {
    fn default() -> Self {
        Self {
            detection_threshold: 0.5,
            input_size: 256,
        }
    }
}

/// BlazePose landmark names (33 landmarks, index order is significant)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoseLandmarkName {
    Nose,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

impl PoseLandmarkName {
    /// Get landmark name from index (0-32)
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        use PoseLandmarkName::*;
        const NAMES: [PoseLandmarkName; POSE_LANDMARK_COUNT] = [
            Nose,
            LeftEyeInner,
            LeftEye,
            LeftEyeOuter,
            RightEyeInner,
            RightEye,
            RightEyeOuter,
            LeftEar,
            RightEar,
            MouthLeft,
            MouthRight,
            LeftShoulder,
            RightShoulder,
            LeftElbow,
            RightElbow,
            LeftWrist,
            RightWrist,
            LeftPinky,
            RightPinky,
            LeftIndex,
            RightIndex,
            LeftThumb,
            RightThumb,
            LeftHip,
            RightHip,
            LeftKnee,
            RightKnee,
            LeftAnkle,
            RightAnkle,
            LeftHeel,
            RightHeel,
            LeftFootIndex,
            RightFootIndex,
        ];
        NAMES.get(index).copied()
    }

    /// Get human-readable name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PoseLandmarkName::Nose => "nose",
            PoseLandmarkName::LeftEyeInner => "left_eye_inner",
            PoseLandmarkName::LeftEye => "left_eye",
            PoseLandmarkName::LeftEyeOuter => "left_eye_outer",
            PoseLandmarkName::RightEyeInner => "right_eye_inner",
            PoseLandmarkName::RightEye => "right_eye",
            PoseLandmarkName::RightEyeOuter => "right_eye_outer",
            PoseLandmarkName::LeftEar => "left_ear",
            PoseLandmarkName::RightEar => "right_ear",
            PoseLandmarkName::MouthLeft => "mouth_left",
            PoseLandmarkName::MouthRight => "mouth_right",
            PoseLandmarkName::LeftShoulder => "left_shoulder",
            PoseLandmarkName::RightShoulder => "right_shoulder",
            PoseLandmarkName::LeftElbow => "left_elbow",
            PoseLandmarkName::RightElbow => "right_elbow",
            PoseLandmarkName::LeftWrist => "left_wrist",
            PoseLandmarkName::RightWrist => "right_wrist",
            PoseLandmarkName::LeftPinky => "left_pinky",
            PoseLandmarkName::RightPinky => "right_pinky",
            PoseLandmarkName::LeftIndex => "left_index",
            PoseLandmarkName::RightIndex => "right_index",
            PoseLandmarkName::LeftThumb => "left_thumb",
            PoseLandmarkName::RightThumb => "right_thumb",
            PoseLandmarkName::LeftHip => "left_hip",
            PoseLandmarkName::RightHip => "right_hip",
            PoseLandmarkName::LeftKnee => "left_knee",
            PoseLandmarkName::RightKnee => "right_knee",
            PoseLandmarkName::LeftAnkle => "left_ankle",
            PoseLandmarkName::RightAnkle => "right_ankle",
            PoseLandmarkName::LeftHeel => "left_heel",
            PoseLandmarkName::RightHeel => "right_heel",
            PoseLandmarkName::LeftFootIndex => "left_foot_index",
            PoseLandmarkName::RightFootIndex => "right_foot_index",
        }
    }
}

/// Pose landmarker using a BlazePose ONNX model
pub struct BlazePoseLandmarker {
    session: Session,
    config: PoseEstimationConfig,
}

impl BlazePoseLandmarker {
    /// Create a new landmarker with the given ONNX model path
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        config: PoseEstimationConfig,
    ) -> Result<Self, PoseLandmarkError> {
        info!("Loading BlazePose model from {:?}", model_path.as_ref());

        let session = Session::builder()
            .map_err(|e| PoseLandmarkError::ModelLoad(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| PoseLandmarkError::ModelLoad(e.to_string()))?;

        info!("BlazePose model loaded successfully");

        Ok(Self { session, config })
    }

    /// Infer pose landmarks for a single frame
    ///
    /// Returns `None` when the model's pose-presence score falls below
    /// the detection threshold.
    pub fn infer_image(
        &mut self,
        image: &RgbImage,
    ) -> Result<Option<Vec<Landmark>>, PoseLandmarkError> {
        debug!(
            "Running pose inference on {}x{} frame",
            image.width(),
            image.height()
        );

        let input_array = Self::preprocess_image(image, &self.config);

        // Zero-copy tensor: borrow the preprocessed array instead of
        // cloning it into the runtime.
        let input_tensor = TensorRef::from_array_view(input_array.view())
            .map_err(|e| PoseLandmarkError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| PoseLandmarkError::Inference(e.to_string()))?;

        Self::postprocess_outputs(outputs, &self.config)
    }

    /// Preprocess image to BlazePose input format (1, 3, H, W), normalized to [0, 1]
    fn preprocess_image(
        image: &RgbImage,
        config: &PoseEstimationConfig,
    ) -> Array<f32, ndarray::Dim<[usize; 4]>> {
        let input_size = config.input_size;

        let resized = image::imageops::resize(
            image,
            input_size,
            input_size,
            image::imageops::FilterType::Triangle,
        );

        let mut input_array = Array::zeros((1, 3, input_size as usize, input_size as usize));

        for y in 0..input_size as usize {
            for x in 0..input_size as usize {
                let pixel = resized.get_pixel(x as u32, y as u32);
                input_array[[0, 0, y, x]] = f32::from(pixel[0]) / 255.0;
                input_array[[0, 1, y, x]] = f32::from(pixel[1]) / 255.0;
                input_array[[0, 2, y, x]] = f32::from(pixel[2]) / 255.0;
            }
        }

        input_array
    }

    /// Post-process model outputs into a landmark list
    ///
    /// Output 0 carries the landmark rows (input-space coordinates plus
    /// visibility/presence logits); output 1 carries the pose-presence
    /// score.
    fn postprocess_outputs(
        outputs: SessionOutputs,
        config: &PoseEstimationConfig,
    ) -> Result<Option<Vec<Landmark>>, PoseLandmarkError> {
        let (_, score_data) = outputs[1]
            .try_extract_tensor::<f32>()
            .map_err(|e| PoseLandmarkError::Inference(format!("Failed to extract score: {e}")))?;

        let presence = score_data.first().copied().unwrap_or(0.0);
        if presence < config.detection_threshold {
            debug!("No pose detected (presence {presence:.3})");
            return Ok(None);
        }

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| PoseLandmarkError::Inference(format!("Failed to extract tensor: {e}")))?;

        debug!("Landmark tensor shape: {:?}", shape);

        // The landmark models emit extra auxiliary rows after the 33
        // body landmarks; only the body rows are exposed.
        if data.len() < POSE_LANDMARK_COUNT * LANDMARK_STRIDE
            || data.len() % LANDMARK_STRIDE != 0
        {
            return Err(PoseLandmarkError::Inference(format!(
                "Unexpected landmark tensor length {}",
                data.len()
            )));
        }

        let scale = config.input_size as f32;
        let mut landmarks = Vec::with_capacity(POSE_LANDMARK_COUNT);

        for row in 0..POSE_LANDMARK_COUNT {
            let base = row * LANDMARK_STRIDE;
            let x = data[base] / scale;
            let y = data[base + 1] / scale;
            let z = data[base + 2] / scale;
            let visibility = sigmoid(data[base + 3]);

            landmarks.push(Landmark::new(x, y, z, Some(visibility)));
        }

        debug!("Pose detected (presence {presence:.3})");
        Ok(Some(landmarks))
    }
}

impl PoseEstimator for BlazePoseLandmarker {
    fn infer(
        &mut self,
        image: &RgbImage,
    ) -> pose_video_common::Result<Option<Vec<Landmark>>> {
        self.infer_image(image).map_err(ProcessingError::from)
    }
}

/// Logistic squash for visibility logits
#[inline]
fn sigmoid(value: f32) -> f32 {
    1.0 / (1.0 + (-value).exp())
}

/// Builds one independent landmarker per chunk worker
///
/// Every `create` call loads a fresh ONNX session, so workers never
/// contend on shared inference state.
pub struct BlazePoseLandmarkerFactory {
    model_dir: PathBuf,
    model: BlazePoseModel,
    config: PoseEstimationConfig,
}

impl BlazePoseLandmarkerFactory {
    #[must_use]
    pub fn new(model_dir: impl AsRef<Path>, complexity: ModelComplexity) -> Self {
        Self {
            model_dir: model_dir.as_ref().to_path_buf(),
            model: BlazePoseModel::from_complexity(complexity),
            config: PoseEstimationConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: PoseEstimationConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(self.model.filename())
    }
}

impl EstimatorFactory for BlazePoseLandmarkerFactory {
    fn create(&self) -> pose_video_common::Result<Box<dyn PoseEstimator>> {
        let landmarker = BlazePoseLandmarker::new(self.model_path(), self.config.clone())?;
        Ok(Box::new(landmarker))
    }
}

/// Error types for pose landmark estimation
#[derive(Debug, Error)]
pub enum PoseLandmarkError {
    #[error("Failed to load model: {0}")]
    ModelLoad(String),
    #[error("Inference error: {0}")]
    Inference(String),
    #[error("Image processing error: {0}")]
    ImageProcessing(String),
}

impl From<PoseLandmarkError> for ProcessingError {
    fn from(error: PoseLandmarkError) -> Self {
        ProcessingError::InferenceFailed(error.to_string())
    }
}
