/// Common types and utilities for pose landmark extraction
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Processing errors
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Video not found: {0}")]
    VideoNotFound(PathBuf),

    #[error("No video stream found")]
    NoVideoStream,

    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    #[error("Pose inference failed: {0}")]
    InferenceFailed(String),

    #[error("Encode failed: {0}")]
    EncodeFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ProcessingError {
    /// True for the missing-input condition callers map to a
    /// missing-resource status rather than an internal failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProcessingError::VideoNotFound(_))
    }
}

/// Result type for processing operations
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Basic properties of an opened video
///
/// Read-only; each worker opens the file independently and carries its
/// own copy. Decode handles are never shared across workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub path: PathBuf,
    /// Total frame count as reported (or estimated) by the container
    pub total_frames: u64,
    /// Frames per second
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

impl VideoInfo {
    /// Duration estimate in seconds
    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        if self.fps > 0.0 {
            self.total_frames as f64 / self.fps
        } else {
            0.0
        }
    }
}

/// Single pose landmark with normalized coordinates
///
/// `x`/`y` are normalized to the frame (typically within [0, 1]); `z` is
/// the model's depth estimate on the same scale. `visibility` is the
/// model's confidence that the joint is visible, absent when the model
/// does not report one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: Option<f32>,
}

impl Landmark {
    #[must_use]
    pub fn new(x: f32, y: f32, z: f32, visibility: Option<f32>) -> Self {
        Self {
            x,
            y,
            z,
            visibility,
        }
    }
}

/// Per-frame landmark record
///
/// `time` is derived from the decoder-reported timestamp, not from
/// `frame / fps`, since decoders may report drift. `landmarks` is `None`
/// (wire: `null`) when no pose was detected in the frame; the sequence
/// order is significant, index position encodes joint identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    pub frame: u64,
    pub time: f64,
    pub landmarks: Option<Vec<Landmark>>,
}

impl LandmarkFrame {
    #[must_use]
    pub fn has_pose(&self) -> bool {
        self.landmarks.is_some()
    }
}

/// Pose model complexity tier
///
/// Mirrors the 0/1/2 levels accepted at the API boundary: 0 = lite
/// (fastest), 1 = full (balanced), 2 = heavy (most accurate).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelComplexity {
    Lite,
    #[default]
    Full,
    Heavy,
}

impl ModelComplexity {
    /// Parse a 0/1/2 complexity level
    #[must_use]
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(ModelComplexity::Lite),
            1 => Some(ModelComplexity::Full),
            2 => Some(ModelComplexity::Heavy),
            _ => None,
        }
    }

    /// Numeric level as accepted at the API boundary
    #[must_use]
    pub fn level(self) -> u8 {
        match self {
            ModelComplexity::Lite => 0,
            ModelComplexity::Full => 1,
            ModelComplexity::Heavy => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_levels() {
        assert_eq!(ModelComplexity::from_level(0), Some(ModelComplexity::Lite));
        assert_eq!(ModelComplexity::from_level(1), Some(ModelComplexity::Full));
        assert_eq!(ModelComplexity::from_level(2), Some(ModelComplexity::Heavy));
        assert_eq!(ModelComplexity::from_level(3), None);
        assert_eq!(ModelComplexity::default().level(), 1);
    }

    #[test]
    fn test_landmark_frame_wire_format() {
        let entry = LandmarkFrame {
            frame: 42,
            time: 1.4,
            landmarks: Some(vec![
                Landmark::new(0.5, 0.25, -0.1, Some(0.93)),
                Landmark::new(0.52, 0.27, -0.12, None),
            ]),
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["frame"], 42);
        assert_eq!(json["landmarks"][0]["x"], 0.5);
        assert!(json["landmarks"][1]["visibility"].is_null());

        let parsed: LandmarkFrame = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_landmark_frame_absent_pose() {
        let entry = LandmarkFrame {
            frame: 7,
            time: 0.23,
            landmarks: None,
        };
        assert!(!entry.has_pose());

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"landmarks\":null"));

        let parsed: LandmarkFrame = serde_json::from_str(&json).unwrap();
        assert!(parsed.landmarks.is_none());
    }

    #[test]
    fn test_not_found_classification() {
        let missing = ProcessingError::VideoNotFound(PathBuf::from("/no/such.mp4"));
        assert!(missing.is_not_found());
        assert!(!ProcessingError::NoVideoStream.is_not_found());
        assert!(!ProcessingError::DecodeFailed("bad header".into()).is_not_found());
    }

    #[test]
    fn test_video_info_duration() {
        let info = VideoInfo {
            path: PathBuf::from("clip.mp4"),
            total_frames: 900,
            fps: 30.0,
            width: 1280,
            height: 720,
        };
        assert!((info.duration_seconds() - 30.0).abs() < f64::EPSILON);
    }
}
