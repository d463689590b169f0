//! Draws pose landmarks onto video frames
//!
//! Walks the source video once, looks up the merged landmark stream by
//! frame index, draws joint markers plus the fixed skeleton connectivity
//! graph on frames that have a pose, and hands every frame (annotated or
//! not) to the intermediate overlay writer. Styling is constant; smooth
//! results require the landmark stream to cover every frame, which is a
//! contract on the caller, not a guard here.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use std::collections::HashMap;
use tracing::info;

use pose_video_common::{Landmark, LandmarkFrame, ProcessingError, Result};
use pose_video_decoder::FrameSource;
use pose_video_encoder::OverlayWriter;

/// Joint-to-joint edges of the 33-landmark pose skeleton
pub const POSE_CONNECTIONS: &[(usize, usize)] = &[
    // Face
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 7),
    (0, 4),
    (4, 5),
    (5, 6),
    (6, 8),
    (9, 10),
    // Torso
    (11, 12),
    (11, 23),
    (12, 24),
    (23, 24),
    // Left arm
    (11, 13),
    (13, 15),
    (15, 17),
    (15, 19),
    (15, 21),
    (17, 19),
    // Right arm
    (12, 14),
    (14, 16),
    (16, 18),
    (16, 20),
    (16, 22),
    (18, 20),
    // Left leg
    (23, 25),
    (25, 27),
    (27, 29),
    (29, 31),
    (27, 31),
    // Right leg
    (24, 26),
    (26, 28),
    (28, 30),
    (30, 32),
    (28, 32),
];

/// Constant drawing style for markers and connections
#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub color: Rgb<u8>,
    pub marker_radius: i32,
    /// Landmarks below this visibility are not drawn
    pub visibility_threshold: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: Rgb([128, 0, 128]),
            marker_radius: 2,
            visibility_threshold: 0.5,
        }
    }
}

/// Counters for one overlay pass
#[derive(Debug, Default, Clone)]
pub struct RenderStats {
    /// Frames written to the intermediate video
    pub frames_written: u64,
    /// Frames that carried a pose and were annotated
    pub frames_annotated: u64,
}

fn is_drawable(landmark: &Landmark, style: &OverlayStyle) -> bool {
    landmark
        .visibility
        .map_or(true, |v| v >= style.visibility_threshold)
}

fn to_pixel(landmark: &Landmark, width: u32, height: u32) -> (f32, f32) {
    let x = (landmark.x * width as f32).clamp(0.0, (width - 1) as f32);
    let y = (landmark.y * height as f32).clamp(0.0, (height - 1) as f32);
    (x, y)
}

/// Draw markers and skeleton connections for one pose
pub fn draw_pose(image: &mut RgbImage, landmarks: &[Landmark], style: &OverlayStyle) {
    let (width, height) = image.dimensions();

    for &(a, b) in POSE_CONNECTIONS {
        let (Some(from), Some(to)) = (landmarks.get(a), landmarks.get(b)) else {
            continue;
        };
        if !is_drawable(from, style) || !is_drawable(to, style) {
            continue;
        }
        draw_line_segment_mut(
            image,
            to_pixel(from, width, height),
            to_pixel(to, width, height),
            style.color,
        );
    }

    for landmark in landmarks {
        if !is_drawable(landmark, style) {
            continue;
        }
        let (x, y) = to_pixel(landmark, width, height);
        draw_filled_circle_mut(
            image,
            (x.round() as i32, y.round() as i32),
            style.marker_radius,
            style.color,
        );
    }
}

/// Walk the video once, drawing landmarks onto a copy of each frame and
/// writing all frames to the intermediate video
///
/// Frames with no landmark entry (or a null pose) pass through
/// unmodified.
///
/// # Errors
///
/// Propagates decode failures from the source and write failures from
/// the encoder child.
pub fn render_overlay(
    source: &mut dyn FrameSource,
    landmarks: &[LandmarkFrame],
    writer: &mut OverlayWriter,
    style: &OverlayStyle,
) -> Result<RenderStats> {
    let by_frame: HashMap<u64, &Vec<Landmark>> = landmarks
        .iter()
        .filter_map(|entry| entry.landmarks.as_ref().map(|lms| (entry.frame, lms)))
        .collect();

    let mut stats = RenderStats::default();

    while let Some(frame) = source.read_frame()? {
        let index = frame.index;
        let width = frame.width;
        let height = frame.height;

        let mut image = RgbImage::from_raw(width, height, frame.data).ok_or_else(|| {
            ProcessingError::ImageError(format!(
                "frame buffer does not match {width}x{height} RGB24 layout"
            ))
        })?;

        if let Some(pose) = by_frame.get(&index) {
            draw_pose(&mut image, pose, style);
            stats.frames_annotated += 1;
        }

        writer.write_frame(image.as_raw())?;
        stats.frames_written += 1;
    }

    info!(
        "Drew landmarks on {}/{} frames",
        stats.frames_annotated, stats.frames_written
    );

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn centered_pose(count: usize) -> Vec<Landmark> {
        (0..count)
            .map(|i| {
                Landmark::new(
                    0.25 + 0.5 * (i as f32 / count as f32),
                    0.5,
                    0.0,
                    Some(1.0),
                )
            })
            .collect()
    }

    #[test]
    fn test_connections_reference_valid_landmarks() {
        for &(a, b) in POSE_CONNECTIONS {
            assert!(a < 33, "edge start {a} out of range");
            assert!(b < 33, "edge end {b} out of range");
            assert_ne!(a, b);
        }
    }

    #[test]
    fn test_draw_pose_marks_pixels() {
        let mut image = RgbImage::new(64, 64);
        let style = OverlayStyle::default();

        draw_pose(&mut image, &centered_pose(33), &style);

        let painted = image
            .pixels()
            .filter(|pixel| pixel.0 == [128, 0, 128])
            .count();
        assert!(painted > 0);
    }

    #[test]
    fn test_low_visibility_not_drawn() {
        let mut image = RgbImage::new(64, 64);
        let style = OverlayStyle::default();

        let mut pose = centered_pose(33);
        for landmark in &mut pose {
            landmark.visibility = Some(0.1);
        }
        draw_pose(&mut image, &pose, &style);

        assert!(image.pixels().all(|pixel| pixel.0 == [0, 0, 0]));
    }

    #[test]
    fn test_out_of_range_coordinates_clamped() {
        let mut image = RgbImage::new(32, 32);
        let style = OverlayStyle::default();

        // Model outputs can fall slightly outside [0, 1].
        let pose = vec![Landmark::new(1.4, -0.2, 0.0, Some(1.0)); 33];
        draw_pose(&mut image, &pose, &style);
    }

    #[test]
    fn test_missing_visibility_is_drawn() {
        let mut image = RgbImage::new(64, 64);
        let style = OverlayStyle::default();

        let mut pose = centered_pose(33);
        for landmark in &mut pose {
            landmark.visibility = None;
        }
        draw_pose(&mut image, &pose, &style);

        let painted = image
            .pixels()
            .filter(|pixel| pixel.0 == [128, 0, 128])
            .count();
        assert!(painted > 0);
    }
}
