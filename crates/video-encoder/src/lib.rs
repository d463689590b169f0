//! Overlay video writing and H.264 remux via the external ffmpeg binary
//!
//! Two stages back the render pipeline:
//! 1. [`OverlayWriter`] feeds annotated RGB frames to an ffmpeg child
//!    process that writes a silent MPEG-4 intermediate file.
//! 2. [`mux_with_audio`] transcodes that intermediate to H.264/AAC with
//!    a fast-start layout, remuxing the original input's audio track
//!    back in (best-effort - a silent source is not an error).
//!
//! The encoder is an external collaborator: this crate only assembles
//! its invocations and surfaces its diagnostics on failure.

use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use thiserror::Error;
use tracing::{debug, info};

use pose_video_common::ProcessingError;

/// Errors specific to encoding and muxing
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("ffmpeg execution failed: {0}")]
    FfmpegError(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<EncodeError> for ProcessingError {
    fn from(err: EncodeError) -> Self {
        ProcessingError::EncodeFailed(err.to_string())
    }
}

/// Configuration for the final transcode+remux stage
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Pass `-hwaccel auto` to the encoder
    pub use_hw_accel: bool,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self { use_hw_accel: true }
    }
}

/// Arguments for the rawvideo-consuming intermediate writer
fn rawvideo_args(output: &Path, width: u32, height: u32, fps: f64) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-y",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgb24",
        "-video_size",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();

    args.push(OsString::from(format!("{width}x{height}")));
    args.push(OsString::from("-framerate"));
    args.push(OsString::from(format!("{fps}")));
    args.extend(
        ["-i", "pipe:0", "-an", "-c:v", "mpeg4", "-q:v", "2"]
            .into_iter()
            .map(OsString::from),
    );
    args.push(output.as_os_str().to_os_string());
    args
}

/// Arguments for the transcode+audio-remux invocation
fn mux_args(
    video_source: &Path,
    audio_source: &Path,
    output: &Path,
    config: &MuxConfig,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![OsString::from("-y")];

    if config.use_hw_accel {
        args.push(OsString::from("-hwaccel"));
        args.push(OsString::from("auto"));
    }

    args.push(OsString::from("-i"));
    args.push(video_source.as_os_str().to_os_string());
    args.push(OsString::from("-i"));
    args.push(audio_source.as_os_str().to_os_string());

    // Video from the overlay file; audio from the original, optional
    // (the trailing '?' keeps a silent source from failing the mux).
    args.extend(
        [
            "-map",
            "0:v:0",
            "-map",
            "1:a:0?",
            "-c:v",
            "libx264",
            "-c:a",
            "aac",
            "-preset",
            "fast",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ]
        .into_iter()
        .map(OsString::from),
    );

    args.push(output.as_os_str().to_os_string());
    args
}

/// Writes raw RGB frames into a silent intermediate video
///
/// Spawns one ffmpeg child per writer; frames go down its stdin and the
/// child encodes them as they arrive. `finish` must be called to close
/// the stream and check the encoder's exit status.
pub struct OverlayWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    frame_size: usize,
}

impl OverlayWriter {
    /// Spawn the encoder child for the given geometry
    ///
    /// # Errors
    ///
    /// Returns an error if the ffmpeg binary cannot be spawned.
    pub fn create(output: &Path, width: u32, height: u32, fps: f64) -> Result<Self, EncodeError> {
        let args = rawvideo_args(output, width, height, fps);
        debug!("Spawning overlay writer: ffmpeg {:?}", args);

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EncodeError::FfmpegError(format!("Failed to spawn ffmpeg: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EncodeError::FfmpegError("ffmpeg stdin unavailable".to_string()))?;

        Ok(Self {
            child,
            stdin: Some(stdin),
            frame_size: width as usize * height as usize * 3,
        })
    }

    /// Write one RGB24 frame
    ///
    /// # Errors
    ///
    /// Returns an error on a geometry mismatch or if the encoder child
    /// stopped accepting input.
    pub fn write_frame(&mut self, rgb: &[u8]) -> Result<(), EncodeError> {
        if rgb.len() != self.frame_size {
            return Err(EncodeError::FrameSize {
                expected: self.frame_size,
                actual: rgb.len(),
            });
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| EncodeError::FfmpegError("writer already finished".to_string()))?;
        stdin.write_all(rgb)?;
        Ok(())
    }

    /// Close the stream and wait for the encoder to exit
    ///
    /// # Errors
    ///
    /// Returns the encoder's stderr when it exits non-zero.
    pub fn finish(mut self) -> Result<(), EncodeError> {
        // Closing stdin signals end of stream.
        drop(self.stdin.take());

        let output = self
            .child
            .wait_with_output()
            .map_err(|e| EncodeError::FfmpegError(format!("Failed to wait for ffmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EncodeError::FfmpegError(format!(
                "intermediate encode failed: {stderr}"
            )));
        }

        Ok(())
    }
}

/// Transcode the overlay video to H.264/AAC, remuxing the original
/// input's audio track back in
///
/// # Errors
///
/// Returns an error when a source is missing or the encoder exits
/// non-zero; the error carries ffmpeg's stderr.
pub fn mux_with_audio(
    video_source: &Path,
    audio_source: &Path,
    output: &Path,
    config: &MuxConfig,
) -> Result<(), EncodeError> {
    if !video_source.exists() {
        return Err(EncodeError::FileNotFound(video_source.display().to_string()));
    }
    if !audio_source.exists() {
        return Err(EncodeError::FileNotFound(audio_source.display().to_string()));
    }

    let args = mux_args(video_source, audio_source, output, config);
    debug!("FFmpeg mux command: ffmpeg {:?}", args);

    let result = Command::new("ffmpeg")
        .args(&args)
        .output()
        .map_err(|e| EncodeError::FfmpegError(format!("Failed to execute ffmpeg: {e}")))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(EncodeError::FfmpegError(format!("ffmpeg failed: {stderr}")));
    }

    info!("Video encoding complete: {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn has_flag(args: &[OsString], flag: &str) -> bool {
        args.iter().any(|a| a == flag)
    }

    #[test]
    fn test_rawvideo_args_geometry() {
        let args = rawvideo_args(&PathBuf::from("out.tmp.mp4"), 1280, 720, 29.97);
        assert!(has_flag(&args, "1280x720"));
        assert!(has_flag(&args, "29.97"));
        assert!(has_flag(&args, "rawvideo"));
        assert!(has_flag(&args, "-an"));
        assert!(has_flag(&args, "mpeg4"));
        assert_eq!(args.last().unwrap(), "out.tmp.mp4");
    }

    #[test]
    fn test_mux_args_streams_and_layout() {
        let config = MuxConfig { use_hw_accel: false };
        let args = mux_args(
            &PathBuf::from("overlay.tmp.mp4"),
            &PathBuf::from("input.mp4"),
            &PathBuf::from("out.mp4"),
            &config,
        );

        assert!(has_flag(&args, "0:v:0"));
        assert!(has_flag(&args, "1:a:0?"));
        assert!(has_flag(&args, "libx264"));
        assert!(has_flag(&args, "aac"));
        assert!(has_flag(&args, "yuv420p"));
        assert!(has_flag(&args, "+faststart"));
        assert!(!has_flag(&args, "-hwaccel"));
    }

    #[test]
    fn test_mux_args_hw_accel() {
        let args = mux_args(
            &PathBuf::from("a.mp4"),
            &PathBuf::from("b.mp4"),
            &PathBuf::from("c.mp4"),
            &MuxConfig::default(),
        );
        let position = args.iter().position(|a| a == "-hwaccel").unwrap();
        assert_eq!(args[position + 1], "auto");
    }

    #[test]
    fn test_mux_missing_source() {
        let result = mux_with_audio(
            &PathBuf::from("/nonexistent/overlay.mp4"),
            &PathBuf::from("/nonexistent/input.mp4"),
            &PathBuf::from("/tmp/out.mp4"),
            &MuxConfig::default(),
        );
        assert!(matches!(result, Err(EncodeError::FileNotFound(_))));
    }
}
