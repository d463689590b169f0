//! Video frame source built on FFmpeg
//!
//! Exposes the `FrameSource` capability the extraction pipeline drives:
//! open a video, seek once to a frame, then read strictly sequentially.
//! Sequential decode is far cheaper than repeated keyframe seeking, so
//! chunk workers seek exactly once per chunk and stream from there.

use ffmpeg_next as ffmpeg;
use std::path::Path;
use tracing::debug;

use pose_video_common::{ProcessingError, Result, VideoInfo};

/// Decoded video frame in RGB24
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame number (0-indexed, dense)
    pub index: u64,
    /// Decoder-reported timestamp in seconds, relative to stream start
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    /// Raw RGB24 data, row-major, no padding
    pub data: Vec<u8>,
}

/// Sequential access to a video's frames
///
/// Implementations own their decode state exclusively; a handle is never
/// shared between workers because concurrent seeks corrupt the read
/// position.
pub trait FrameSource {
    fn info(&self) -> &VideoInfo;

    /// Position the stream so the next `read_frame` returns `frame_index`.
    /// Called at most once per chunk, before any read.
    fn seek_to_frame(&mut self, frame_index: u64) -> Result<()>;

    /// Next frame in stream order, or `None` when the stream ends.
    fn read_frame(&mut self) -> Result<Option<Frame>>;
}

/// Opens an independent `FrameSource` per call
pub trait VideoOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>>;
}

/// Initialize `FFmpeg` library
fn init_ffmpeg() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        ffmpeg::init().expect("Failed to initialize FFmpeg");
    });
}

fn stream_frame_rate(stream: &ffmpeg::format::stream::Stream) -> f64 {
    let avg = f64::from(stream.avg_frame_rate());
    if avg > 0.0 {
        return avg;
    }
    let rate = f64::from(stream.rate());
    if rate > 0.0 {
        return rate;
    }
    30.0
}

fn stream_start_seconds(stream: &ffmpeg::format::stream::Stream) -> f64 {
    let start = stream.start_time();
    if start == ffmpeg::ffi::AV_NOPTS_VALUE {
        return 0.0;
    }
    let time_base = stream.time_base();
    start as f64 * f64::from(time_base.0) / f64::from(time_base.1)
}

/// Frame count as reported by the stream, falling back to a duration
/// estimate when the container does not carry one.
fn stream_total_frames(
    stream: &ffmpeg::format::stream::Stream,
    ictx: &ffmpeg::format::context::Input,
    fps: f64,
) -> u64 {
    let reported = stream.frames();
    if reported > 0 {
        return reported as u64;
    }

    let time_base = stream.time_base();
    let duration = stream.duration();
    if duration > 0 {
        let seconds = duration as f64 * f64::from(time_base.0) / f64::from(time_base.1);
        return (seconds * fps).round() as u64;
    }

    let duration = ictx.duration();
    if duration > 0 {
        let seconds = duration as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE);
        return (seconds * fps).round() as u64;
    }

    0
}

/// Read container metadata without setting up a decoder
///
/// # Errors
///
/// Returns an error if the file cannot be opened or has no video stream.
pub fn probe(path: &Path) -> Result<VideoInfo> {
    init_ffmpeg();

    let ictx = ffmpeg::format::input(&path)
        .map_err(|e| ProcessingError::DecodeFailed(format!("Failed to open input file: {e}")))?;

    let stream = ictx
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or(ProcessingError::NoVideoStream)?;

    let fps = stream_frame_rate(&stream);
    let total_frames = stream_total_frames(&stream, &ictx, fps);

    let params = stream.parameters();
    let decoder = ffmpeg::codec::context::Context::from_parameters(params)
        .map_err(|e| ProcessingError::DecodeFailed(format!("Failed to create context: {e}")))?
        .decoder()
        .video()
        .map_err(|e| ProcessingError::DecodeFailed(format!("Failed to create decoder: {e}")))?;

    Ok(VideoInfo {
        path: path.to_path_buf(),
        total_frames,
        fps,
        width: decoder.width(),
        height: decoder.height(),
    })
}

/// FFmpeg-backed frame source
pub struct FfmpegFrameSource {
    ictx: ffmpeg::format::context::Input,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    start_seconds: f64,
    info: VideoInfo,
    /// Dense frame counter; `None` until re-anchored after a seek
    next_index: Option<u64>,
    /// Frames decoded before this index are pre-roll from a keyframe
    /// seek and are discarded
    skip_until: Option<u64>,
    eof: bool,
}

impl FfmpegFrameSource {
    /// Open a video for sequential frame reading
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, has no video
    /// stream, or the decoder/scaler cannot be created.
    pub fn open(path: &Path) -> Result<Self> {
        init_ffmpeg();

        let ictx = ffmpeg::format::input(&path)
            .map_err(|e| ProcessingError::DecodeFailed(format!("Failed to open input file: {e}")))?;

        let (stream_index, time_base, start_seconds, fps, total_frames, params) = {
            let stream = ictx
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or(ProcessingError::NoVideoStream)?;
            let fps = stream_frame_rate(&stream);
            let total_frames = stream_total_frames(&stream, &ictx, fps);
            (
                stream.index(),
                stream.time_base(),
                stream_start_seconds(&stream),
                fps,
                total_frames,
                stream.parameters(),
            )
        };

        let decoder = ffmpeg::codec::context::Context::from_parameters(params)
            .map_err(|e| ProcessingError::DecodeFailed(format!("Failed to create context: {e}")))?
            .decoder()
            .video()
            .map_err(|e| ProcessingError::DecodeFailed(format!("Failed to create decoder: {e}")))?;

        let width = decoder.width();
        let height = decoder.height();

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg::format::Pixel::RGB24,
            width,
            height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| ProcessingError::DecodeFailed(format!("Failed to create scaler: {e}")))?;

        debug!(
            "Opened {} ({}x{}, {:.3} fps, {} frames)",
            path.display(),
            width,
            height,
            fps,
            total_frames
        );

        Ok(Self {
            ictx,
            decoder,
            scaler,
            stream_index,
            time_base,
            start_seconds,
            info: VideoInfo {
                path: path.to_path_buf(),
                total_frames,
                fps,
                width,
                height,
            },
            next_index: Some(0),
            skip_until: None,
            eof: false,
        })
    }

    /// Feed the decoder the next video packet, or signal EOF
    fn pump_packet(&mut self) -> Result<()> {
        loop {
            let packet = match self.ictx.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() == self.stream_index {
                        Some(packet)
                    } else {
                        None
                    }
                }
                None => {
                    self.decoder.send_eof().ok();
                    self.eof = true;
                    return Ok(());
                }
            };

            if let Some(packet) = packet {
                self.decoder
                    .send_packet(&packet)
                    .map_err(|e| ProcessingError::DecodeFailed(format!("Failed to decode packet: {e}")))?;
                return Ok(());
            }
        }
    }

    /// Drain one frame from the decoder, applying index anchoring and
    /// post-seek pre-roll discard
    fn receive_next(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::util::frame::video::Video::empty();

        while self.decoder.receive_frame(&mut decoded).is_ok() {
            let raw_seconds = decoded.timestamp().unwrap_or(0) as f64
                * f64::from(self.time_base.0)
                / f64::from(self.time_base.1);
            let timestamp = raw_seconds - self.start_seconds;

            let index = match self.next_index {
                Some(index) => index,
                // First frame after a seek: anchor the dense counter on
                // the decoder-reported timestamp.
                None => (timestamp * self.info.fps).round().max(0.0) as u64,
            };
            self.next_index = Some(index + 1);

            if let Some(target) = self.skip_until {
                if index < target {
                    continue;
                }
                self.skip_until = None;
            }

            let mut converted = ffmpeg::util::frame::video::Video::empty();
            self.scaler
                .run(&decoded, &mut converted)
                .map_err(|e| ProcessingError::DecodeFailed(format!("Failed to convert frame: {e}")))?;

            return Ok(Some(Frame {
                index,
                timestamp,
                width: self.info.width,
                height: self.info.height,
                data: copy_rgb_data(&converted),
            }));
        }

        Ok(None)
    }
}

impl FrameSource for FfmpegFrameSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn seek_to_frame(&mut self, frame_index: u64) -> Result<()> {
        let seconds = self.start_seconds + frame_index as f64 / self.info.fps.max(1.0);
        let target = (seconds * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64;

        self.ictx
            .seek(target, ..target)
            .map_err(|e| ProcessingError::DecodeFailed(format!("Failed to seek: {e}")))?;
        self.decoder.flush();

        self.next_index = None;
        self.skip_until = Some(frame_index);
        self.eof = false;

        debug!("Seeked to frame {frame_index} ({seconds:.3}s)");
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.receive_next()? {
                return Ok(Some(frame));
            }
            if self.eof {
                return Ok(None);
            }
            self.pump_packet()?;
        }
    }
}

/// Copy RGB24 plane data into a contiguous, unpadded buffer
fn copy_rgb_data(frame: &ffmpeg::util::frame::video::Video) -> Vec<u8> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let stride = frame.stride(0);
    let plane = frame.data(0);

    let mut data = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let row_start = y * stride;
        data.extend_from_slice(&plane[row_start..row_start + width * 3]);
    }
    data
}

/// Opener for real video files
pub struct FfmpegOpener;

impl VideoOpener for FfmpegOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(FfmpegFrameSource::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_probe_missing_file() {
        let result = probe(&PathBuf::from("/nonexistent/clip.mp4"));
        assert!(matches!(result, Err(ProcessingError::DecodeFailed(_))));
    }

    #[test]
    fn test_open_missing_file() {
        let result = FfmpegFrameSource::open(&PathBuf::from("/nonexistent/clip.mp4"));
        assert!(result.is_err());
    }
}
