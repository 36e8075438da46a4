mod v4l_capture;

pub use v4l_capture::WebcamCapture;

use anyhow::Result;
use image::RgbImage;

/// One decoded camera frame
pub type VideoFrame = RgbImage;

/// What to ask the camera for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub frame_rate: u32,
    pub width: u32,
    pub height: u32,
}

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Capture a single frame
    fn capture_frame(&mut self) -> Result<VideoFrame>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}
