use super::{CaptureConstraints, CaptureSource, VideoFrame};
use crate::error::DeviceError;
use anyhow::{Context, Result};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;

pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    /// Open the camera with the format closest to `constraints` and start streaming
    pub fn acquire(device_index: u32, constraints: CaptureConstraints) -> Result<Self, DeviceError> {
        tracing::info!(
            "Initializing webcam {} at {}x{} @ {}fps",
            device_index,
            constraints.width,
            constraints.height,
            constraints.frame_rate
        );

        let index = CameraIndex::Index(device_index);
        let format = CameraFormat::new(
            Resolution::new(constraints.width, constraints.height),
            FrameFormat::MJPEG,
            constraints.frame_rate,
        );
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

        let mut camera = Camera::new(index, requested)?;
        camera.open_stream()?;

        let resolution = camera.resolution();
        tracing::info!(
            "Webcam initialized successfully ({}x{})",
            resolution.width(),
            resolution.height()
        );

        Ok(Self {
            camera,
            width: resolution.width(),
            height: resolution.height(),
        })
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<VideoFrame> {
        let frame = self
            .camera
            .frame()
            .context("Failed to capture frame")?;

        let decoded = frame.decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        Ok(decoded)
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
