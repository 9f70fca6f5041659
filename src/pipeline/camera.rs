use anyhow::{Result, anyhow};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    utils::{CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
};

use super::frame_decoder;
use crate::types::Frame;

// Prefer pixel formats that are widely supported on macOS (the built-in cameras
// often reject YUYV even though Nokhwa reports it).
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWBGR,
    FrameFormat::RAWRGB,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

fn requested_formats() -> [RequestedFormat<'static>; 4] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestResolution,
            PREFERRED_PIXEL_FORMATS,
        ),
        // Fall back to any format Nokhwa can decode, but prefer higher FPS to
        // avoid very low default rates (e.g. 15 FPS) that some drivers reject.
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

/// Result of one read from a [`FrameSource`].
#[derive(Debug)]
pub enum Acquired {
    Frame(Frame),
    /// Nothing usable this time; try again on the next iteration.
    Empty,
}

pub trait FrameSource {
    fn acquire(&mut self) -> Acquired;
}

/// The open capture device. The stream is stopped when this is dropped.
pub struct CameraSource {
    camera: Camera,
}

impl CameraSource {
    pub fn open(index: u32) -> Result<Self> {
        let camera = build_camera(CameraIndex::Index(index))?;
        let format = camera.camera_format();
        log::info!(
            "camera {index} opened: {} ({}x{} @ {} fps, {:?})",
            camera.info().human_name(),
            format.width(),
            format.height(),
            format.frame_rate(),
            format.format()
        );
        Ok(Self { camera })
    }
}

impl FrameSource for CameraSource {
    fn acquire(&mut self) -> Acquired {
        let buffer = match self.camera.frame() {
            Ok(buffer) => buffer,
            Err(err) => {
                log::warn!("empty frame, skipping: {err}");
                return Acquired::Empty;
            }
        };

        match frame_decoder::decode_camera_frame(&buffer) {
            Ok(frame) => Acquired::Frame(frame),
            Err(err) => {
                log::warn!("empty frame, skipping: {err:?}");
                Acquired::Empty
            }
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(err) = self.camera.stop_stream() {
            log::warn!("failed to stop camera stream: {err}");
        } else {
            log::info!("camera released");
        }
    }
}

fn build_camera(index: CameraIndex) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats() {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
}
