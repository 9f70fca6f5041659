use std::time::Instant;

use thiserror::Error;

pub const NUM_HAND_LANDMARKS: usize = 21;
pub const CHANNELS: usize = 3;

/// Byte order of the three channels of every pixel in a [`Frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelOrder {
    /// Order delivered by the capture path and expected by the preview window.
    Bgr,
    /// Order the landmark models are trained on.
    Rgb,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame buffer size mismatch: got {got}, expected {expected} for {width}x{height}")]
    SizeMismatch {
        got: usize,
        expected: usize,
        width: u32,
        height: u32,
    },
    #[error("frame has zero area ({width}x{height})")]
    Empty { width: u32, height: u32 },
}

/// One captured image: packed 3-channel pixels, row-major, no padding.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        order: ChannelOrder,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { width, height });
        }
        let expected = packed_len(width, height);
        if data.len() != expected {
            return Err(FrameError::SizeMismatch {
                got: data.len(),
                expected,
                width,
                height,
            });
        }

        Ok(Self {
            data,
            width,
            height,
            order,
            timestamp: Instant::now(),
        })
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * CHANNELS;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }
}

pub fn packed_len(width: u32, height: u32) -> usize {
    (width as usize)
        .saturating_mul(height as usize)
        .saturating_mul(CHANNELS)
}

/// A tracked point on a hand. `x`/`y` are normalized to the frame size,
/// `z` is depth relative to the wrist in roughly the scale of `x`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn is_visible(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }

    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        let px = (self.x * width as f32).floor().min(width.saturating_sub(1) as f32);
        let py = (self.y * height as f32)
            .floor()
            .min(height.saturating_sub(1) as f32);
        (px as i32, py as i32)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Handedness::Left => "Left",
            Handedness::Right => "Right",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HandRecord {
    pub landmarks: [Landmark; NUM_HAND_LANDMARKS],
    pub score: f32,
    pub handedness: Handedness,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    pub hands: Vec<HandRecord>,
}

impl DetectionResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.hands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hands.len()
    }
}

/// A palm found by the palm detector, in frame pixel coordinates.
#[derive(Clone, Debug)]
pub struct PalmRegion {
    pub bbox: [f32; 4],
    pub landmarks: Vec<(f32, f32)>,
    pub score: f32,
}
