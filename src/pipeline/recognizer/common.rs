use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use super::roi::HandRoi;
use crate::types::{CHANNELS, ChannelOrder, Frame, NUM_HAND_LANDMARKS, packed_len};

pub const INPUT_SIZE: u32 = 224;
pub const PALM_INPUT_SIZE: u32 = 192;

/// Raw handpose estimator output for one region, projected to frame pixels.
#[derive(Clone, Debug)]
pub struct HandposeOutput {
    /// `[x, y, z]` with `x`/`y` in frame pixels and `z` in the same pixel scale.
    pub landmarks: Vec<[f32; 3]>,
    pub confidence: f32,
    pub handedness: f32,
}

#[derive(Clone, Debug)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

/// Maps pixel coordinates of a rotated square crop back into the frame.
#[derive(Clone, Debug)]
pub struct CropTransform {
    pub roi: HandRoi,
    pub output_size: u32,
}

fn check_model_frame(frame: &Frame) -> Result<()> {
    if frame.order != ChannelOrder::Rgb {
        return Err(anyhow!(
            "landmark models expect RGB frames, got {:?}",
            frame.order
        ));
    }
    let expected_len = packed_len(frame.width, frame.height);
    if frame.data.len() != expected_len {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.data.len(),
            expected_len
        ));
    }
    Ok(())
}

/// Letterboxes `frame` into a `target_size` square, normalized to `[0, 1]`
/// in NHWC layout.
pub fn prepare_frame_with_size(
    frame: &Frame,
    target_size: u32,
) -> Result<(Array4<f32>, LetterboxInfo)> {
    check_model_frame(frame)?;

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = ((frame.width as f32 * scale).round().max(1.0) as u32).min(target_size);
    let new_h = ((frame.height as f32 * scale).round().max(1.0) as u32).min(target_size);

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.data.clone(),
        fir::PixelType::U8x3,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x3);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let pad_x = ((target_size - new_w) / 2) as usize;
    let pad_y = ((target_size - new_h) / 2) as usize;
    let mut canvas = vec![0u8; packed_len(target_size, target_size)];
    let dst_stride = target_size as usize * CHANNELS;
    let src_stride = new_w as usize * CHANNELS;
    for row in 0..(new_h as usize) {
        let dst_offset = (pad_y + row) * dst_stride + pad_x * CHANNELS;
        let src_offset = row * src_stride;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&resized[src_offset..src_offset + src_stride]);
    }

    let normalized: Vec<f32> = canvas.par_iter().map(|&v| v as f32 / 255.0).collect();
    let input = Array4::<f32>::from_shape_vec(
        (1, target_size as usize, target_size as usize, CHANNELS),
        normalized,
    )
    .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    let letterbox = LetterboxInfo {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    Ok((input, letterbox))
}

pub fn decode_landmarks(flat: &[f32]) -> Result<Vec<[f32; 3]>> {
    if flat.len() < NUM_HAND_LANDMARKS * 3 {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            NUM_HAND_LANDMARKS * 3
        ));
    }

    Ok(flat
        .chunks_exact(3)
        .take(NUM_HAND_LANDMARKS)
        .map(|chunk| [chunk[0], chunk[1], chunk[2]])
        .collect())
}

/// Samples the rotated square `roi` into an `output_size` square tensor,
/// bilinear, normalized to `[0, 1]`. Pixels outside the frame are black.
pub fn prepare_rotated_crop(
    frame: &Frame,
    roi: &HandRoi,
    output_size: u32,
) -> Result<(Array4<f32>, CropTransform)> {
    check_model_frame(frame)?;

    let transform = CropTransform {
        roi: roi.clone(),
        output_size,
    };

    let data: Vec<f32> = (0..output_size)
        .into_par_iter()
        .flat_map_iter(|y| {
            let transform = &transform;
            (0..output_size).flat_map(move |x| {
                let (src_x, src_y) = transform.to_frame(x as f32 + 0.5, y as f32 + 0.5);
                sample_rgb(frame, src_x - 0.5, src_y - 0.5)
            })
        })
        .collect();

    let array =
        Array4::<f32>::from_shape_vec((1, output_size as usize, output_size as usize, 3), data)
            .map_err(|err| anyhow!("failed to build rotated crop tensor: {err}"))?;

    Ok((array, transform))
}

impl CropTransform {
    /// Crop pixel coordinates to frame pixel coordinates, unclamped.
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let scale = self.roi.side / self.output_size as f32;
        let dx = (x - half) * scale;
        let dy = (y - half) * scale;
        let (sin, cos) = self.roi.angle.sin_cos();
        (
            self.roi.center.0 + dx * cos - dy * sin,
            self.roi.center.1 + dx * sin + dy * cos,
        )
    }

    pub fn project(&self, landmarks: &[[f32; 3]]) -> Vec<[f32; 3]> {
        let scale = self.roi.side / self.output_size as f32;
        landmarks
            .iter()
            .map(|&[x, y, z]| {
                let (fx, fy) = self.to_frame(x, y);
                [fx, fy, z * scale]
            })
            .collect()
    }
}

fn sample_rgb(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if x.is_nan() || y.is_nan() {
        return [0.0, 0.0, 0.0];
    }
    let x0 = x.floor();
    let y0 = y.floor();
    let x1 = x0 + 1.0;
    let y1 = y0 + 1.0;

    let (w, h) = (frame.width as i32, frame.height as i32);
    let fetch = |cx: f32, cy: f32| -> [f32; 3] {
        let ix = cx as i32;
        let iy = cy as i32;
        if ix < 0 || iy < 0 || ix >= w || iy >= h {
            return [0.0, 0.0, 0.0];
        }
        let idx = (iy as usize * frame.width as usize + ix as usize) * CHANNELS;
        [
            frame.data[idx] as f32 / 255.0,
            frame.data[idx + 1] as f32 / 255.0,
            frame.data[idx + 2] as f32 / 255.0,
        ]
    };

    let fx = x - x0;
    let fy = y - y0;
    let c00 = fetch(x0, y0);
    let c10 = fetch(x1, y0);
    let c01 = fetch(x0, y1);
    let c11 = fetch(x1, y1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    [
        lerp(lerp(c00[0], c10[0], fx), lerp(c01[0], c11[0], fx), fy),
        lerp(lerp(c00[1], c10[1], fx), lerp(c01[1], c11[1], fx), fy),
        lerp(lerp(c00[2], c10[2], fx), lerp(c01[2], c11[2], fx), fy),
    ]
}
