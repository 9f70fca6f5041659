use anyhow::{Result, anyhow};
use nokhwa::{Buffer, utils::FrameFormat};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgb, yuyv422_to_rgb,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use super::color::swap_red_blue;
use crate::types::{CHANNELS, ChannelOrder, Frame};

/// Decodes a raw camera buffer into a display-space (BGR) frame.
pub fn decode_camera_frame(buffer: &Buffer) -> Result<Frame> {
    let resolution = buffer.resolution();
    decode(
        buffer.source_frame_format(),
        buffer.buffer(),
        resolution.width_x,
        resolution.height_y,
    )
}

pub fn decode(format: FrameFormat, data: &[u8], width: u32, height: u32) -> Result<Frame> {
    if data.is_empty() {
        return Err(anyhow!("camera returned an empty buffer"));
    }

    let (mut pixels, width, height) = match format {
        FrameFormat::NV12 => (nv12_to_rgb(data, width, height)?, width, height),
        FrameFormat::YUYV => (yuyv_to_rgb(data, width, height)?, width, height),
        FrameFormat::MJPEG => mjpeg_to_rgb(data)?,
        FrameFormat::RAWRGB => (packed_bytes(data, width, height)?, width, height),
        FrameFormat::RAWBGR => {
            let bgr = packed_bytes(data, width, height)?;
            return Ok(Frame::new(bgr, width, height, ChannelOrder::Bgr)?);
        }
        FrameFormat::GRAY => (gray_to_rgb(data, width, height)?, width, height),
    };

    swap_red_blue(&mut pixels);
    Ok(Frame::new(pixels, width, height, ChannelOrder::Bgr)?)
}

fn nv12_to_rgb(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    // Interleaved chroma covers 2x2 luma blocks, rounded up on odd sizes.
    let uv_stride = width.div_ceil(2) * 2;
    let y_plane_len = width as usize * height as usize;
    let uv_plane_len = uv_stride as usize * height.div_ceil(2) as usize;

    if data.len() < y_plane_len + uv_plane_len {
        return Err(anyhow!(
            "NV12 buffer too small: got {}, expected {}",
            data.len(),
            y_plane_len + uv_plane_len
        ));
    }

    let image = YuvBiPlanarImage {
        y_plane: &data[..y_plane_len],
        y_stride: width,
        uv_plane: &data[y_plane_len..y_plane_len + uv_plane_len],
        uv_stride,
        width,
        height,
    };

    let mut rgb = vec![0u8; y_plane_len * CHANNELS];
    yuv_nv12_to_rgb(
        &image,
        &mut rgb,
        width * CHANNELS as u32,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12→RGB failed: {err:?}"))?;

    Ok(rgb)
}

fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    // Each 4-byte macropixel carries two luma samples.
    let yuy_stride = width.div_ceil(2) * 4;
    let expected_len = yuy_stride as usize * height as usize;
    if data.len() < expected_len {
        return Err(anyhow!(
            "YUYV buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }

    let packed = YuvPackedImage {
        yuy: &data[..expected_len],
        yuy_stride,
        width,
        height,
    };

    let mut rgb = vec![0u8; width as usize * height as usize * CHANNELS];
    yuyv422_to_rgb(
        &packed,
        &mut rgb,
        width * CHANNELS as u32,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422→RGB failed: {err:?}"))?;

    Ok(rgb)
}

// MJPEG carries its own dimensions; trust those over the negotiated format.
fn mjpeg_to_rgb(data: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGB);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgb = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("MJPEG decoder produced no image info"))?;
    let width = u32::try_from(info.width).map_err(|_| anyhow!("MJPEG width does not fit u32"))?;
    let height =
        u32::try_from(info.height).map_err(|_| anyhow!("MJPEG height does not fit u32"))?;
    let expected_len = width as usize * height as usize * CHANNELS;
    if rgb.len() < expected_len {
        return Err(anyhow!(
            "MJPEG decode produced too few bytes: got {}, expected {}",
            rgb.len(),
            expected_len
        ));
    }

    Ok((rgb, width, height))
}

fn packed_bytes(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize * CHANNELS;
    if data.len() < expected_len {
        return Err(anyhow!(
            "RGB buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }
    Ok(data[..expected_len].to_vec())
}

fn gray_to_rgb(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize;
    if data.len() < expected_len {
        return Err(anyhow!(
            "GRAY buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }

    let mut rgb = vec![0u8; expected_len * CHANNELS];
    rgb.par_chunks_mut(CHANNELS)
        .zip(data[..expected_len].par_iter().copied())
        .for_each(|(dst, value)| dst.fill(value));

    Ok(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_rgb_becomes_bgr() {
        let frame = decode(FrameFormat::RAWRGB, &[1, 2, 3, 4, 5, 6], 2, 1).unwrap();
        assert_eq!(frame.order, ChannelOrder::Bgr);
        assert_eq!(frame.data, vec![3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn raw_bgr_is_kept_as_is() {
        let frame = decode(FrameFormat::RAWBGR, &[1, 2, 3, 4, 5, 6], 2, 1).unwrap();
        assert_eq!(frame.data, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn gray_expands_to_three_channels() {
        let frame = decode(FrameFormat::GRAY, &[7, 9], 2, 1).unwrap();
        assert_eq!(frame.data, vec![7, 7, 7, 9, 9, 9]);
    }

    fn assert_neutral_gray(frame: &Frame, width: u32, height: u32) {
        assert_eq!((frame.width, frame.height), (width, height));
        assert_eq!(frame.order, ChannelOrder::Bgr);
        assert_eq!(frame.data.len(), (width * height) as usize * CHANNELS);
        for px in frame.data.chunks_exact(CHANNELS) {
            assert!(px.iter().all(|&v| (120..=136).contains(&v)), "{px:?}");
            assert_eq!(px[0], px[2]);
        }
    }

    #[test]
    fn nv12_gray_decodes() {
        // 4x2: 8 luma bytes, one row of 4 interleaved chroma bytes.
        let frame = decode(FrameFormat::NV12, &[128; 12], 4, 2).unwrap();
        assert_neutral_gray(&frame, 4, 2);
    }

    #[test]
    fn nv12_odd_height_decodes() {
        // 4x3: 12 luma bytes, chroma rows rounded up to 2.
        let frame = decode(FrameFormat::NV12, &[128; 20], 4, 3).unwrap();
        assert_neutral_gray(&frame, 4, 3);
    }

    #[test]
    fn yuyv_gray_decodes() {
        let frame = decode(FrameFormat::YUYV, &[128; 16], 4, 2).unwrap();
        assert_neutral_gray(&frame, 4, 2);
    }

    #[test]
    fn short_or_empty_buffers_are_errors() {
        assert!(decode(FrameFormat::RAWRGB, &[1, 2, 3], 2, 1).is_err());
        assert!(decode(FrameFormat::YUYV, &[], 2, 1).is_err());
        assert!(decode(FrameFormat::NV12, &[0; 4], 4, 4).is_err());
    }
}
