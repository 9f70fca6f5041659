use rayon::prelude::*;

use crate::types::{CHANNELS, ChannelOrder, Frame};

pub fn to_model_space(frame: Frame) -> Frame {
    convert(frame, ChannelOrder::Rgb)
}

pub fn to_display_space(frame: Frame) -> Frame {
    convert(frame, ChannelOrder::Bgr)
}

fn convert(mut frame: Frame, target: ChannelOrder) -> Frame {
    if frame.order != target {
        swap_red_blue(&mut frame.data);
        frame.order = target;
    }
    frame
}

/// BGR <-> RGB in place. The permutation is its own inverse.
pub fn swap_red_blue(data: &mut [u8]) {
    data.par_chunks_exact_mut(CHANNELS).for_each(|px| px.swap(0, 2));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bgr_frame() -> Frame {
        Frame::new(vec![10, 20, 30, 40, 50, 60], 2, 1, ChannelOrder::Bgr).unwrap()
    }

    #[test]
    fn model_space_is_rgb() {
        let frame = to_model_space(bgr_frame());
        assert_eq!(frame.order, ChannelOrder::Rgb);
        assert_eq!(frame.data, vec![30, 20, 10, 60, 50, 40]);
    }

    #[test]
    fn round_trip_restores_order_and_bytes() {
        let source = bgr_frame();
        let back = to_display_space(to_model_space(source.clone()));
        assert_eq!(back.order, source.order);
        assert_eq!(back.data, source.data);
    }

    #[test]
    fn converting_to_current_order_is_noop() {
        let frame = to_display_space(bgr_frame());
        assert_eq!(frame.data, bgr_frame().data);
    }
}
