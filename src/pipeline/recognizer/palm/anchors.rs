//! SSD anchor centers for the 192x192 palm detection model.

use std::sync::OnceLock;

use crate::pipeline::recognizer::common::PALM_INPUT_SIZE;

pub const NUM_ANCHORS: usize = 2016;

const STRIDES: [u32; 4] = [8, 16, 16, 16];
// One anchor for the aspect ratio 1.0 plus one interpolated-scale anchor.
const ANCHORS_PER_LAYER: usize = 2;
const ANCHOR_OFFSET: f32 = 0.5;

/// Normalized `[x, y]` anchor centers in model output order.
pub fn anchors() -> &'static [[f32; 2]] {
    static ANCHORS: OnceLock<Vec<[f32; 2]>> = OnceLock::new();
    ANCHORS.get_or_init(|| generate(PALM_INPUT_SIZE, &STRIDES))
}

fn generate(input_size: u32, strides: &[u32]) -> Vec<[f32; 2]> {
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    let mut layer = 0;
    while layer < strides.len() {
        // Consecutive layers with the same stride share one feature map.
        let stride = strides[layer];
        let mut per_cell = 0;
        while layer < strides.len() && strides[layer] == stride {
            per_cell += ANCHORS_PER_LAYER;
            layer += 1;
        }

        let feature_size = input_size.div_ceil(stride);
        for y in 0..feature_size {
            let cy = (y as f32 + ANCHOR_OFFSET) / feature_size as f32;
            for x in 0..feature_size {
                let cx = (x as f32 + ANCHOR_OFFSET) / feature_size as f32;
                anchors.extend(std::iter::repeat_n([cx, cy], per_cell));
            }
        }
    }
    anchors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palm_model_anchor_layout() {
        let anchors = anchors();
        assert_eq!(anchors.len(), NUM_ANCHORS);
        // 24x24 cells with 2 anchors each, then 12x12 cells with 6.
        assert_eq!(anchors[0], [0.5 / 24.0, 0.5 / 24.0]);
        assert_eq!(anchors[1], anchors[0]);
        assert_eq!(anchors[2], [1.5 / 24.0, 0.5 / 24.0]);
        assert_eq!(anchors[1152], [0.5 / 12.0, 0.5 / 12.0]);
        assert_eq!(anchors[1157], anchors[1152]);
        assert_eq!(anchors[1158], [1.5 / 12.0, 0.5 / 12.0]);
        assert_eq!(anchors[NUM_ANCHORS - 1], [11.5 / 12.0, 11.5 / 12.0]);
    }
}
