//! Rotated square regions that the handpose estimator is run on.
//!
//! `angle` rotates crop axes into frame axes; an angle of zero means the
//! fingers point toward the top of the frame.

use crate::types::PalmRegion;

const PALM_WRIST: usize = 0;
const PALM_MIDDLE_MCP: usize = 2;
const PALM_SCALE: f32 = 2.6;
const PALM_SHIFT_Y: f32 = -0.5;

const WRIST: usize = 0;
const MIDDLE_MCP: usize = 9;
const TRACKING_SCALE: f32 = 2.0;
const TRACKING_SHIFT_Y: f32 = -0.1;
// Palm and finger bases; fingertips move too fast to anchor the next crop.
const TRACKING_POINTS: [usize; 12] = [0, 1, 2, 3, 5, 6, 9, 10, 13, 14, 17, 18];

#[derive(Clone, Debug, PartialEq)]
pub struct HandRoi {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
}

impl HandRoi {
    pub fn from_palm(region: &PalmRegion) -> Self {
        let [x1, y1, x2, y2] = region.bbox;
        let (w, h) = ((x2 - x1).abs(), (y2 - y1).abs());
        let center = ((x1 + x2) * 0.5, (y1 + y2) * 0.5);

        let angle = match (
            region.landmarks.get(PALM_WRIST),
            region.landmarks.get(PALM_MIDDLE_MCP),
        ) {
            (Some(&wrist), Some(&mcp)) => upright_angle(wrist, mcp),
            _ => 0.0,
        };

        Self {
            center: shift(center, angle, PALM_SHIFT_Y * h),
            side: w.max(h) * PALM_SCALE,
            angle,
        }
    }

    /// Region for the next frame, derived from landmarks in frame pixels.
    pub fn from_landmarks(landmarks: &[[f32; 3]]) -> Option<Self> {
        let points: Vec<(f32, f32)> = TRACKING_POINTS
            .iter()
            .map(|&i| landmarks.get(i).map(|p| (p[0], p[1])))
            .collect::<Option<_>>()?;

        let wrist = landmarks.get(WRIST)?;
        let knuckle = landmarks.get(MIDDLE_MCP)?;
        let angle = upright_angle((wrist[0], wrist[1]), (knuckle[0], knuckle[1]));

        let (min_x, max_x, min_y, max_y) = extent(&points);
        let origin = ((min_x + max_x) * 0.5, (min_y + max_y) * 0.5);

        let unrotated: Vec<(f32, f32)> = points
            .iter()
            .map(|&(x, y)| rotate((x - origin.0, y - origin.1), -angle))
            .collect();
        let (min_x, max_x, min_y, max_y) = extent(&unrotated);
        let (w, h) = (max_x - min_x, max_y - min_y);
        if !(w.is_finite() && h.is_finite()) || w.max(h) <= 0.0 {
            return None;
        }

        let local_center = rotate(((min_x + max_x) * 0.5, (min_y + max_y) * 0.5), angle);
        let center = (origin.0 + local_center.0, origin.1 + local_center.1);

        Some(Self {
            center: shift(center, angle, TRACKING_SHIFT_Y * h),
            side: w.max(h) * TRACKING_SCALE,
            angle,
        })
    }

    /// Axis-aligned bounds `[x1, y1, x2, y2]` of the rotated square.
    pub fn bounds(&self) -> [f32; 4] {
        let (sin, cos) = self.angle.sin_cos();
        let half = self.side * 0.5 * (cos.abs() + sin.abs());
        [
            self.center.0 - half,
            self.center.1 - half,
            self.center.0 + half,
            self.center.1 + half,
        ]
    }
}

/// Rotation that brings the wrist-to-knuckle direction to "up".
fn upright_angle(wrist: (f32, f32), knuckle: (f32, f32)) -> f32 {
    let (vx, vy) = (knuckle.0 - wrist.0, knuckle.1 - wrist.1);
    if vx == 0.0 && vy == 0.0 {
        return 0.0;
    }
    vx.atan2(-vy)
}

fn rotate((x, y): (f32, f32), angle: f32) -> (f32, f32) {
    let (sin, cos) = angle.sin_cos();
    (x * cos - y * sin, x * sin + y * cos)
}

// Moves `center` along the crop's vertical axis.
fn shift(center: (f32, f32), angle: f32, amount: f32) -> (f32, f32) {
    let (dx, dy) = rotate((0.0, amount), angle);
    (center.0 + dx, center.1 + dy)
}

fn extent(points: &[(f32, f32)]) -> (f32, f32, f32, f32) {
    points.iter().fold(
        (f32::MAX, f32::MIN, f32::MAX, f32::MIN),
        |acc, &(x, y)| (acc.0.min(x), acc.1.max(x), acc.2.min(y), acc.3.max(y)),
    )
}

pub fn landmark_bounds(landmarks: &[[f32; 3]]) -> [f32; 4] {
    let points: Vec<(f32, f32)> = landmarks.iter().map(|p| (p[0], p[1])).collect();
    let (min_x, max_x, min_y, max_y) = extent(&points);
    [min_x, min_y, max_x, max_y]
}

pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter_w = (x2 - x1).max(0.0);
    let inter_h = (y2 - y1).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    fn palm(wrist: (f32, f32), mcp: (f32, f32), bbox: [f32; 4]) -> PalmRegion {
        let mut landmarks = vec![(0.0, 0.0); 7];
        landmarks[PALM_WRIST] = wrist;
        landmarks[PALM_MIDDLE_MCP] = mcp;
        PalmRegion {
            bbox,
            landmarks,
            score: 0.9,
        }
    }

    /// An upright hand: wrist at the bottom, fingers spread above it.
    fn upright_hand(cx: f32, wrist_y: f32, size: f32) -> Vec<[f32; 3]> {
        (0..21)
            .map(|i| {
                if i == 0 {
                    return [cx, wrist_y, 0.0];
                }
                let finger = (i - 1) / 4;
                let joint = (i - 1) % 4 + 1;
                let x = cx + (finger as f32 - 2.0) * size * 0.2;
                let y = wrist_y - size * 0.3 - joint as f32 * size * 0.15;
                [x, y, 0.0]
            })
            .collect()
    }

    #[test]
    fn upright_palm_shifts_toward_fingers() {
        let region = palm((100.0, 200.0), (100.0, 150.0), [80.0, 140.0, 120.0, 210.0]);
        let roi = HandRoi::from_palm(&region);
        assert!(approx(roi.angle, 0.0));
        assert!(approx(roi.center.0, 100.0));
        assert!(approx(roi.center.1, 140.0));
        assert!(approx(roi.side, 70.0 * 2.6));
    }

    #[test]
    fn sideways_palm_rotates_a_quarter_turn() {
        let region = palm((100.0, 100.0), (150.0, 100.0), [90.0, 80.0, 160.0, 120.0]);
        let roi = HandRoi::from_palm(&region);
        assert!(approx(roi.angle, FRAC_PI_2));
        // Shifted toward the fingers, i.e. to the right.
        assert!(roi.center.0 > 125.0);
        assert!(approx(roi.center.1, 100.0));
    }

    #[test]
    fn landmark_roi_follows_the_hand() {
        let hand = upright_hand(300.0, 400.0, 100.0);
        let roi = HandRoi::from_landmarks(&hand).unwrap();
        assert!(approx(roi.angle, 0.0));
        assert!(approx(roi.center.0, 300.0));
        assert!(roi.center.1 < 400.0);
        assert!(roi.side > 100.0);
    }

    #[test]
    fn landmark_roi_needs_full_hand() {
        let hand = upright_hand(0.0, 0.0, 10.0);
        assert!(HandRoi::from_landmarks(&hand[..10]).is_none());
    }

    #[test]
    fn rotated_bounds_grow() {
        let roi = HandRoi {
            center: (0.0, 0.0),
            side: 2.0,
            angle: std::f32::consts::FRAC_PI_4,
        };
        let [x1, _, x2, _] = roi.bounds();
        assert!(approx(x2 - x1, 2.0 * std::f32::consts::SQRT_2));
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = [0.0, 0.0, 10.0, 10.0];
        assert!(approx(iou(&a, &a), 1.0));
        assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
        assert!(approx(iou(&a, &[5.0, 0.0, 15.0, 10.0]), 50.0 / 150.0));
    }
}
