use anyhow::{Context, Result};
use opencv::{
    core::{Mat, Point, Scalar},
    imgproc::{self, FILLED, LINE_8},
    prelude::*,
};

use super::display::frame_to_mat;
use crate::types::{DetectionResult, Frame, HandRecord, NUM_HAND_LANDMARKS};

/// Colors are BGR, matching the display-space frames they are drawn on.
type Bgr = [u8; 3];

const RED: Bgr = [48, 48, 255];
const GREEN: Bgr = [48, 255, 48];
const BLUE: Bgr = [192, 101, 21];
const YELLOW: Bgr = [0, 204, 255];
const GRAY: Bgr = [128, 128, 128];
const PURPLE: Bgr = [128, 64, 128];
const PEACH: Bgr = [180, 229, 255];
const WHITE: Bgr = [224, 224, 224];

const LANDMARK_RADIUS: i32 = 5;
const PALM_LINE_THICKNESS: i32 = 3;
const FINGER_LINE_THICKNESS: i32 = 2;

const PALM_CONNECTIONS: &[(usize, usize)] =
    &[(0, 1), (0, 5), (9, 13), (13, 17), (5, 9), (0, 17)];
const THUMB_CONNECTIONS: &[(usize, usize)] = &[(1, 2), (2, 3), (3, 4)];
const INDEX_CONNECTIONS: &[(usize, usize)] = &[(5, 6), (6, 7), (7, 8)];
const MIDDLE_CONNECTIONS: &[(usize, usize)] = &[(9, 10), (10, 11), (11, 12)];
const RING_CONNECTIONS: &[(usize, usize)] = &[(13, 14), (14, 15), (15, 16)];
const PINKY_CONNECTIONS: &[(usize, usize)] = &[(17, 18), (18, 19), (19, 20)];

#[derive(Clone, Copy, Debug)]
struct ConnectionStyle {
    connections: &'static [(usize, usize)],
    color: Bgr,
    thickness: i32,
}

const CONNECTION_STYLES: [ConnectionStyle; 6] = [
    ConnectionStyle {
        connections: PALM_CONNECTIONS,
        color: GRAY,
        thickness: PALM_LINE_THICKNESS,
    },
    ConnectionStyle {
        connections: THUMB_CONNECTIONS,
        color: PEACH,
        thickness: FINGER_LINE_THICKNESS,
    },
    ConnectionStyle {
        connections: INDEX_CONNECTIONS,
        color: PURPLE,
        thickness: FINGER_LINE_THICKNESS,
    },
    ConnectionStyle {
        connections: MIDDLE_CONNECTIONS,
        color: YELLOW,
        thickness: FINGER_LINE_THICKNESS,
    },
    ConnectionStyle {
        connections: RING_CONNECTIONS,
        color: GREEN,
        thickness: FINGER_LINE_THICKNESS,
    },
    ConnectionStyle {
        connections: PINKY_CONNECTIONS,
        color: BLUE,
        thickness: FINGER_LINE_THICKNESS,
    },
];

/// All 21 edges of the hand skeleton.
#[cfg(test)]
fn hand_connections() -> impl Iterator<Item = (usize, usize)> {
    CONNECTION_STYLES
        .iter()
        .flat_map(|style| style.connections.iter().copied())
}

fn landmark_color(index: usize) -> Bgr {
    match index {
        0 | 1 | 5 | 9 | 13 | 17 => RED,
        2..=4 => PEACH,
        6..=8 => PURPLE,
        10..=12 => YELLOW,
        14..=16 => GREEN,
        _ => BLUE,
    }
}

fn scalar(color: Bgr) -> Scalar {
    Scalar::new(color[0] as f64, color[1] as f64, color[2] as f64, 0.0)
}

/// Draws every hand of `result` onto `frame`. An empty result leaves the
/// frame untouched, and so does a drawing error.
pub fn render(frame: &mut Frame, result: &DetectionResult) -> Result<()> {
    if result.is_empty() {
        return Ok(());
    }

    let mut canvas = frame_to_mat(frame)?;
    for hand in &result.hands {
        draw_hand(&mut canvas, hand, frame.width, frame.height)?;
    }

    frame
        .data
        .copy_from_slice(canvas.data_bytes().context("overlay canvas is not continuous")?);
    Ok(())
}

fn draw_hand(canvas: &mut Mat, hand: &HandRecord, width: u32, height: u32) -> Result<()> {
    let points: [Option<Point>; NUM_HAND_LANDMARKS] = std::array::from_fn(|i| {
        let lm = hand.landmarks[i];
        lm.is_visible().then(|| {
            let (x, y) = lm.to_pixel(width, height);
            Point::new(x, y)
        })
    });

    for style in &CONNECTION_STYLES {
        for &(a, b) in style.connections {
            if let (Some(pa), Some(pb)) = (points[a], points[b]) {
                imgproc::line(
                    canvas,
                    pa,
                    pb,
                    scalar(style.color),
                    style.thickness,
                    LINE_8,
                    0,
                )
                .context("failed to draw skeleton edge")?;
            }
        }
    }

    let border_radius = (LANDMARK_RADIUS + 1).max((LANDMARK_RADIUS as f32 * 1.2) as i32);
    for (idx, point) in points.iter().enumerate() {
        if let Some(center) = *point {
            imgproc::circle(
                canvas,
                center,
                border_radius,
                scalar(WHITE),
                FILLED,
                LINE_8,
                0,
            )
            .context("failed to draw landmark border")?;
            imgproc::circle(
                canvas,
                center,
                LANDMARK_RADIUS,
                scalar(landmark_color(idx)),
                FILLED,
                LINE_8,
                0,
            )
            .context("failed to draw landmark")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CHANNELS, ChannelOrder, Handedness, Landmark};

    fn blank(width: u32, height: u32) -> Frame {
        Frame::new(
            vec![0; (width * height) as usize * CHANNELS],
            width,
            height,
            ChannelOrder::Bgr,
        )
        .unwrap()
    }

    fn hand_at(points: impl Fn(usize) -> (f32, f32)) -> HandRecord {
        HandRecord {
            landmarks: std::array::from_fn(|i| {
                let (x, y) = points(i);
                Landmark { x, y, z: 0.0 }
            }),
            score: 0.9,
            handedness: Handedness::Right,
        }
    }

    #[test]
    fn topology_has_21_unique_edges() {
        let mut edges: Vec<_> = hand_connections().collect();
        assert_eq!(edges.len(), 21);
        edges.sort_unstable();
        edges.dedup();
        assert_eq!(edges.len(), 21);
        assert!(edges.iter().all(|&(a, b)| a < 21 && b < 21));
    }

    #[test]
    fn zero_hands_leaves_pixels_unchanged() {
        let mut frame = blank(32, 24);
        frame.data.iter_mut().enumerate().for_each(|(i, b)| *b = i as u8);
        let before = frame.data.clone();
        render(&mut frame, &DetectionResult::empty()).unwrap();
        assert_eq!(frame.data, before);
    }

    #[test]
    fn draws_wrist_in_palm_color() {
        let mut frame = blank(400, 100);
        let hand = hand_at(|i| (0.05 + i as f32 * 0.045, 0.5));
        render(
            &mut frame,
            &DetectionResult {
                hands: vec![hand.clone()],
            },
        )
        .unwrap();

        let (wx, wy) = hand.landmarks[0].to_pixel(400, 100);
        assert_eq!(frame.pixel(wx as u32, wy as u32), Some(RED));
        let (tx, ty) = hand.landmarks[20].to_pixel(400, 100);
        assert_eq!(frame.pixel(tx as u32, ty as u32), Some(BLUE));
        // Between wrist and thumb base only palm edges pass.
        assert_eq!(frame.pixel(((wx + 38) / 2) as u32, wy as u32), Some(GRAY));
        assert_eq!(frame.pixel(0, 0), Some([0, 0, 0]));
    }

    #[test]
    fn skips_landmarks_outside_the_frame() {
        let mut frame = blank(50, 50);
        let hand = hand_at(|_| (1.5, -0.2));
        render(&mut frame, &DetectionResult { hands: vec![hand] }).unwrap();
        assert!(frame.data.iter().all(|&b| b == 0));
    }
}
