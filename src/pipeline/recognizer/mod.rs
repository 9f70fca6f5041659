mod common;
mod ort;
mod palm;
mod roi;

use std::path::Path;

use anyhow::Result;

use self::{
    common::HandposeOutput,
    ort::HandposeEstimator,
    palm::{PalmDetector, PalmDetectorConfig},
    roi::{HandRoi, iou, landmark_bounds},
};
use crate::{
    config::DetectorSettings,
    model_download::{ensure_handpose_estimator_model_ready, ensure_palm_detector_model_ready},
    types::{
        DetectionResult, Frame, HandRecord, Handedness, Landmark, NUM_HAND_LANDMARKS, PalmRegion,
    },
};

// Regions or hands overlapping more than this are treated as the same hand.
const SAME_HAND_IOU: f32 = 0.5;

/// Finds hand landmarks in model-space frames.
pub trait LandmarkDetector {
    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult>;
}

pub(crate) trait PalmEngine {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<PalmRegion>>;
}

pub(crate) trait HandposeEngine {
    fn estimate(&mut self, frame: &Frame, roi: &HandRoi) -> Result<HandposeOutput>;
}

/// The long-lived detector session: palm detection to find new hands,
/// landmark estimation on regions carried over from the previous frame to
/// follow known ones.
pub struct HandTracker<P, H> {
    palm: P,
    handpose: H,
    settings: DetectorSettings,
    tracked: Vec<HandRoi>,
}

pub type OrtHandTracker = HandTracker<PalmDetector, HandposeEstimator>;

impl OrtHandTracker {
    /// Fetches missing models and loads both ORT sessions.
    pub fn open(
        palm_model_path: &Path,
        handpose_model_path: &Path,
        settings: DetectorSettings,
    ) -> Result<Self> {
        ensure_palm_detector_model_ready(palm_model_path, |_evt| {})?;
        ensure_handpose_estimator_model_ready(handpose_model_path, |_evt| {})?;

        let palm = PalmDetector::new(
            palm_model_path,
            settings.model_complexity,
            PalmDetectorConfig {
                score_threshold: settings.min_detection_confidence,
                ..PalmDetectorConfig::default()
            },
        )?;
        let handpose = HandposeEstimator::new(handpose_model_path, settings.model_complexity)?;

        log::info!(
            "hand tracker ready (max {} hands, complexity {}) using {} and {}",
            settings.max_hands,
            settings.model_complexity.tier(),
            palm_model_path.display(),
            handpose_model_path.display()
        );

        Ok(HandTracker::new(palm, handpose, settings))
    }
}

impl<P, H> HandTracker<P, H>
where
    P: PalmEngine,
    H: HandposeEngine,
{
    pub(crate) fn new(palm: P, handpose: H, settings: DetectorSettings) -> Self {
        Self {
            palm,
            handpose,
            settings,
            tracked: Vec::new(),
        }
    }

    fn candidate_regions(&mut self, frame: &Frame) -> Result<Vec<HandRoi>> {
        let mut regions = std::mem::take(&mut self.tracked);
        regions.truncate(self.settings.max_hands);
        if regions.len() >= self.settings.max_hands {
            return Ok(regions);
        }

        let palms = self.palm.detect(frame)?;
        for palm in palms {
            if regions.len() >= self.settings.max_hands {
                break;
            }
            let roi = HandRoi::from_palm(&palm);
            let bounds = roi.bounds();
            if regions
                .iter()
                .any(|known| iou(&known.bounds(), &bounds) > SAME_HAND_IOU)
            {
                continue;
            }
            regions.push(roi);
        }
        Ok(regions)
    }

    fn track(&mut self, frame: &Frame) -> Result<DetectionResult> {
        let regions = self.candidate_regions(frame)?;

        let mut kept: Vec<(HandposeOutput, [f32; 4])> = Vec::with_capacity(regions.len());
        for roi in &regions {
            let output = self.handpose.estimate(frame, roi)?;
            if output.confidence < self.settings.min_tracking_confidence {
                continue;
            }
            let bounds = landmark_bounds(&output.landmarks);
            if kept.iter().any(|(_, other)| iou(other, &bounds) > SAME_HAND_IOU) {
                continue;
            }
            kept.push((output, bounds));
        }

        self.tracked = kept
            .iter()
            .filter_map(|(output, _)| HandRoi::from_landmarks(&output.landmarks))
            .collect();

        let hands = kept
            .into_iter()
            .filter_map(|(output, _)| to_hand_record(&output, frame.width, frame.height))
            .collect();
        Ok(DetectionResult { hands })
    }
}

impl<P, H> LandmarkDetector for HandTracker<P, H>
where
    P: PalmEngine,
    H: HandposeEngine,
{
    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult> {
        let result = self.track(frame);
        if result.is_err() {
            self.tracked.clear();
        }
        result
    }
}

impl<P, H> Drop for HandTracker<P, H> {
    fn drop(&mut self) {
        log::info!("hand tracker released");
    }
}

fn to_hand_record(output: &HandposeOutput, width: u32, height: u32) -> Option<HandRecord> {
    if output.landmarks.len() < NUM_HAND_LANDMARKS {
        return None;
    }
    let (w, h) = (width as f32, height as f32);
    let landmarks: [Landmark; NUM_HAND_LANDMARKS] = std::array::from_fn(|i| {
        let [x, y, z] = output.landmarks[i];
        Landmark {
            x: x / w,
            y: y / h,
            z: z / w,
        }
    });

    Some(HandRecord {
        landmarks,
        score: output.confidence,
        handedness: Handedness::from_score(output.handedness),
    })
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use anyhow::anyhow;

    use super::*;
    use crate::types::ChannelOrder;

    #[derive(Clone, Default)]
    struct Calls {
        palm: Rc<Cell<usize>>,
        handpose: Rc<Cell<usize>>,
    }

    struct FakePalm {
        palms: Vec<PalmRegion>,
        calls: Rc<Cell<usize>>,
        fail: bool,
    }

    impl PalmEngine for FakePalm {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<PalmRegion>> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(anyhow!("palm model failed"));
            }
            Ok(self.palms.clone())
        }
    }

    /// Reports an upright hand filling the region it is given.
    struct FakeHandpose {
        confidence: f32,
        calls: Rc<Cell<usize>>,
    }

    impl HandposeEngine for FakeHandpose {
        fn estimate(&mut self, _frame: &Frame, roi: &HandRoi) -> Result<HandposeOutput> {
            self.calls.set(self.calls.get() + 1);
            let (cx, cy) = roi.center;
            let size = roi.side / 2.0;
            let landmarks = (0..NUM_HAND_LANDMARKS)
                .map(|i| {
                    if i == 0 {
                        return [cx, cy + size * 0.5, 0.0];
                    }
                    let finger = (i - 1) / 4;
                    let joint = (i - 1) % 4 + 1;
                    [
                        cx + (finger as f32 - 2.0) * size * 0.2,
                        cy + size * 0.5 - size * 0.3 - joint as f32 * size * 0.15,
                        0.0,
                    ]
                })
                .collect();
            Ok(HandposeOutput {
                landmarks,
                confidence: self.confidence,
                handedness: 0.9,
            })
        }
    }

    fn frame() -> Frame {
        Frame::new(vec![0; 640 * 480 * 3], 640, 480, ChannelOrder::Rgb).unwrap()
    }

    fn palm_at(cx: f32, cy: f32, score: f32) -> PalmRegion {
        let mut landmarks = vec![(cx, cy); 7];
        landmarks[0] = (cx, cy + 20.0);
        landmarks[2] = (cx, cy - 20.0);
        PalmRegion {
            bbox: [cx - 30.0, cy - 30.0, cx + 30.0, cy + 30.0],
            landmarks,
            score,
        }
    }

    fn tracker(
        palms: Vec<PalmRegion>,
        confidence: f32,
    ) -> (HandTracker<FakePalm, FakeHandpose>, Calls) {
        let calls = Calls::default();
        let tracker = HandTracker::new(
            FakePalm {
                palms,
                calls: calls.palm.clone(),
                fail: false,
            },
            FakeHandpose {
                confidence,
                calls: calls.handpose.clone(),
            },
            DetectorSettings::default(),
        );
        (tracker, calls)
    }

    #[test]
    fn no_palms_means_no_hands() {
        let (mut tracker, calls) = tracker(Vec::new(), 0.9);
        let result = tracker.detect(&frame()).unwrap();
        assert!(result.is_empty());
        assert_eq!(calls.handpose.get(), 0);
    }

    #[test]
    fn reports_normalized_landmarks_for_each_palm() {
        let palms = vec![palm_at(160.0, 240.0, 0.9), palm_at(480.0, 240.0, 0.8)];
        let (mut tracker, _) = tracker(palms, 0.9);
        let result = tracker.detect(&frame()).unwrap();
        assert_eq!(result.len(), 2);
        for hand in &result.hands {
            assert!(hand.landmarks.iter().all(|lm| lm.is_visible()));
            assert_eq!(hand.handedness, Handedness::Right);
        }
        assert!(result.hands[0].landmarks[0].x < 0.5);
        assert!(result.hands[1].landmarks[0].x > 0.5);
    }

    #[test]
    fn caps_hands_at_max() {
        let palms = vec![
            palm_at(100.0, 100.0, 0.9),
            palm_at(320.0, 240.0, 0.8),
            palm_at(540.0, 380.0, 0.7),
        ];
        let (mut tracker, calls) = tracker(palms, 0.9);
        let result = tracker.detect(&frame()).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(calls.handpose.get(), 2);
    }

    #[test]
    fn skips_palm_detection_while_max_hands_are_tracked() {
        let palms = vec![palm_at(160.0, 240.0, 0.9), palm_at(480.0, 240.0, 0.8)];
        let (mut tracker, calls) = tracker(palms, 0.9);
        tracker.detect(&frame()).unwrap();
        assert_eq!(tracker.tracked.len(), 2);

        let result = tracker.detect(&frame()).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(calls.palm.get(), 1);
    }

    #[test]
    fn tracked_hand_is_not_duplicated_by_palm() {
        let (mut tracker, calls) = tracker(vec![palm_at(320.0, 240.0, 0.9)], 0.9);
        tracker.detect(&frame()).unwrap();
        assert_eq!(tracker.tracked.len(), 1);

        // One hand tracked, so the palm detector runs again and finds the
        // same hand; it must not become a second record.
        let result = tracker.detect(&frame()).unwrap();
        assert_eq!(calls.palm.get(), 2);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn low_presence_drops_the_hand() {
        let (mut tracker, _) = tracker(vec![palm_at(320.0, 240.0, 0.9)], 0.3);
        let result = tracker.detect(&frame()).unwrap();
        assert!(result.is_empty());
        assert_eq!(tracker.tracked.len(), 0);
    }

    #[test]
    fn failure_resets_tracking() {
        let (mut tracker, _) = tracker(vec![palm_at(320.0, 240.0, 0.9)], 0.9);
        tracker.detect(&frame()).unwrap();
        assert_eq!(tracker.tracked.len(), 1);

        tracker.palm.fail = true;
        assert!(tracker.detect(&frame()).is_err());
        assert_eq!(tracker.tracked.len(), 0);
    }
}
