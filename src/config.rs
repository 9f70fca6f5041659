use std::path::PathBuf;

use crate::model_download::{
    default_handpose_estimator_model_path, default_palm_detector_model_path,
};

pub const WINDOW_TITLE: &str = "Hand Tracking (Press 'q' to Quit)";
pub const QUIT_KEY: char = 'q';
pub const KEY_WAIT_MS: i32 = 5;
pub const CAMERA_INDEX: u32 = 0;

/// Inference cost tier. Lower tiers trade accuracy for frame rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelComplexity {
    Lite,
    // The default preview runs Lite; Full is picked by editing `DetectorSettings`.
    #[allow(dead_code)]
    Full,
}

impl ModelComplexity {
    pub fn tier(&self) -> u8 {
        match self {
            ModelComplexity::Lite => 0,
            ModelComplexity::Full => 1,
        }
    }

    pub fn intra_threads(&self) -> usize {
        match self {
            ModelComplexity::Lite => 1,
            ModelComplexity::Full => 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectorSettings {
    pub max_hands: usize,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    pub model_complexity: ModelComplexity,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            max_hands: 2,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            model_complexity: ModelComplexity::Lite,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub camera_index: u32,
    pub detector: DetectorSettings,
    pub window_title: String,
    pub quit_key: char,
    pub key_wait_ms: i32,
    pub palm_model_path: PathBuf,
    pub handpose_model_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_index: CAMERA_INDEX,
            detector: DetectorSettings::default(),
            window_title: WINDOW_TITLE.to_string(),
            quit_key: QUIT_KEY,
            key_wait_ms: KEY_WAIT_MS,
            palm_model_path: default_palm_detector_model_path(),
            handpose_model_path: default_handpose_estimator_model_path(),
        }
    }
}
