use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    HandposeEngine,
    common::{self, HandposeOutput},
    roi::HandRoi,
};
use crate::{config::ModelComplexity, types::Frame};

pub(crate) fn build_session(model_path: &Path, complexity: ModelComplexity) -> Result<Session> {
    let level = match complexity {
        ModelComplexity::Lite => GraphOptimizationLevel::Level1,
        ModelComplexity::Full => GraphOptimizationLevel::Level3,
    };

    let session = Session::builder()?
        .with_optimization_level(level)?
        .with_intra_threads(complexity.intra_threads())?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load ORT session from {}", model_path.display()))?;
    Ok(session)
}

/// 21-point hand landmark model run on a rotated crop around one hand.
pub struct HandposeEstimator {
    session: Session,
}

impl HandposeEstimator {
    pub fn new(model_path: &Path, complexity: ModelComplexity) -> Result<Self> {
        let session = build_session(model_path, complexity)?;
        Ok(Self { session })
    }
}

impl HandposeEngine for HandposeEstimator {
    fn estimate(&mut self, frame: &Frame, roi: &HandRoi) -> Result<HandposeOutput> {
        let (input, transform) = common::prepare_rotated_crop(frame, roi, common::INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run ORT session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("model returned no outputs"));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let landmarks = common::decode_landmarks(&flattened)?;

        let scalar_output = |idx: usize| {
            if outputs.len() > idx {
                outputs[idx]
                    .try_extract_array::<f32>()
                    .ok()
                    .and_then(|arr| arr.iter().next().copied())
                    .unwrap_or(0.0)
            } else {
                0.0
            }
        };
        let confidence = scalar_output(1);
        let handedness = scalar_output(2);

        Ok(HandposeOutput {
            landmarks: transform.project(&landmarks),
            confidence: confidence.clamp(0.0, 1.0),
            handedness,
        })
    }
}
