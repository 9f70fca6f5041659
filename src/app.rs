use anyhow::Result;
use thiserror::Error;

use crate::{
    config::Config,
    pipeline::{
        Acquired, CameraSource, FrameSource, HighguiWindow, LandmarkDetector, OrtHandTracker,
        Presenter, color, skeleton,
    },
    types::DetectionResult,
};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("could not open webcam {index}")]
    CameraUnavailable {
        index: u32,
        #[source]
        source: BoxError,
    },
    #[error("could not start the hand tracker")]
    DetectorUnavailable(#[source] BoxError),
    #[error("could not open the preview window")]
    DisplayUnavailable(#[source] BoxError),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames: u64,
    pub empty_frames: u64,
    pub detector_failures: u64,
}

/// Opens the webcam, the hand tracker and the preview window, then runs the
/// preview until the quit key is pressed.
pub fn run(config: &Config) -> Result<LoopStats> {
    run_with(
        config.camera_index,
        || CameraSource::open(config.camera_index),
        || {
            OrtHandTracker::open(
                &config.palm_model_path,
                &config.handpose_model_path,
                config.detector.clone(),
            )
        },
        || HighguiWindow::open(&config.window_title, config.quit_key, config.key_wait_ms),
    )
}

/// Opens the camera, then the detector, then the window, and runs the loop.
/// The detector is only created once the camera is open. Whatever was opened
/// is released in reverse order when this returns, whichever way it returns.
pub fn run_with<S, D, P>(
    camera_index: u32,
    open_source: impl FnOnce() -> Result<S>,
    open_detector: impl FnOnce() -> Result<D>,
    open_presenter: impl FnOnce() -> Result<P>,
) -> Result<LoopStats>
where
    S: FrameSource,
    D: LandmarkDetector,
    P: Presenter,
{
    let mut source = open_source().map_err(|err| StartupError::CameraUnavailable {
        index: camera_index,
        source: err.into(),
    })?;
    let mut detector =
        open_detector().map_err(|err| StartupError::DetectorUnavailable(err.into()))?;
    let mut presenter =
        open_presenter().map_err(|err| StartupError::DisplayUnavailable(err.into()))?;

    log::info!("preview running, press 'q' in the window to quit");
    let outcome = run_loop(&mut source, &mut detector, &mut presenter);

    drop(presenter);
    drop(detector);
    drop(source);

    outcome
}

/// The per-frame loop. Returns once the presenter reports the quit key, or
/// with the presenter's error if the window fails.
pub fn run_loop<S, D, P>(source: &mut S, detector: &mut D, presenter: &mut P) -> Result<LoopStats>
where
    S: FrameSource + ?Sized,
    D: LandmarkDetector + ?Sized,
    P: Presenter + ?Sized,
{
    let mut stats = LoopStats::default();

    loop {
        let frame = match source.acquire() {
            Acquired::Frame(frame) => frame,
            Acquired::Empty => {
                stats.empty_frames += 1;
                continue;
            }
        };

        let model_frame = color::to_model_space(frame);
        let result = match detector.detect(&model_frame) {
            Ok(result) => result,
            Err(err) => {
                stats.detector_failures += 1;
                log::warn!("hand detection failed, showing frame without overlay: {err:?}");
                DetectionResult::empty()
            }
        };

        let mut frame = color::to_display_space(model_frame);
        if let Err(err) = skeleton::render(&mut frame, &result) {
            log::warn!("failed to draw hand overlay: {err:?}");
        }
        presenter.present(&frame)?;
        stats.frames += 1;
        log::debug!(
            "frame {} shown after {:?} with {} hand(s): {:?}",
            stats.frames,
            frame.timestamp.elapsed(),
            result.len(),
            result
                .hands
                .iter()
                .map(|hand| (hand.handedness.label(), hand.score))
                .collect::<Vec<_>>()
        );

        if presenter.poll_quit()? {
            log::info!("quit requested after {} frames", stats.frames);
            return Ok(stats);
        }
    }
}
