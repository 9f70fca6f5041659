use anyhow::{Context, Result, anyhow};
use opencv::{core, highgui, prelude::*};

use crate::types::{CHANNELS, ChannelOrder, Frame};

/// Shows annotated frames to the user and reports the quit request.
pub trait Presenter {
    fn present(&mut self, frame: &Frame) -> Result<()>;

    /// Services the window's event queue for a bounded time. Returns `true`
    /// once the quit key has been pressed.
    fn poll_quit(&mut self) -> Result<bool>;
}

/// Whether a raw `wait_key` code is the quit key. `-1` means no key.
pub fn is_quit_key(code: i32, quit_key: char) -> bool {
    code >= 0 && (code & 0xFF) as u8 as char == quit_key
}

/// Copies a BGR frame into an owned `CV_8UC3` matrix.
pub fn frame_to_mat(frame: &Frame) -> Result<Mat> {
    if frame.order != ChannelOrder::Bgr {
        return Err(anyhow!("opencv expects BGR frames, got {:?}", frame.order));
    }
    let flat = Mat::from_slice(&frame.data).context("failed to wrap frame buffer")?;
    let shaped = flat
        .reshape(CHANNELS as i32, frame.height as i32)
        .context("failed to shape frame buffer")?;
    shaped.try_clone().context("failed to copy frame into a matrix")
}

/// Writes the horizontal mirror of `frame` into `dst`, reusing its allocation
/// when the size is unchanged.
pub fn mirror_into(frame: &Frame, dst: &mut Mat) -> Result<()> {
    let src = frame_to_mat(frame)?;
    core::flip(&src, dst, 1).context("failed to mirror frame")?;
    Ok(())
}

/// A highgui window showing the mirrored feed. All windows are destroyed when
/// this is dropped.
pub struct HighguiWindow {
    title: String,
    quit_key: char,
    wait_ms: i32,
    canvas: Mat,
}

impl HighguiWindow {
    pub fn open(title: &str, quit_key: char, wait_ms: i32) -> Result<Self> {
        highgui::named_window(title, highgui::WINDOW_AUTOSIZE)
            .with_context(|| format!("failed to create window {title:?}"))?;

        Ok(Self {
            title: title.to_string(),
            quit_key,
            wait_ms,
            canvas: Mat::default(),
        })
    }
}

impl Presenter for HighguiWindow {
    fn present(&mut self, frame: &Frame) -> Result<()> {
        mirror_into(frame, &mut self.canvas)?;
        highgui::imshow(&self.title, &self.canvas).context("failed to show preview frame")?;
        Ok(())
    }

    fn poll_quit(&mut self) -> Result<bool> {
        let code = highgui::wait_key(self.wait_ms).context("failed to poll window events")?;
        Ok(is_quit_key(code, self.quit_key))
    }
}

impl Drop for HighguiWindow {
    fn drop(&mut self) {
        if let Err(err) = highgui::destroy_all_windows() {
            log::warn!("failed to close preview window: {err}");
        }
    }
}
