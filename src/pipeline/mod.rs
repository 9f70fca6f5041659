pub mod camera;
pub mod color;
pub mod display;
pub mod frame_decoder;
pub mod recognizer;
pub mod skeleton;

// Re-exports for convenience
pub use camera::{Acquired, CameraSource, FrameSource};
pub use display::{HighguiWindow, Presenter};
pub use recognizer::{LandmarkDetector, OrtHandTracker};
