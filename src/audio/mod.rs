/// Microphone capture via CPAL
pub mod capture;
/// WAV container I/O
pub mod wav;

pub use capture::{AudioCapture, CaptureError};
