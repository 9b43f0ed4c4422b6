//! Frame type and pixel conversion.

use crate::camera::CameraError;

/// A captured grayscale camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data, `width * height` bytes.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: std::time::Instant,
    /// Driver sequence number, for staleness diagnostics.
    pub sequence: u32,
}

impl Frame {
    /// Average pixel brightness (0.0–255.0), for camera diagnostics.
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }
}

/// A sequential source of frames.
///
/// The camera's capture reader implements this; enrollment and tests run
/// against the trait so the pose state machine never touches hardware
/// directly. An error means the stream ended or the device failed — callers
/// decide whether that is fatal.
pub trait FrameFeed {
    fn next_frame(&mut self) -> Result<Frame, CameraError>;
}

/// Convert packed YUYV (4:2:2, two pixels per `[Y0, U, Y1, V]` quad) to
/// grayscale by keeping the luma bytes.
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CameraError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(CameraError::CaptureFailed(format!(
            "YUYV buffer too short: expected {expected} bytes, got {}",
            yuyv.len()
        )));
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}
