//! The face oracle seam.
//!
//! Everything upstream of matching — detection, landmark localization,
//! embedding extraction — sits behind this trait so the pipeline can run
//! against the ONNX models in production and scripted fixtures in tests.

use crate::types::DetectedFace;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("model file not found: {0} — download from insightface and place in the model dir")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Detects every face in a grayscale frame and embeds each one.
///
/// Implementations own their model state (`&mut self` allows inference
/// session reuse). Returned embeddings are raw model output — callers
/// normalize before storing or comparing. A frame with no faces is an
/// `Ok(vec![])`, not an error.
pub trait FaceOracle: Send {
    fn detect(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<DetectedFace>, OracleError>;
}
