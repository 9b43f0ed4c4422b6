//! ONNX-backed face oracle.
//!
//! Composes SCRFD detection with ArcFace embedding extraction behind the
//! [`FaceOracle`] trait: one `detect()` call localizes every face, aligns it
//! on its landmarks, and attaches the raw embedding. CPU inference via
//! ONNX Runtime.

mod align;
mod arcface;
mod scrfd;

pub use arcface::EMBEDDING_DIM;

use crate::oracle::{FaceOracle, OracleError};
use crate::types::DetectedFace;
use ndarray::Array4;

/// Face oracle running the SCRFD detector and ArcFace embedder.
pub struct OnnxOracle {
    detector: scrfd::Scrfd,
    embedder: arcface::ArcFace,
}

impl OnnxOracle {
    /// Load both models. Fails fast on a missing file so the daemon refuses
    /// to start half-blind.
    pub fn load(detector_path: &str, embedder_path: &str) -> Result<Self, OracleError> {
        let detector = scrfd::Scrfd::load(detector_path)?;
        let embedder = arcface::ArcFace::load(embedder_path)?;
        Ok(Self { detector, embedder })
    }
}

impl FaceOracle for OnnxOracle {
    fn detect(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<DetectedFace>, OracleError> {
        let located = self.detector.detect(gray, width, height)?;

        let mut faces = Vec::with_capacity(located.len());
        for (bbox, landmarks) in located {
            let aligned = align::align_face(gray, width, height, landmarks.points());
            let embedding = self.embedder.embed(&aligned)?;
            faces.push(DetectedFace { bbox, landmarks, embedding });
        }

        Ok(faces)
    }
}

/// Expand a square grayscale crop into a 1×3×size×size tensor, replicating
/// the single channel and normalizing each pixel as `(p - mean) / std`.
/// Missing pixels (short input) read as 0.
pub(crate) fn gray_to_nchw(pixels: &[u8], size: usize, mean: f32, std: f32) -> Array4<f32> {
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for y in 0..size {
        for x in 0..size {
            let p = pixels.get(y * size + x).copied().unwrap_or(0) as f32;
            let v = (p - mean) / std;
            tensor[[0, 0, y, x]] = v;
            tensor[[0, 1, y, x]] = v;
            tensor[[0, 2, y, x]] = v;
        }
    }
    tensor
}
