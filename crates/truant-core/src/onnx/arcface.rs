//! ArcFace embedding extraction over aligned 112x112 face crops.
//!
//! Output is the raw 512-dimensional model vector. Normalization is left to
//! the consumer, which is the single place the unit-length invariant is
//! enforced.

use super::gray_to_nchw;
use crate::oracle::OracleError;
use crate::types::Embedding;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

pub(crate) const INPUT_SIZE: usize = 112;
const MEAN: f32 = 127.5;
const STD: f32 = 127.5; // symmetric, unlike the detector's 128.0
pub const EMBEDDING_DIM: usize = 512;

pub(crate) struct ArcFace {
    session: Session,
}

impl ArcFace {
    pub fn load(model_path: &str) -> Result<Self, OracleError> {
        if !Path::new(model_path).exists() {
            return Err(OracleError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = model_path, "ArcFace embedder loaded");
        Ok(Self { session })
    }

    /// Embed one aligned grayscale crop ([`INPUT_SIZE`] squared bytes).
    pub fn embed(&mut self, aligned: &[u8]) -> Result<Embedding, OracleError> {
        let tensor = gray_to_nchw(aligned, INPUT_SIZE, MEAN, STD);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(tensor.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| OracleError::Inference(format!("embedding extraction: {e}")))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(OracleError::Inference(format!(
                "expected a {EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding(raw.to_vec()))
    }
}
