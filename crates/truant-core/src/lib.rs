//! truant-core — identity matching and pose analysis.
//!
//! The pure algorithms behind the Truant monitor: embedding normalization
//! and gallery search, head-pose gating for enrollment, and the SCRFD +
//! ArcFace ONNX oracle that turns camera frames into detected faces.

pub mod gallery;
pub mod onnx;
pub mod oracle;
pub mod pose;
pub mod types;

pub use gallery::{Gallery, GalleryEntry, MatchHit};
pub use oracle::{FaceOracle, OracleError};
pub use pose::{check_pose, PoseCheck, PoseTask};
pub use types::{BoundingBox, DetectedFace, Embedding, Landmarks};

use std::path::PathBuf;

/// Default directory for the ONNX model files.
///
/// Prefers the system-wide install location, falling back to the per-user
/// data directory.
pub fn default_model_dir() -> PathBuf {
    let system = PathBuf::from("/usr/share/truant/models");
    if system.is_dir() {
        return system;
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".local/share/truant/models")
}
