//! Proof image sink.
//!
//! Each confirmed sighting snapshots the raw frame as evidence for the
//! review decision. Files are named by identity and capture timestamp;
//! alerts carry the file name as a relative reference.

use chrono::Local;
use image::GrayImage;
use std::path::Path;
use thiserror::Error;
use truant_hw::Frame;

#[derive(Debug, Error)]
pub enum ProofError {
    #[error("proof directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("proof encoding: {0}")]
    Encode(#[from] image::ImageError),
    #[error("frame buffer does not match its dimensions")]
    BadFrame,
}

/// Write the frame as a JPEG into `dir`, returning the file name.
pub fn save_proof(dir: &Path, identity: &str, frame: &Frame) -> Result<String, ProofError> {
    std::fs::create_dir_all(dir)?;

    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let name = format!("{}_{stamp}.jpg", sanitize(identity));

    let img = GrayImage::from_raw(frame.width, frame.height, frame.data.clone())
        .ok_or(ProofError::BadFrame)?;
    img.save(dir.join(&name))?;

    Ok(name)
}

/// Keep identities filesystem-safe: anything outside `[A-Za-z0-9_-]`
/// becomes an underscore.
fn sanitize(identity: &str) -> String {
    identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> Frame {
        Frame {
            data: vec![128u8; (width * height) as usize],
            width,
            height,
            captured_at: std::time::Instant::now(),
            sequence: 0,
        }
    }

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("truant-proof-{}-{name}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn sanitize_keeps_safe_chars() {
        assert_eq!(sanitize("CS21-042_b"), "CS21-042_b");
    }

    #[test]
    fn sanitize_replaces_path_separators() {
        assert_eq!(sanitize("../etc/passwd"), "___etc_passwd");
    }

    #[test]
    fn proof_file_is_written_and_named_by_identity() {
        let dir = scratch_dir("write");
        let name = save_proof(&dir, "S1", &frame(32, 24)).unwrap();

        assert!(name.starts_with("S1_"));
        assert!(name.ends_with(".jpg"));
        assert!(dir.join(&name).exists());
    }

    #[test]
    fn mismatched_frame_dimensions_are_rejected() {
        let dir = scratch_dir("bad");
        let mut bad = frame(32, 24);
        bad.data.truncate(10);
        assert!(matches!(
            save_proof(&dir, "S1", &bad),
            Err(ProofError::BadFrame)
        ));
    }
}
