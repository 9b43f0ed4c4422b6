//! Durable gallery store.
//!
//! The in-memory gallery is shared as an `Arc` snapshot: matchers clone the
//! handle and read a frozen view, enrollment builds a replacement and
//! repoints the handle. On disk it is one JSON blob, replaced by
//! write-new-then-rename so a crash mid-write never leaves a torn file.
//! Unreadable persisted data degrades to an empty gallery with a warning —
//! never a startup failure.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use truant_core::{Embedding, Gallery};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("gallery serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("gallery write failed: {0}")]
    Io(#[from] std::io::Error),
}

pub struct GalleryStore {
    path: PathBuf,
    current: RwLock<Arc<Gallery>>,
}

impl GalleryStore {
    /// Load the persisted gallery, or start empty.
    pub fn open(path: PathBuf) -> Self {
        let gallery = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Gallery>(&bytes) {
                Ok(gallery) => {
                    tracing::info!(
                        path = %path.display(),
                        identities = gallery.len(),
                        "gallery loaded"
                    );
                    gallery
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "gallery blob unreadable, starting with an empty gallery"
                    );
                    Gallery::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no gallery on disk yet");
                Gallery::new()
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "gallery file unreadable, starting with an empty gallery"
                );
                Gallery::new()
            }
        };

        Self {
            path,
            current: RwLock::new(Arc::new(gallery)),
        }
    }

    /// Current snapshot. Cheap; holds the lock only for the `Arc` clone.
    pub fn snapshot(&self) -> Arc<Gallery> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace one identity's templates: build the next gallery, persist it,
    /// then repoint the shared handle. Readers see either the old snapshot
    /// or the complete new one, never a partial template list. A persist
    /// failure leaves both disk and memory on the old snapshot.
    ///
    /// Writes are serialized by the engine thread; this method assumes a
    /// single writer.
    pub fn publish(&self, identity: &str, templates: Vec<Embedding>) -> Result<(), StoreError> {
        let next = Arc::new(self.snapshot().with_identity(identity, templates));
        self.persist(&next)?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
        Ok(())
    }

    fn persist(&self, gallery: &Gallery) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(gallery)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
