//! The reference gallery: enrolled identities and their embedding templates.
//!
//! The gallery is an ordered sequence rather than a hash map: entry order is
//! the tie-break order during matching (earliest enrolled wins) and it
//! survives serialization unchanged. Every identity always maps to a
//! sequence of templates, never a bare vector.

use crate::types::Embedding;
use serde::{Deserialize, Serialize};

/// One enrolled identity with its pose-variation templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub identity: String,
    pub templates: Vec<Embedding>,
}

/// Ordered identity → templates mapping, matched against as one immutable
/// snapshot. Replacement builds a new gallery; nothing mutates in place
/// under readers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

/// Best gallery identity for a probe embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchHit {
    pub identity: String,
    pub score: f32,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of enrolled identities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    /// Templates for one identity, if enrolled.
    pub fn templates(&self, identity: &str) -> Option<&[Embedding]> {
        self.entries
            .iter()
            .find(|e| e.identity == identity)
            .map(|e| e.templates.as_slice())
    }

    /// Build the next snapshot: this gallery with `identity` holding
    /// `templates`. An existing entry is replaced in place so its tie-break
    /// position is kept; a new identity is appended.
    pub fn with_identity(&self, identity: &str, templates: Vec<Embedding>) -> Gallery {
        let mut next = self.clone();
        match next.entries.iter_mut().find(|e| e.identity == identity) {
            Some(entry) => entry.templates = templates,
            None => next.entries.push(GalleryEntry {
                identity: identity.to_string(),
                templates,
            }),
        }
        next
    }

    /// Find the identity most similar to a unit-normalized probe.
    ///
    /// The per-identity score is the best cosine similarity over all of that
    /// identity's templates — a single matching pose template is sufficient,
    /// deliberately not an average. Every entry is visited; strict `>` keeps
    /// the earliest entry on score ties. Returns `None` when nothing is
    /// enrolled.
    pub fn best_match(&self, probe: &Embedding) -> Option<MatchHit> {
        let mut best: Option<MatchHit> = None;

        for entry in &self.entries {
            if entry.templates.is_empty() {
                continue;
            }
            let score = entry
                .templates
                .iter()
                .map(|t| probe.dot(t))
                .fold(f32::NEG_INFINITY, f32::max);

            let better = match &best {
                Some(hit) => score > hit.score,
                None => true,
            };
            if better {
                best = Some(MatchHit {
                    identity: entry.identity.clone(),
                    score,
                });
            }
        }

        best
    }
}
