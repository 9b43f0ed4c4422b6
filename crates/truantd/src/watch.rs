//! Temporal confirmation and the pending-alert registry.
//!
//! A single high-similarity frame is not enough to act on: a match must
//! repeat across consecutive qualifying frames before it confirms, and one
//! weak frame wipes whatever consistency an identity had accumulated. A
//! confirmed sighting becomes a pending alert, deduplicated per identity
//! until a reviewer marks or dismisses it.

use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Per-identity consecutive-frame counter.
///
/// Owned by the surveillance session (single writer); recreated per session
/// so counters never leak across sessions.
pub struct ConsistencyTracker {
    counts: HashMap<String, u32>,
    confirm_after: u32,
}

impl ConsistencyTracker {
    pub fn new(confirm_after: u32) -> Self {
        Self {
            counts: HashMap::new(),
            // 0 would confirm on nothing; clamp to at least one frame
            confirm_after: confirm_after.max(1),
        }
    }

    /// Record one frame's verdict for an identity. Returns true when the
    /// sighting is confirmed, resetting that identity's counter.
    ///
    /// An unqualified frame (winning score at or below threshold) resets the
    /// counter outright — consistency does not survive gaps.
    pub fn observe(&mut self, identity: &str, qualified: bool) -> bool {
        if !qualified {
            self.counts.remove(identity);
            return false;
        }

        let count = self.counts.entry(identity.to_string()).or_insert(0);
        *count += 1;
        if *count >= self.confirm_after {
            self.counts.remove(identity);
            true
        } else {
            false
        }
    }
}

/// A confirmed sighting awaiting review.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: Uuid,
    pub identity: String,
    pub detected_at: DateTime<Local>,
    /// Best-match cosine score at confirmation time; serialized for the
    /// reviewer feed as a percentage.
    #[serde(rename = "percent", serialize_with = "score_as_percent")]
    pub score: f32,
    /// Proof image file name, relative to the proof directory.
    pub proof: String,
}

impl Alert {
    pub fn new(identity: &str, score: f32, proof: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity: identity.to_string(),
            detected_at: Local::now(),
            score,
            proof,
        }
    }
}

fn score_as_percent<S: Serializer>(score: &f32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8((score * 100.0).round().clamp(0.0, 100.0) as u8)
}

/// Pending alerts, deduplicated by identity.
///
/// Written by the surveillance loop and read/mutated by reviewer handlers
/// concurrently; one mutex serializes every access, held only across the
/// map operation itself.
#[derive(Default)]
pub struct AlertRegistry {
    pending: Mutex<Vec<Alert>>,
}

impl AlertRegistry {
    fn lock(&self) -> MutexGuard<'_, Vec<Alert>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert unless an alert for this identity is already pending.
    /// First confirmation wins; a duplicate neither refreshes the timestamp
    /// nor the score. Returns whether the alert was inserted.
    pub fn insert(&self, alert: Alert) -> bool {
        let mut pending = self.lock();
        if pending.iter().any(|a| a.identity == alert.identity) {
            return false;
        }
        pending.push(alert);
        true
    }

    /// Snapshot of the pending alerts, oldest first.
    pub fn pending(&self) -> Vec<Alert> {
        self.lock().clone()
    }

    /// Pending alert for one identity, if any.
    pub fn get(&self, identity: &str) -> Option<Alert> {
        self.lock().iter().find(|a| a.identity == identity).cloned()
    }

    /// Remove an identity's pending alert.
    pub fn remove(&self, identity: &str) -> Option<Alert> {
        let mut pending = self.lock();
        let idx = pending.iter().position(|a| a.identity == identity)?;
        Some(pending.remove(idx))
    }

    /// Wipe all pending alerts (session end). Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut pending = self.lock();
        let dropped = pending.len();
        pending.clear();
        dropped
    }
}
