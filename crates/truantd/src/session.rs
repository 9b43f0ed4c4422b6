//! The surveillance session: one camera stream, one consistency tracker,
//! and the per-cycle pipeline from latest frame to alerts and overlay data.

use crate::config::Config;
use crate::engine::EngineShared;
use crate::proof;
use crate::watch::{Alert, ConsistencyTracker};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use truant_core::{DetectedFace, FaceOracle, Gallery, MatchHit};
use truant_hw::{Camera, CameraError, VideoStream};

/// Overlay data for one face in the latest processed frame, for the
/// reviewer's live monitor.
#[derive(Debug, Clone, Serialize)]
pub struct FaceObservation {
    /// Best-match identity, or "Unknown" when nothing is enrolled.
    pub label: String,
    /// Best-match confidence as a percentage, regardless of threshold.
    pub percent: u8,
    /// [x, y, width, height] in frame coordinates.
    pub bbox: [f32; 4],
}

/// Outcome of evaluating one frame's detections against the gallery.
pub(crate) struct FrameEvaluation {
    pub observations: Vec<FaceObservation>,
    /// Identities whose sighting was confirmed by this frame.
    pub confirmations: Vec<MatchHit>,
}

/// Evaluate each detected face independently: normalize, match, threshold,
/// and feed the consistency tracker. No ordering between faces matters —
/// each identity's counter only ever sees its own verdicts.
pub(crate) fn evaluate_frame(
    faces: &[DetectedFace],
    gallery: &Gallery,
    tracker: &mut ConsistencyTracker,
    threshold: f32,
) -> FrameEvaluation {
    let mut observations = Vec::with_capacity(faces.len());
    let mut confirmations = Vec::new();

    for face in faces {
        let probe = face.embedding.normalized();
        let bbox = [face.bbox.x, face.bbox.y, face.bbox.width, face.bbox.height];

        match gallery.best_match(&probe) {
            Some(hit) => {
                let qualified = hit.score > threshold;
                if tracker.observe(&hit.identity, qualified) {
                    confirmations.push(hit.clone());
                }
                observations.push(FaceObservation {
                    label: hit.identity,
                    percent: (hit.score * 100.0).round().clamp(0.0, 100.0) as u8,
                    bbox,
                });
            }
            None => observations.push(FaceObservation {
                label: "Unknown".to_string(),
                percent: 0,
                bbox,
            }),
        }
    }

    FrameEvaluation {
        observations,
        confirmations,
    }
}

/// A running surveillance session. Owns the frame producer and the
/// consistency counters; both die with the session.
pub struct WatchSession {
    stream: VideoStream,
    tracker: ConsistencyTracker,
    threshold: f32,
    idle_wait: Duration,
}

impl WatchSession {
    /// Open the camera (primary, then fallback) and start the producer.
    pub fn open(cfg: &Config) -> Result<Self, CameraError> {
        let camera = Camera::open_with_fallback(&cfg.camera_source, &cfg.fallback_source)?;
        Ok(Self {
            stream: VideoStream::start(camera),
            tracker: ConsistencyTracker::new(cfg.confirm_frames),
            threshold: cfg.match_threshold,
            idle_wait: cfg.idle_wait(),
        })
    }

    /// Run one surveillance cycle. Per-frame failures are logged and
    /// swallowed; only the stop signal ends the loop.
    pub fn cycle(&mut self, oracle: &mut dyn FaceOracle, shared: &EngineShared, proof_dir: &Path) {
        let Some(frame) = self.stream.latest() else {
            // producer hasn't delivered yet; wait briefly without blocking it
            std::thread::sleep(self.idle_wait);
            return;
        };

        let faces = match oracle.detect(&frame.data, frame.width, frame.height) {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!(error = %e, "face detection failed, frame skipped");
                return;
            }
        };

        let gallery = shared.store.snapshot();
        let eval = evaluate_frame(&faces, &gallery, &mut self.tracker, self.threshold);

        for hit in &eval.confirmations {
            // Proof is written for every confirmation; the registry insert
            // decides whether it becomes a new alert.
            match proof::save_proof(proof_dir, &hit.identity, &frame) {
                Ok(proof_name) => {
                    let inserted = shared
                        .alerts
                        .insert(Alert::new(&hit.identity, hit.score, proof_name));
                    if inserted {
                        tracing::info!(
                            identity = %hit.identity,
                            score = hit.score,
                            "sighting confirmed, alert queued"
                        );
                    } else {
                        tracing::debug!(
                            identity = %hit.identity,
                            "sighting confirmed again, alert already pending"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(identity = %hit.identity, error = %e, "proof image write failed");
                }
            }
        }

        shared.set_observations(eval.observations);
    }

    /// Tear the session down. The producer thread is joined and the camera
    /// released before this returns.
    pub fn close(self) {
        self.stream.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use truant_core::{BoundingBox, Embedding, Landmarks};

    fn face(raw: Vec<f32>) -> DetectedFace {
        DetectedFace {
            bbox: BoundingBox { x: 10.0, y: 20.0, width: 100.0, height: 100.0, confidence: 0.9 },
            landmarks: Landmarks([
                (30.0, 40.0),
                (90.0, 40.0),
                (60.0, 70.0),
                (40.0, 95.0),
                (80.0, 95.0),
            ]),
            embedding: Embedding(raw),
        }
    }

    fn gallery_with(identity: &str, raws: Vec<Vec<f32>>) -> Gallery {
        Gallery::new().with_identity(
            identity,
            raws.into_iter().map(|r| Embedding(r).normalized()).collect(),
        )
    }

    #[test]
    fn empty_gallery_labels_faces_unknown() {
        let mut tracker = ConsistencyTracker::new(2);
        let eval = evaluate_frame(&[face(vec![1.0, 0.0])], &Gallery::new(), &mut tracker, 0.5);

        assert_eq!(eval.observations.len(), 1);
        assert_eq!(eval.observations[0].label, "Unknown");
        assert_eq!(eval.observations[0].percent, 0);
        assert!(eval.confirmations.is_empty());
    }

    #[test]
    fn confirmation_fires_on_second_consecutive_frame() {
        let gallery = gallery_with("S1", vec![vec![1.0, 0.0]]);
        let mut tracker = ConsistencyTracker::new(2);

        let eval = evaluate_frame(&[face(vec![2.0, 0.0])], &gallery, &mut tracker, 0.5);
        assert!(eval.confirmations.is_empty());
        assert_eq!(eval.observations[0].label, "S1");
        assert_eq!(eval.observations[0].percent, 100);

        let eval = evaluate_frame(&[face(vec![2.0, 0.0])], &gallery, &mut tracker, 0.5);
        assert_eq!(eval.confirmations.len(), 1);
        assert_eq!(eval.confirmations[0].identity, "S1");
    }

    #[test]
    fn weak_frame_resets_the_run() {
        let gallery = gallery_with("S1", vec![vec![1.0, 0.0]]);
        let mut tracker = ConsistencyTracker::new(2);

        // strong, weak (below threshold), strong, strong → one confirmation
        let frames = [
            vec![1.0f32, 0.0],  // score 1.0
            vec![1.0, 2.0],     // score ~0.45
            vec![1.0, 0.1],     // score ~0.995
            vec![1.0, 0.0],     // score 1.0
        ];
        let mut confirmed = 0;
        for raw in frames {
            confirmed += evaluate_frame(&[face(raw)], &gallery, &mut tracker, 0.5)
                .confirmations
                .len();
        }
        assert_eq!(confirmed, 1);
    }

    #[test]
    fn below_threshold_face_still_gets_an_observation() {
        let gallery = gallery_with("S1", vec![vec![1.0, 0.0]]);
        let mut tracker = ConsistencyTracker::new(2);

        let eval = evaluate_frame(&[face(vec![1.0, 2.0])], &gallery, &mut tracker, 0.5);
        assert_eq!(eval.observations[0].label, "S1");
        assert!(eval.observations[0].percent < 50);
        assert!(eval.confirmations.is_empty());
    }

    #[test]
    fn faces_are_evaluated_independently() {
        let gallery = Gallery::new()
            .with_identity("A", vec![Embedding(vec![1.0, 0.0]).normalized()])
            .with_identity("B", vec![Embedding(vec![0.0, 1.0]).normalized()]);
        let mut tracker = ConsistencyTracker::new(1);

        let eval = evaluate_frame(
            &[face(vec![3.0, 0.0]), face(vec![0.0, 3.0])],
            &gallery,
            &mut tracker,
            0.5,
        );

        let mut confirmed: Vec<&str> =
            eval.confirmations.iter().map(|h| h.identity.as_str()).collect();
        confirmed.sort();
        assert_eq!(confirmed, vec!["A", "B"]);
    }
}
