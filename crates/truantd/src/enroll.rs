//! Pose-guided enrollment.
//!
//! Walks a fixed sequence of pose tasks over a live frame feed, collecting
//! one normalized embedding per task. Each step consumes frames until one
//! passes its pose gate; the session either completes the whole sequence or
//! fails with a reason the operator can act on.

use crate::store::StoreError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use truant_core::{check_pose, DetectedFace, Embedding, FaceOracle, OracleError, PoseTask};
use truant_hw::{CameraError, FrameFeed};

#[derive(Debug, Error)]
pub enum EnrollError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(#[from] CameraError),
    #[error("capture ended after {captured} of {expected} pose samples")]
    IncompleteCapture { captured: usize, expected: usize },
    #[error("enrollment cancelled by operator")]
    Cancelled,
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Drive the pose-task sequence to completion.
///
/// Frames with no detected face are skipped. With several faces in frame the
/// subject is the one with the largest bounding box (the person being
/// enrolled stands closest); ties keep the first encountered. After each
/// accepted sample a settle delay keeps the next step from re-capturing the
/// same pose instant.
///
/// Returns the unit-normalized templates, one per task, in task order.
pub fn run_enrollment(
    feed: &mut dyn FrameFeed,
    oracle: &mut dyn FaceOracle,
    tasks: &[PoseTask],
    settle: Duration,
    cancel: &AtomicBool,
) -> Result<Vec<Embedding>, EnrollError> {
    let mut templates = Vec::with_capacity(tasks.len());

    for (step, &task) in tasks.iter().enumerate() {
        tracing::info!(
            step = step + 1,
            total = tasks.len(),
            task = %task,
            "{}",
            task.prompt()
        );

        loop {
            if cancel.load(Ordering::SeqCst) {
                tracing::info!(step = step + 1, "enrollment cancelled");
                return Err(EnrollError::Cancelled);
            }

            let frame = match feed.next_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        captured = templates.len(),
                        expected = tasks.len(),
                        "frame stream ended mid-enrollment"
                    );
                    return Err(EnrollError::IncompleteCapture {
                        captured: templates.len(),
                        expected: tasks.len(),
                    });
                }
            };

            let faces = oracle.detect(&frame.data, frame.width, frame.height)?;
            let Some(subject) = largest_face(&faces) else {
                continue;
            };

            let check = check_pose(&subject.landmarks, task);
            if check.degenerate {
                tracing::debug!(step = step + 1, "degenerate landmark geometry, frame skipped");
                continue;
            }
            if !check.valid {
                tracing::trace!(step = step + 1, task = %task, ratio = check.ratio, "pose rejected");
                continue;
            }

            templates.push(subject.embedding.normalized());
            tracing::info!(
                step = step + 1,
                total = tasks.len(),
                task = %task,
                ratio = check.ratio,
                "pose sample captured"
            );

            if !settle.is_zero() {
                std::thread::sleep(settle);
            }
            break;
        }
    }

    Ok(templates)
}

/// Largest bounding box wins; strict comparison keeps the first face on
/// area ties.
fn largest_face(faces: &[DetectedFace]) -> Option<&DetectedFace> {
    faces.iter().fold(None, |best: Option<&DetectedFace>, face| {
        match best {
            Some(b) if face.bbox.area() <= b.bbox.area() => best,
            _ => Some(face),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::GalleryStore;
    use std::collections::VecDeque;
    use truant_core::{BoundingBox, Landmarks};
    use truant_hw::Frame;

    const TASKS: [PoseTask; 5] = [
        PoseTask::Center,
        PoseTask::Left,
        PoseTask::Right,
        PoseTask::Center,
        PoseTask::Center,
    ];

    /// Feed that ends (errors) once its frames run out.
    struct ScriptedFeed {
        remaining: usize,
        sequence: u32,
    }

    impl ScriptedFeed {
        fn with_frames(count: usize) -> Self {
            Self { remaining: count, sequence: 0 }
        }
    }

    impl FrameFeed for ScriptedFeed {
        fn next_frame(&mut self) -> Result<Frame, CameraError> {
            if self.remaining == 0 {
                return Err(CameraError::CaptureFailed("stream ended".into()));
            }
            self.remaining -= 1;
            self.sequence += 1;
            Ok(Frame {
                data: vec![0u8; 4],
                width: 2,
                height: 2,
                captured_at: std::time::Instant::now(),
                sequence: self.sequence,
            })
        }
    }

    /// Oracle that replays one face list per frame.
    struct ScriptedOracle {
        per_frame: VecDeque<Vec<DetectedFace>>,
    }

    impl ScriptedOracle {
        fn new(per_frame: Vec<Vec<DetectedFace>>) -> Self {
            Self { per_frame: per_frame.into() }
        }
    }

    impl FaceOracle for ScriptedOracle {
        fn detect(
            &mut self,
            _gray: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Vec<DetectedFace>, OracleError> {
            Ok(self.per_frame.pop_front().unwrap_or_default())
        }
    }

    /// A face holding the requested pose, with eyes 100px apart.
    fn posed_face(task: PoseTask, side: f32, raw_embedding: Vec<f32>) -> DetectedFace {
        let nose_x = match task {
            PoseTask::Center => 150.0,
            PoseTask::Left => 125.0,  // ratio -0.25
            PoseTask::Right => 175.0, // ratio 0.25
        };
        DetectedFace {
            bbox: BoundingBox { x: 80.0, y: 60.0, width: side, height: side, confidence: 0.9 },
            landmarks: Landmarks([
                (100.0, 100.0),
                (200.0, 100.0),
                (nose_x, 130.0),
                (110.0, 160.0),
                (190.0, 160.0),
            ]),
            embedding: Embedding(raw_embedding),
        }
    }

    fn no_cancel() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn full_sequence_yields_normalized_templates() {
        let mut feed = ScriptedFeed::with_frames(5);
        let mut oracle = ScriptedOracle::new(
            TASKS
                .iter()
                .enumerate()
                .map(|(i, &t)| vec![posed_face(t, 120.0, vec![2.0 + i as f32, 1.0, 0.0])])
                .collect(),
        );

        let templates =
            run_enrollment(&mut feed, &mut oracle, &TASKS, Duration::ZERO, &no_cancel()).unwrap();

        assert_eq!(templates.len(), 5);
        for t in &templates {
            assert!((t.norm() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn stream_ending_early_is_incomplete_capture() {
        // only 4 frames before the stream dies
        let mut feed = ScriptedFeed::with_frames(4);
        let mut oracle = ScriptedOracle::new(
            TASKS[..4]
                .iter()
                .map(|&t| vec![posed_face(t, 120.0, vec![1.0, 0.0])])
                .collect(),
        );

        let err = run_enrollment(&mut feed, &mut oracle, &TASKS, Duration::ZERO, &no_cancel())
            .unwrap_err();
        match err {
            EnrollError::IncompleteCapture { captured, expected } => {
                assert_eq!(captured, 4);
                assert_eq!(expected, 5);
            }
            other => panic!("expected IncompleteCapture, got {other:?}"),
        }
    }

    #[test]
    fn cancel_flag_aborts_the_session() {
        let mut feed = ScriptedFeed::with_frames(5);
        let mut oracle = ScriptedOracle::new(vec![]);
        let cancel = AtomicBool::new(true);

        let err =
            run_enrollment(&mut feed, &mut oracle, &TASKS, Duration::ZERO, &cancel).unwrap_err();
        assert!(matches!(err, EnrollError::Cancelled));
    }

    #[test]
    fn wrong_pose_frames_are_retried_not_fatal() {
        let tasks = [PoseTask::Center];
        let mut feed = ScriptedFeed::with_frames(3);
        let mut oracle = ScriptedOracle::new(vec![
            vec![posed_face(PoseTask::Left, 120.0, vec![9.0, 9.0])], // rejected
            vec![],                                                 // no face
            vec![posed_face(PoseTask::Center, 120.0, vec![0.0, 3.0])],
        ]);

        let templates =
            run_enrollment(&mut feed, &mut oracle, &tasks, Duration::ZERO, &no_cancel()).unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0], Embedding(vec![0.0, 1.0]));
    }

    #[test]
    fn degenerate_geometry_skips_the_frame() {
        let tasks = [PoseTask::Center];
        let mut degenerate = posed_face(PoseTask::Center, 120.0, vec![1.0, 0.0]);
        degenerate.landmarks = Landmarks([
            (100.0, 100.0),
            (105.0, 100.0), // 5px eye distance
            (102.5, 130.0),
            (100.0, 160.0),
            (105.0, 160.0),
        ]);

        let mut feed = ScriptedFeed::with_frames(2);
        let mut oracle = ScriptedOracle::new(vec![
            vec![degenerate],
            vec![posed_face(PoseTask::Center, 120.0, vec![1.0, 0.0])],
        ]);

        let templates =
            run_enrollment(&mut feed, &mut oracle, &tasks, Duration::ZERO, &no_cancel()).unwrap();
        assert_eq!(templates.len(), 1);
    }

    #[test]
    fn largest_face_is_the_subject() {
        let tasks = [PoseTask::Center];
        let small = posed_face(PoseTask::Center, 60.0, vec![1.0, 0.0]);
        let large = posed_face(PoseTask::Center, 140.0, vec![0.0, 2.0]);

        let mut feed = ScriptedFeed::with_frames(1);
        let mut oracle = ScriptedOracle::new(vec![vec![small, large]]);

        let templates =
            run_enrollment(&mut feed, &mut oracle, &tasks, Duration::ZERO, &no_cancel()).unwrap();
        assert_eq!(templates[0], Embedding(vec![0.0, 1.0]));
    }

    #[test]
    fn equal_area_tie_keeps_first_face() {
        let first = posed_face(PoseTask::Center, 100.0, vec![1.0, 0.0]);
        let second = posed_face(PoseTask::Center, 100.0, vec![0.0, 1.0]);
        let faces = vec![first, second];

        let subject = largest_face(&faces).unwrap();
        assert_eq!(subject.embedding, Embedding(vec![1.0, 0.0]));
    }

    #[test]
    fn enrolled_identity_matches_its_own_template() {
        // end to end: enroll S1 through the 5-pose sequence, publish, then
        // probe with one of its own templates.
        let mut feed = ScriptedFeed::with_frames(5);
        let mut oracle = ScriptedOracle::new(
            TASKS
                .iter()
                .enumerate()
                .map(|(i, &t)| {
                    let mut raw = vec![0.1f32; 8];
                    raw[i] = 3.0;
                    vec![posed_face(t, 120.0, raw)]
                })
                .collect(),
        );

        let templates =
            run_enrollment(&mut feed, &mut oracle, &TASKS, Duration::ZERO, &no_cancel()).unwrap();

        let store = GalleryStore::open(
            std::env::temp_dir()
                .join(format!("truant-enroll-{}", uuid::Uuid::new_v4()))
                .join("gallery.json"),
        );
        store.publish("S1", templates).unwrap();

        let gallery = store.snapshot();
        assert_eq!(gallery.templates("S1").unwrap().len(), 5);

        let probe = gallery.templates("S1").unwrap()[2].normalized();
        let hit = gallery.best_match(&probe).unwrap();
        assert_eq!(hit.identity, "S1");
        assert!((hit.score - 1.0).abs() < 1e-5);
    }
}
