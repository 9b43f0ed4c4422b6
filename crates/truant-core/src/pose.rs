//! Head-pose gating from facial landmarks.
//!
//! Enrollment wants samples from several head orientations, so each capture
//! step asks the subject to hold a pose and gates frames on it. The
//! classifier is purely geometric: where the nose tip sits relative to the
//! eye midpoint, as a fraction of the eye distance. Negative ratios mean the
//! head is turned left (nose drifts toward the left eye), positive right.

use crate::types::Landmarks;
use std::fmt;
use std::str::FromStr;

/// Eye distances below this many pixels make the ratio unreliable.
const MIN_EYE_DISTANCE: f32 = 10.0;

/// Nose-offset band accepted as facing the camera.
const CENTER_BAND: f32 = 0.15;

/// Nose offset beyond which a deliberate head turn is accepted.
const TURN_THRESHOLD: f32 = 0.20;

/// Pose the subject is asked to hold for one enrollment step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseTask {
    Center,
    Left,
    Right,
}

impl PoseTask {
    /// Operator-facing instruction for this step.
    pub fn prompt(&self) -> &'static str {
        match self {
            PoseTask::Center => "look straight at the camera",
            PoseTask::Left => "turn your head to the left",
            PoseTask::Right => "turn your head to the right",
        }
    }
}

impl fmt::Display for PoseTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PoseTask::Center => "CENTER",
            PoseTask::Left => "LEFT",
            PoseTask::Right => "RIGHT",
        };
        f.write_str(s)
    }
}

impl FromStr for PoseTask {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "center" => Ok(PoseTask::Center),
            "left" => Ok(PoseTask::Left),
            "right" => Ok(PoseTask::Right),
            other => Err(format!("unknown pose task: {other:?}")),
        }
    }
}

/// Outcome of one pose check. The ratio is reported even on rejection so the
/// operator display can show how far off the subject is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseCheck {
    pub valid: bool,
    pub ratio: f32,
    /// Landmark geometry too degenerate to classify (eyes nearly coincide);
    /// the frame is skipped rather than rejected on pose grounds.
    pub degenerate: bool,
}

/// Classify head orientation against a target pose.
///
/// Pure and deterministic. All comparisons are strict: a ratio sitting
/// exactly on a threshold is rejected.
pub fn check_pose(landmarks: &Landmarks, task: PoseTask) -> PoseCheck {
    let (left_x, _) = landmarks.left_eye();
    let (right_x, _) = landmarks.right_eye();
    let (nose_x, _) = landmarks.nose();

    let eye_distance = right_x - left_x;
    if eye_distance < MIN_EYE_DISTANCE {
        return PoseCheck { valid: false, ratio: 0.0, degenerate: true };
    }

    let ratio = (nose_x - (left_x + right_x) / 2.0) / eye_distance;
    let valid = match task {
        PoseTask::Center => ratio.abs() < CENTER_BAND,
        PoseTask::Left => ratio < -TURN_THRESHOLD,
        PoseTask::Right => ratio > TURN_THRESHOLD,
    };

    PoseCheck { valid, ratio, degenerate: false }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Landmarks with eyes at `left_x`/`right_x` and the nose at `nose_x`.
    /// Mouth corners are irrelevant to the classifier.
    fn landmarks(left_x: f32, right_x: f32, nose_x: f32) -> Landmarks {
        Landmarks([
            (left_x, 100.0),
            (right_x, 100.0),
            (nose_x, 130.0),
            (left_x + 5.0, 160.0),
            (right_x - 5.0, 160.0),
        ])
    }

    #[test]
    fn degenerate_geometry_is_always_invalid() {
        // 9px between the eyes, nose perfectly centered
        let lm = landmarks(100.0, 109.0, 104.5);
        for task in [PoseTask::Center, PoseTask::Left, PoseTask::Right] {
            let check = check_pose(&lm, task);
            assert!(!check.valid);
            assert!(check.degenerate);
            assert_eq!(check.ratio, 0.0);
        }
    }

    #[test]
    fn centered_nose_passes_center() {
        let lm = landmarks(100.0, 200.0, 150.0); // ratio 0.0
        let check = check_pose(&lm, PoseTask::Center);
        assert!(check.valid);
        assert!(check.ratio.abs() < 1e-6);
    }

    #[test]
    fn center_boundary_is_rejected() {
        // eye distance 100, nose 15px off center → ratio exactly 0.15
        let lm = landmarks(100.0, 200.0, 165.0);
        assert!(!check_pose(&lm, PoseTask::Center).valid);

        // just inside the band
        let lm = landmarks(100.0, 200.0, 164.9);
        assert!(check_pose(&lm, PoseTask::Center).valid);
    }

    #[test]
    fn left_requires_strictly_past_threshold() {
        // ratio exactly -0.20 → rejected
        let lm = landmarks(100.0, 200.0, 130.0);
        assert!(!check_pose(&lm, PoseTask::Left).valid);

        // ratio -0.21 → accepted
        let lm = landmarks(100.0, 200.0, 129.0);
        let check = check_pose(&lm, PoseTask::Left);
        assert!(check.valid);
        assert!(check.ratio < -0.20);
    }

    #[test]
    fn right_requires_strictly_past_threshold() {
        // ratio exactly 0.20 → rejected
        let lm = landmarks(100.0, 200.0, 170.0);
        assert!(!check_pose(&lm, PoseTask::Right).valid);

        // ratio 0.21 → accepted
        let lm = landmarks(100.0, 200.0, 171.0);
        assert!(check_pose(&lm, PoseTask::Right).valid);
    }

    #[test]
    fn turned_head_fails_center() {
        let lm = landmarks(100.0, 200.0, 125.0); // ratio -0.25
        assert!(!check_pose(&lm, PoseTask::Center).valid);
        assert!(check_pose(&lm, PoseTask::Left).valid);
        assert!(!check_pose(&lm, PoseTask::Right).valid);
    }

    #[test]
    fn pose_task_round_trips_through_str() {
        for task in [PoseTask::Center, PoseTask::Left, PoseTask::Right] {
            let parsed: PoseTask = task.to_string().parse().unwrap();
            assert_eq!(parsed, task);
        }
        assert!("sideways".parse::<PoseTask>().is_err());
    }
}
