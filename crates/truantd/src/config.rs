use std::path::PathBuf;
use std::time::Duration;
use truant_core::PoseTask;
use truant_hw::SourceAddr;

/// Daemon configuration, loaded from `TRUANT_*` environment variables.
pub struct Config {
    /// Primary video source (device path or URL).
    pub camera_source: SourceAddr,
    /// Local device tried when the primary source fails to open.
    pub fallback_source: SourceAddr,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Path of the gallery blob.
    pub gallery_path: PathBuf,
    /// Path of the confirmed-truancy records database.
    pub records_path: PathBuf,
    /// Directory proof images are written into.
    pub proof_dir: PathBuf,
    /// Cosine similarity a match must exceed to count.
    pub match_threshold: f32,
    /// Consecutive qualifying frames required before an alert.
    pub confirm_frames: u32,
    /// Delay after each accepted enrollment sample, so one pose instant is
    /// not captured twice.
    pub settle_ms: u64,
    /// Wait between surveillance cycles when no frame has arrived yet.
    pub idle_wait_ms: u64,
    /// Pose sequence an enrollment session walks through.
    pub pose_tasks: Vec<PoseTask>,
}

/// Default enrollment sequence: three frontal samples bracketing one turn
/// to each side.
const DEFAULT_POSE_TASKS: [PoseTask; 5] = [
    PoseTask::Center,
    PoseTask::Left,
    PoseTask::Right,
    PoseTask::Center,
    PoseTask::Center,
];

impl Config {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("truant");

        let model_dir = std::env::var("TRUANT_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| truant_core::default_model_dir());

        Self {
            camera_source: SourceAddr::parse(
                &std::env::var("TRUANT_CAMERA_SOURCE").unwrap_or_else(|_| "/dev/video0".to_string()),
            ),
            fallback_source: SourceAddr::parse(
                &std::env::var("TRUANT_FALLBACK_SOURCE")
                    .unwrap_or_else(|_| "/dev/video1".to_string()),
            ),
            model_dir,
            gallery_path: env_path("TRUANT_GALLERY_PATH", data_dir.join("gallery.json")),
            records_path: env_path("TRUANT_RECORDS_PATH", data_dir.join("records.db")),
            proof_dir: env_path("TRUANT_PROOF_DIR", data_dir.join("proofs")),
            match_threshold: env_f32("TRUANT_MATCH_THRESHOLD", 0.50),
            confirm_frames: env_u32("TRUANT_CONFIRM_FRAMES", 2),
            settle_ms: env_u64("TRUANT_SETTLE_MS", 300),
            idle_wait_ms: env_u64("TRUANT_IDLE_WAIT_MS", 10),
            pose_tasks: env_pose_tasks("TRUANT_POSE_TASKS"),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace embedding model.
    pub fn embedder_model_path(&self) -> String {
        self.model_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_pose_tasks(key: &str) -> Vec<PoseTask> {
    match std::env::var(key) {
        Ok(raw) => match parse_pose_tasks(&raw) {
            Some(tasks) => tasks,
            None => {
                tracing::warn!(%key, value = %raw, "invalid pose task list, using default");
                DEFAULT_POSE_TASKS.to_vec()
            }
        },
        Err(_) => DEFAULT_POSE_TASKS.to_vec(),
    }
}

/// Parse a comma-separated pose list ("center,left,right,center,center").
/// Returns `None` when empty or containing an unknown pose.
fn parse_pose_tasks(raw: &str) -> Option<Vec<PoseTask>> {
    let tasks: Vec<PoseTask> = raw
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.parse().ok())
        .collect::<Option<_>>()?;
    if tasks.is_empty() {
        None
    } else {
        Some(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pose_list_parses_with_duplicates() {
        let tasks = parse_pose_tasks("center, LEFT ,right,center,center").unwrap();
        assert_eq!(tasks, DEFAULT_POSE_TASKS.to_vec());
    }

    #[test]
    fn unknown_pose_rejects_whole_list() {
        assert!(parse_pose_tasks("center,upward").is_none());
    }

    #[test]
    fn empty_list_is_rejected() {
        assert!(parse_pose_tasks("").is_none());
        assert!(parse_pose_tasks(" , ,").is_none());
    }
}
