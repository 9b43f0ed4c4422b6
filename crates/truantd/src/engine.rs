//! The engine thread: single owner of all camera-bound work.
//!
//! Inference sessions and the camera cannot be shared across threads, so
//! one dedicated OS thread owns the oracle and serializes enrollment and
//! surveillance against the device. D-Bus handlers talk to it through an
//! mpsc request channel with oneshot replies; everything reviewer-facing
//! (alerts, records, gallery snapshots) lives in [`EngineShared`] and is
//! safe to touch from any handler directly.

use crate::config::Config;
use crate::enroll::{run_enrollment, EnrollError};
use crate::records::{RecordError, RecordStore};
use crate::session::{FaceObservation, WatchSession};
use crate::store::GalleryStore;
use crate::watch::AlertRegistry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use truant_core::onnx::OnnxOracle;
use truant_core::{FaceOracle, OracleError};
use truant_hw::CameraError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("surveillance is already running")]
    AlreadyWatching,
    #[error("no surveillance session is active")]
    NotWatching,
    #[error("enrollment needs the camera; stop surveillance first")]
    SurveillanceActive,
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Enroll(#[from] EnrollError),
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Records(#[from] RecordError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// State shared between the engine thread and request handlers. Explicitly
/// owned here and passed by handle — nothing in the daemon is a process
/// global.
pub struct EngineShared {
    pub store: GalleryStore,
    pub alerts: AlertRegistry,
    pub records: RecordStore,
    /// Cooperative abort flag for an in-flight enrollment.
    pub cancel_enroll: AtomicBool,
    /// Whether a surveillance session is currently running.
    pub watching: AtomicBool,
    observations: Mutex<Vec<FaceObservation>>,
}

impl EngineShared {
    /// Overlay data from the most recently processed frame.
    pub fn observations(&self) -> Vec<FaceObservation> {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_observations(&self, observations: Vec<FaceObservation>) {
        *self
            .observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = observations;
    }
}

enum EngineRequest {
    StartWatch {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    StopWatch {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Enroll {
        identity: String,
        reply: oneshot::Sender<Result<usize, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    shared: Arc<EngineShared>,
}

impl EngineHandle {
    pub fn shared(&self) -> &EngineShared {
        &self.shared
    }

    /// Start the surveillance session. Rejected outright if one is running.
    pub async fn start_watch(&self) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::StartWatch { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Stop the surveillance session and clear pending alerts. Returns once
    /// the camera has been released.
    pub async fn stop_watch(&self) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::StopWatch { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Enroll an identity; blocks until the pose sequence completes or
    /// fails. Returns the number of templates stored.
    pub async fn enroll(&self, identity: &str) -> Result<usize, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll {
                identity: identity.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Load the models and stores, then spawn the engine on a dedicated OS
/// thread. Fails fast if a model is missing; a missing or corrupt gallery
/// degrades to empty instead.
pub fn spawn_engine(cfg: Config) -> Result<EngineHandle, EngineError> {
    let oracle = OnnxOracle::load(&cfg.detector_model_path(), &cfg.embedder_model_path())?;
    tracing::info!(model_dir = %cfg.model_dir.display(), "face oracle loaded");

    let store = GalleryStore::open(cfg.gallery_path.clone());
    let records = RecordStore::open(&cfg.records_path)?;

    let shared = Arc::new(EngineShared {
        store,
        alerts: AlertRegistry::default(),
        records,
        cancel_enroll: AtomicBool::new(false),
        watching: AtomicBool::new(false),
        observations: Mutex::new(Vec::new()),
    });

    let (tx, rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("truant-engine".into())
        .spawn({
            let shared = Arc::clone(&shared);
            move || engine_thread(rx, oracle, shared, cfg)
        })
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx, shared })
}

/// Engine main loop. Idle: park on the channel. Watching: drain control
/// requests without blocking, then run one surveillance cycle — the stop
/// flag is effectively checked once per iteration, never preemptively.
fn engine_thread(
    mut rx: mpsc::Receiver<EngineRequest>,
    mut oracle: impl FaceOracle,
    shared: Arc<EngineShared>,
    cfg: Config,
) {
    tracing::info!("engine thread started");
    let mut session: Option<WatchSession> = None;

    'run: loop {
        if session.is_none() {
            match rx.blocking_recv() {
                Some(req) => handle_request(req, &mut session, &mut oracle, &shared, &cfg),
                None => break 'run,
            }
        } else {
            loop {
                match rx.try_recv() {
                    Ok(req) => handle_request(req, &mut session, &mut oracle, &shared, &cfg),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => break 'run,
                }
            }
            if let Some(active) = session.as_mut() {
                active.cycle(&mut oracle, &shared, &cfg.proof_dir);
            }
        }
    }

    // daemon shutting down: release the camera before exiting
    if let Some(active) = session.take() {
        active.close();
        shared.watching.store(false, Ordering::SeqCst);
    }
    tracing::info!("engine thread exiting");
}

fn handle_request(
    req: EngineRequest,
    session: &mut Option<WatchSession>,
    oracle: &mut dyn FaceOracle,
    shared: &EngineShared,
    cfg: &Config,
) {
    match req {
        EngineRequest::StartWatch { reply } => {
            let result = if session.is_some() {
                Err(EngineError::AlreadyWatching)
            } else {
                match WatchSession::open(cfg) {
                    Ok(new_session) => {
                        *session = Some(new_session);
                        shared.watching.store(true, Ordering::SeqCst);
                        tracing::info!("surveillance session started");
                        Ok(())
                    }
                    Err(e) => Err(EngineError::Camera(e)),
                }
            };
            let _ = reply.send(result);
        }

        EngineRequest::StopWatch { reply } => {
            let result = match session.take() {
                Some(active) => {
                    active.close();
                    shared.watching.store(false, Ordering::SeqCst);
                    let cleared = shared.alerts.clear();
                    shared.set_observations(Vec::new());
                    tracing::info!(cleared, "surveillance session stopped, pending alerts cleared");
                    Ok(())
                }
                None => Err(EngineError::NotWatching),
            };
            let _ = reply.send(result);
        }

        EngineRequest::Enroll { identity, reply } => {
            let result = if session.is_some() {
                Err(EngineError::SurveillanceActive)
            } else {
                enroll_identity(&identity, oracle, shared, cfg)
            };
            let _ = reply.send(result);
        }
    }
}

fn enroll_identity(
    identity: &str,
    oracle: &mut dyn FaceOracle,
    shared: &EngineShared,
    cfg: &Config,
) -> Result<usize, EngineError> {
    shared.cancel_enroll.store(false, Ordering::SeqCst);

    let camera = truant_hw::Camera::open_with_fallback(&cfg.camera_source, &cfg.fallback_source)
        .map_err(EnrollError::CameraUnavailable)?;
    let mut reader = camera.reader().map_err(EnrollError::CameraUnavailable)?;

    let templates = run_enrollment(
        &mut reader,
        oracle,
        &cfg.pose_tasks,
        cfg.settle(),
        &shared.cancel_enroll,
    )?;
    drop(reader); // release the device before touching the store

    let count = templates.len();
    shared
        .store
        .publish(identity, templates)
        .map_err(EnrollError::Store)?;
    tracing::info!(identity, templates = count, "enrollment complete, gallery published");
    Ok(count)
}
