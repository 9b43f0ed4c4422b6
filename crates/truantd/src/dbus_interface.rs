use crate::engine::{EngineError, EngineHandle};
use zbus::interface;

/// D-Bus control surface for the Truant monitor.
///
/// Bus name: org.truant.Monitor1
/// Object path: /org/truant/Monitor1
///
/// The alert feed is poll-based: the review UI calls `Alerts` periodically;
/// there is no signal stream.
pub struct MonitorService {
    engine: EngineHandle,
}

impl MonitorService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

fn failed(err: EngineError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(err.to_string())
}

fn json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[interface(name = "org.truant.Monitor1")]
impl MonitorService {
    /// Start the surveillance session. Fails if one is already running.
    async fn start_session(&self) -> zbus::fdo::Result<()> {
        tracing::info!("start_session requested");
        self.engine.start_watch().await.map_err(failed)
    }

    /// Stop the surveillance session, releasing the camera and wiping all
    /// pending alerts.
    async fn stop_session(&self) -> zbus::fdo::Result<()> {
        tracing::info!("stop_session requested");
        self.engine.stop_watch().await.map_err(failed)
    }

    /// Enroll an identity through the pose sequence. Blocks until the
    /// capture session finishes; returns the number of stored templates.
    async fn enroll(&self, identity: &str) -> zbus::fdo::Result<u32> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs(
                "identity must not be empty".into(),
            ));
        }
        tracing::info!(identity, "enroll requested");
        self.engine
            .enroll(identity)
            .await
            .map(|n| n as u32)
            .map_err(failed)
    }

    /// Abort an in-flight enrollment at its next frame.
    async fn cancel_enroll(&self) -> zbus::fdo::Result<()> {
        tracing::info!("cancel_enroll requested");
        self.engine
            .shared()
            .cancel_enroll
            .store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    /// Pending alerts as JSON (identity, detection time, confidence
    /// percentage, proof reference).
    async fn alerts(&self) -> zbus::fdo::Result<String> {
        json(&self.engine.shared().alerts.pending())
    }

    /// Confirm a pending alert: persist a truancy record, then drop the
    /// alert from the registry. Returns false when nothing was pending for
    /// the identity.
    async fn mark(&self, identity: &str) -> zbus::fdo::Result<bool> {
        let shared = self.engine.shared();
        let Some(alert) = shared.alerts.get(identity) else {
            return Ok(false);
        };

        // Record first; the alert stays pending if persistence fails.
        shared
            .records
            .insert(&alert)
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        shared.alerts.remove(identity);
        tracing::info!(identity, proof = %alert.proof, "alert marked, truancy recorded");
        Ok(true)
    }

    /// Discard a pending alert without recording it.
    async fn dismiss(&self, identity: &str) -> zbus::fdo::Result<bool> {
        let dismissed = self.engine.shared().alerts.remove(identity).is_some();
        if dismissed {
            tracing::info!(identity, "alert dismissed");
        }
        Ok(dismissed)
    }

    /// Confirmed truancy records, newest first, as JSON.
    async fn records(&self, limit: u32) -> zbus::fdo::Result<String> {
        let records = self
            .engine
            .shared()
            .records
            .recent(limit)
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        json(&records)
    }

    /// Overlay data for the most recently processed frame, as JSON.
    async fn observations(&self) -> zbus::fdo::Result<String> {
        json(&self.engine.shared().observations())
    }

    /// Daemon status summary.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let shared = self.engine.shared();
        json(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "watching": shared.watching.load(std::sync::atomic::Ordering::SeqCst),
            "enrolled": shared.store.snapshot().len(),
            "pending_alerts": shared.alerts.pending().len(),
        }))
    }
}
