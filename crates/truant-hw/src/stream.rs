//! Continuous frame producer with a single latest-frame slot.
//!
//! A dedicated thread reads the camera as fast as it delivers and overwrites
//! one shared slot. Consumers poll [`VideoStream::latest`] and always see the
//! most recent frame available; there is no queue, so a slow consumer skips
//! intervening frames instead of building backlog, and may re-read the same
//! frame when it outpaces the camera.

use crate::camera::Camera;
use crate::frame::{Frame, FrameFeed};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(50);

/// The shared slot. Overwrite-only; never blocks on consumer speed.
#[derive(Default)]
pub(crate) struct LatestSlot {
    frame: Mutex<Option<Frame>>,
}

impl LatestSlot {
    pub(crate) fn publish(&self, frame: Frame) {
        let mut slot = self.frame.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(frame);
    }

    pub(crate) fn latest(&self) -> Option<Frame> {
        self.frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct Shared {
    slot: LatestSlot,
    running: AtomicBool,
}

/// Handle to a running frame producer.
pub struct VideoStream {
    shared: Arc<Shared>,
    producer: Option<thread::JoinHandle<()>>,
}

impl VideoStream {
    /// Take ownership of an opened camera and start producing frames.
    pub fn start(camera: Camera) -> Self {
        let shared = Arc::new(Shared {
            slot: LatestSlot::default(),
            running: AtomicBool::new(true),
        });

        let producer = thread::Builder::new()
            .name("truant-frames".into())
            .spawn({
                let shared = Arc::clone(&shared);
                move || produce(camera, &shared)
            })
            .expect("failed to spawn frame producer thread");

        Self {
            shared,
            producer: Some(producer),
        }
    }

    /// Most recent frame, if any has been captured yet.
    pub fn latest(&self) -> Option<Frame> {
        self.shared.slot.latest()
    }

    /// Whether the producer is still delivering frames.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    /// Stop the producer and wait for it to exit. When this returns the
    /// camera handle has been dropped and the device is free for the next
    /// session.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.shared.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.producer.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for VideoStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn produce(camera: Camera, shared: &Shared) {
    let mut reader = match camera.reader() {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(source = %camera.source, error = %e, "frame producer could not start capture");
            shared.running.store(false, Ordering::Relaxed);
            return;
        }
    };

    tracing::info!(source = %camera.source, "frame producer started");
    while shared.running.load(Ordering::Relaxed) {
        match reader.next_frame() {
            Ok(frame) => shared.slot.publish(frame),
            Err(e) => {
                tracing::warn!(error = %e, "frame capture failed, retrying");
                thread::sleep(CAPTURE_RETRY_DELAY);
            }
        }
    }
    tracing::info!(source = %camera.source, "frame producer stopped");
    // camera drops here, releasing the device
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequence: u32) -> Frame {
        Frame {
            data: vec![0u8; 4],
            width: 2,
            height: 2,
            captured_at: std::time::Instant::now(),
            sequence,
        }
    }

    #[test]
    fn empty_slot_has_no_frame() {
        assert!(LatestSlot::default().latest().is_none());
    }

    #[test]
    fn slot_overwrites_and_keeps_only_newest() {
        let slot = LatestSlot::default();
        for seq in 0..10 {
            slot.publish(frame(seq));
        }
        assert_eq!(slot.latest().unwrap().sequence, 9);
    }

    #[test]
    fn latest_does_not_consume() {
        let slot = LatestSlot::default();
        slot.publish(frame(3));
        assert_eq!(slot.latest().unwrap().sequence, 3);
        assert_eq!(slot.latest().unwrap().sequence, 3);
    }
}
