//! truant-hw — hardware abstraction for the Truant monitor.
//!
//! V4L2-based camera access with primary/fallback source selection, frame
//! conversion, and the continuous single-slot frame producer the
//! surveillance loop reads from.

pub mod camera;
pub mod frame;
pub mod stream;

pub use camera::{Camera, CameraError, CaptureReader, SourceAddr};
pub use frame::{Frame, FrameFeed};
pub use stream::VideoStream;
