//! V4L2 camera capture via the `v4l` crate, with primary/fallback source
//! selection.

use crate::frame::{self, Frame, FrameFeed};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("unsupported source {0}: network ingestion requires a local relay device")]
    UnsupportedSource(String),
}

/// Where frames come from: a local V4L2 device node or a network URL.
///
/// URL sources are recognized so deployments can configure them, but this
/// build does not ingest network video — opening one fails cleanly and the
/// caller falls through to the local fallback device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceAddr {
    Device(String),
    Url(String),
}

impl SourceAddr {
    pub fn parse(s: &str) -> SourceAddr {
        let trimmed = s.trim();
        if trimmed.contains("://") {
            SourceAddr::Url(trimmed.to_string())
        } else {
            SourceAddr::Device(trimmed.to_string())
        }
    }
}

impl fmt::Display for SourceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceAddr::Device(p) => f.write_str(p),
            SourceAddr::Url(u) => f.write_str(u),
        }
    }
}

/// Negotiated pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, luma extracted).
    Yuyv,
    /// 8-bit grayscale (1 byte/pixel).
    Grey,
}

/// An opened V4L2 camera.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub source: String,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a source. URL sources are rejected with `UnsupportedSource`.
    pub fn open(addr: &SourceAddr) -> Result<Self, CameraError> {
        let device_path = match addr {
            SourceAddr::Device(p) => p,
            SourceAddr::Url(u) => {
                return Err(CameraError::UnsupportedSource(u.clone()));
            }
        };

        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to query capabilities: {e}")))?;

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        // Request 640x480 YUYV; accept whatever the driver negotiates as
        // long as it is a format we can convert.
        let mut fmt = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to get format: {e}")))?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = 640;
        fmt.height = 480;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to set format: {e}")))?;

        let pixel_format = if negotiated.fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if negotiated.fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format {:?} (need YUYV or GREY)",
                negotiated.fourcc
            )));
        };

        tracing::info!(
            source = device_path,
            driver = %caps.driver,
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "camera opened"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            source: device_path.to_string(),
            pixel_format,
        })
    }

    /// Open the primary source, falling back to the secondary on failure.
    /// Both failing yields the fallback's error.
    pub fn open_with_fallback(
        primary: &SourceAddr,
        fallback: &SourceAddr,
    ) -> Result<Self, CameraError> {
        match Self::open(primary) {
            Ok(camera) => Ok(camera),
            Err(e) => {
                tracing::warn!(source = %primary, error = %e, fallback = %fallback, "primary source failed, trying fallback");
                Self::open(fallback)
            }
        }
    }

    /// Start a capture stream over this camera. The reader borrows the
    /// camera; dropping both releases the device.
    pub fn reader(&self) -> Result<CaptureReader<'_>, CameraError> {
        let stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;
        Ok(CaptureReader {
            stream,
            width: self.width,
            height: self.height,
            pixel_format: self.pixel_format,
        })
    }

    /// Capture a single frame (diagnostics path).
    pub fn capture_frame(&self) -> Result<Frame, CameraError> {
        self.reader()?.next_frame()
    }
}

/// Streaming frame reader over an open camera.
pub struct CaptureReader<'a> {
    stream: MmapStream<'a>,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
}

impl CaptureReader<'_> {
    fn to_grayscale(&self, buf: &[u8]) -> Result<Vec<u8>, CameraError> {
        match self.pixel_format {
            PixelFormat::Grey => {
                let pixels = (self.width * self.height) as usize;
                if buf.len() < pixels {
                    return Err(CameraError::CaptureFailed(format!(
                        "GREY buffer too short: expected {pixels}, got {}",
                        buf.len()
                    )));
                }
                Ok(buf[..pixels].to_vec())
            }
            PixelFormat::Yuyv => frame::yuyv_to_grayscale(buf, self.width, self.height),
        }
    }
}

impl FrameFeed for CaptureReader<'_> {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let data = self.to_grayscale(buf)?;
        Ok(Frame {
            data,
            width: self.width,
            height: self.height,
            captured_at: std::time::Instant::now(),
            sequence: meta.sequence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_paths_parse_as_devices() {
        assert_eq!(
            SourceAddr::parse("/dev/video0"),
            SourceAddr::Device("/dev/video0".into())
        );
    }

    #[test]
    fn urls_parse_as_urls() {
        for url in ["http://10.0.0.2:8080/video", "rtsp://cam.local/stream"] {
            assert_eq!(SourceAddr::parse(url), SourceAddr::Url(url.into()));
        }
    }

    #[test]
    fn parse_trims_whitespace() {
        assert_eq!(
            SourceAddr::parse("  /dev/video1\n"),
            SourceAddr::Device("/dev/video1".into())
        );
    }

    #[test]
    fn url_sources_are_rejected_on_open() {
        let err = Camera::open(&SourceAddr::Url("rtsp://cam.local/s".into())).unwrap_err();
        assert!(matches!(err, CameraError::UnsupportedSource(_)));
    }

    #[test]
    fn missing_device_is_not_found() {
        let err = Camera::open(&SourceAddr::Device("/dev/truant-no-such-device".into())).unwrap_err();
        assert!(matches!(err, CameraError::DeviceNotFound(_)));
    }
}
