//! V4L2 webcam capture via the `v4l` crate.

use crate::frame::{self, Frame};
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Number of `/dev/videoN` nodes probed when no device is configured.
const PROBE_DEVICE_COUNT: u32 = 5;
const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;

/// Failure to open a camera. Fatal to the caller that asked for it.
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("no working camera found on /dev/video0..{}", PROBE_DEVICE_COUNT - 1)]
    NoDeviceAvailable,
    #[error("device busy: {0}")]
    DeviceBusy(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("video capture not supported by {0}")]
    StreamingNotSupported(String),
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Failure to acquire a single frame from an open camera.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// One bad frame; the next read may succeed.
    #[error("transient capture failure: {0}")]
    Transient(String),
    /// The device went away; no further frames will arrive.
    #[error("camera disconnected: {0}")]
    Disconnected(String),
}

/// An open camera producing frames. Owned by exactly one thread at a time.
pub trait FrameSource: Send {
    fn capture_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Device identifier for logs.
    fn device(&self) -> &str;
}

/// Opens cameras on demand.
pub trait CameraProvider: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError>;
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Motion-JPEG, one JPEG per buffer.
    Mjpg,
}

/// Open V4L2 camera with a running mmap stream.
pub struct V4lCamera {
    // Field order matters: the stream must be torn down before the device.
    stream: MmapStream<'static>,
    #[allow(dead_code)]
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pixel_format: PixelFormat,
}

impl V4lCamera {
    /// Open a V4L2 camera by path (e.g., "/dev/video0") and start streaming.
    pub fn open(device_path: &str, timeout: Duration) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| open_error(device_path, e))?;

        let caps = device.query_caps().map_err(|e| CameraError::Io {
            path: device_path.to_string(),
            source: e,
        })?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported(device_path.to_string()));
        }

        tracing::info!(device = device_path, driver = %caps.driver, card = %caps.card, "opened camera");

        // Prefer YUYV (cheap to convert); fall back to whatever MJPG the driver offers.
        let mut fmt = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("get format: {e}")))?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = REQUESTED_WIDTH;
        fmt.height = REQUESTED_HEIGHT;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("set format: {e}")))?;

        let pixel_format = if negotiated.fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if negotiated.fourcc == FourCC::new(b"MJPG") {
            PixelFormat::Mjpg
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format {} (need YUYV or MJPG)",
                negotiated.fourcc
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = %negotiated.fourcc,
            "negotiated format"
        );

        let mut stream = MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| open_error(device_path, e))?;
        stream.set_timeout(timeout);

        Ok(Self {
            stream,
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            pixel_format,
        })
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

impl FrameSource for V4lCamera {
    fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        let (buf, meta) = match self.stream.next() {
            Ok(next) => next,
            Err(e) => {
                let present = Path::new(&self.device_path).exists();
                return Err(classify_io_error(&e, present));
            }
        };

        let image = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height),
            PixelFormat::Mjpg => frame::mjpeg_to_rgb(&buf[..(meta.bytesused as usize).min(buf.len())]),
        }
        .map_err(|e| CaptureError::Transient(e.to_string()))?;

        Ok(Frame::new(image, meta.sequence))
    }

    fn device(&self) -> &str {
        &self.device_path
    }
}

impl Drop for V4lCamera {
    fn drop(&mut self) {
        tracing::info!(device = %self.device_path, "camera released");
    }
}

/// Opens a configured device, or probes `/dev/video0..4` for the first one
/// that opens and delivers a frame.
#[derive(Debug, Clone)]
pub struct V4lCameraProvider {
    device: Option<String>,
    timeout: Duration,
}

impl V4lCameraProvider {
    pub fn new(device: Option<String>, timeout: Duration) -> Self {
        Self { device, timeout }
    }
}

impl CameraProvider for V4lCameraProvider {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        if let Some(path) = &self.device {
            return Ok(Box::new(V4lCamera::open(path, self.timeout)?));
        }

        for index in 0..PROBE_DEVICE_COUNT {
            let path = format!("/dev/video{index}");
            let mut camera = match V4lCamera::open(&path, self.timeout) {
                Ok(camera) => camera,
                Err(e) => {
                    tracing::debug!(device = %path, error = %e, "camera probe: not usable");
                    continue;
                }
            };
            match camera.capture_frame() {
                Ok(_) => {
                    tracing::info!(device = %path, "camera probe: found working camera");
                    return Ok(Box::new(camera));
                }
                Err(e) => tracing::debug!(device = %path, error = %e, "camera probe: no frame"),
            }
        }

        Err(CameraError::NoDeviceAvailable)
    }
}

fn open_error(path: &str, e: io::Error) -> CameraError {
    if e.raw_os_error() == Some(libc::EBUSY) {
        CameraError::DeviceBusy(path.to_string())
    } else {
        CameraError::Io {
            path: path.to_string(),
            source: e,
        }
    }
}

/// Decide whether a dequeue failure means the device is gone.
///
/// `ENODEV`/`ENXIO`/`ESHUTDOWN` are reported by the UVC driver after unplug;
/// an `EIO` only counts when the device node has also disappeared.
pub fn classify_io_error(e: &io::Error, node_present: bool) -> CaptureError {
    let gone = match e.raw_os_error() {
        Some(libc::ENODEV) | Some(libc::ENXIO) | Some(libc::ESHUTDOWN) => true,
        Some(libc::EIO) | Some(libc::ENOENT) => !node_present,
        _ => !node_present && e.kind() != io::ErrorKind::TimedOut,
    };

    if gone {
        CaptureError::Disconnected(e.to_string())
    } else {
        CaptureError::Transient(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enodev_is_disconnect() {
        let e = io::Error::from_raw_os_error(libc::ENODEV);
        assert!(matches!(classify_io_error(&e, true), CaptureError::Disconnected(_)));
    }

    #[test]
    fn test_eio_depends_on_node() {
        let e = io::Error::from_raw_os_error(libc::EIO);
        assert!(matches!(classify_io_error(&e, true), CaptureError::Transient(_)));
        assert!(matches!(classify_io_error(&e, false), CaptureError::Disconnected(_)));
    }

    #[test]
    fn test_timeout_is_transient() {
        let e = io::Error::new(io::ErrorKind::TimedOut, "VIDIOC_DQBUF");
        assert!(matches!(classify_io_error(&e, true), CaptureError::Transient(_)));
        assert!(matches!(classify_io_error(&e, false), CaptureError::Transient(_)));
    }

    #[test]
    fn test_eagain_is_transient() {
        let e = io::Error::from_raw_os_error(libc::EAGAIN);
        assert!(matches!(classify_io_error(&e, true), CaptureError::Transient(_)));
    }

    #[test]
    fn test_open_missing_device() {
        let err = V4lCamera::open("/dev/video-rollcall-missing", Duration::from_millis(10))
            .err()
            .unwrap();
        assert!(matches!(err, CameraError::DeviceNotFound(_)));
    }

    #[test]
    fn test_busy_open_error() {
        let err = open_error("/dev/video0", io::Error::from_raw_os_error(libc::EBUSY));
        assert!(matches!(err, CameraError::DeviceBusy(_)));
    }
}
