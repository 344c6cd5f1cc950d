//! rollcall-hw: Webcam capture for recognition sessions.
//!
//! Provides V4L2 camera access, frame conversion to RGB and classification
//! of capture failures into transient errors and device loss.

pub mod camera;
pub mod frame;

pub use camera::{
    CameraError, CameraProvider, CaptureError, DeviceInfo, FrameSource, PixelFormat, V4lCamera,
    V4lCameraProvider,
};
pub use frame::Frame;
