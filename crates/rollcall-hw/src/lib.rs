//! rollcall-hw — Camera capture for the attendance daemon.
//!
//! Provides V4L2-based camera access behind the [`VideoSource`] trait so the
//! driver loop can be exercised without hardware.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::Frame;
pub use source::VideoSource;
