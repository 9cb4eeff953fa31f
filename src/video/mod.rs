//! Video subsystem: camera geometry and the call pipeline
//!
//! Camera and display devices belong to the platform; this module only
//! glues their frames and surfaces to the codecs and the session.

pub mod convert;
pub mod stream;

pub use convert::{display_rotation, rotate_yv12_to_i420, yv12_buffer_size, CameraFacing};
pub use stream::{CameraInfo, VideoStream};
