//! Audio subsystem: device access, playback double buffer, call pipeline

pub mod buffer;
pub mod device;
pub mod resample;
pub mod stream;

pub use buffer::{buffer_size_for, DoubleBuffer};
#[cfg(feature = "cpal-audio")]
pub use device::CpalBackend;
pub use device::{AudioBackend, AudioInput, AudioOutput};
pub use resample::FormatConverter;
pub use stream::AudioStream;
