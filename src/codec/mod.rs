//! Codec pipeline
//!
//! Encoder/decoder pairs for audio and video, driven through a
//! buffer-queue device interface so platform hardware codecs and the
//! built-in Opus backend plug in the same way.

pub mod audio;
pub mod device;
pub mod opus;
pub mod queue;
pub mod unit;
pub mod video;

pub use audio::AudioCodecs;
pub use device::{
    AudioParams, BufferFlags, BufferInfo, CodecDevice, CodecFactory, InputStatus, MediaFormat,
    OutputStatus, RenderSurface, SlotIndex, VideoParams,
};
pub use opus::OpusCodecFactory;
pub use queue::{FrameProcessor, ProcessedUnit, QueuedCodec};
pub use unit::{CodecState, CodecUnit};
pub use video::VideoCodecs;
