//! Buffer-queue codec device interface
//!
//! Codec backends (platform hardware codecs, or the software
//! [`QueuedCodec`](super::queue::QueuedCodec)) expose two queues of
//! fixed buffers. The caller acquires an input slot, fills it and queues it;
//! later it acquires a filled output slot, reads it and releases it. Slot
//! indices are opaque and valid only between acquire and release.

use std::sync::Arc;
use std::time::Duration;

use crate::error::CodecError;

/// Opaque buffer slot index
pub type SlotIndex = usize;

/// Result of acquiring an input slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStatus {
    /// Slot ready to be filled
    Filled(SlotIndex),
    /// No slot became free within the timeout
    NoBufferAvailable,
}

/// Flags attached to an output buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferFlags {
    /// Buffer holds codec initialization data, not a media frame
    pub codec_config: bool,
    /// Buffer holds a key frame
    pub key_frame: bool,
}

/// Metadata for a filled output buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    /// Valid bytes at the start of the buffer
    pub size: usize,
    pub flags: BufferFlags,
}

/// Result of acquiring an output slot
#[derive(Debug, Clone, PartialEq)]
pub enum OutputStatus {
    /// Slot holds output described by `info`
    Filled { slot: SlotIndex, info: BufferInfo },
    /// Nothing ready within the timeout
    NoBufferAvailable,
    /// The device reallocated its output buffers; previous slots are invalid
    BuffersChanged,
    /// The device changed its output format
    FormatChanged(MediaFormat),
}

/// Audio stream parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioParams {
    pub mime: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate: u32,
    /// Samples per codec-native frame (per channel)
    pub frame_size: usize,
    /// Largest input buffer the encoder must accept, in bytes
    pub max_input_size: usize,
}

/// Video stream parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoParams {
    pub mime: String,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub frame_rate: u32,
    /// Seconds between key frames
    pub key_frame_interval: u32,
}

/// Format handed to a codec factory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaFormat {
    Audio(AudioParams),
    Video(VideoParams),
}

impl MediaFormat {
    pub fn mime(&self) -> &str {
        match self {
            MediaFormat::Audio(p) => &p.mime,
            MediaFormat::Video(p) => &p.mime,
        }
    }
}

/// Platform render target for decoded video
///
/// Decoded images go straight from the decoder to the surface, never back
/// through the caller.
pub trait RenderSurface: Send + Sync {
    /// Surface size in pixels (width, height)
    fn size(&self) -> (u32, u32);

    /// Present one decoded image
    fn present(&self, image: &[u8]);
}

/// A configured codec instance speaking the buffer-queue protocol
pub trait CodecDevice: Send {
    /// Begin processing; buffer operations are illegal before this
    fn start(&mut self) -> Result<(), CodecError>;

    /// Acquire a free input slot, waiting at most `timeout`
    fn dequeue_input(&mut self, timeout: Duration) -> Result<InputStatus, CodecError>;

    /// Writable storage for an acquired input slot
    fn input_buffer(&mut self, slot: SlotIndex) -> Result<&mut [u8], CodecError>;

    /// Submit `len` bytes of an acquired input slot for processing
    fn queue_input(&mut self, slot: SlotIndex, len: usize) -> Result<(), CodecError>;

    /// Acquire a filled output slot, waiting at most `timeout`
    fn dequeue_output(&mut self, timeout: Duration) -> Result<OutputStatus, CodecError>;

    /// Readable storage for an acquired output slot
    fn output_buffer(&self, slot: SlotIndex) -> Result<&[u8], CodecError>;

    /// Return an output slot; `render` sends it to the render surface first
    fn release_output(&mut self, slot: SlotIndex, render: bool) -> Result<(), CodecError>;

    /// Stop processing
    fn stop(&mut self) -> Result<(), CodecError>;

    /// Free all resources; the device is unusable afterwards
    fn release(&mut self);
}

/// Instantiates codec devices for a fixed format
pub trait CodecFactory: Send + Sync {
    fn create_encoder(&self, format: &MediaFormat) -> Result<Box<dyn CodecDevice>, CodecError>;

    /// `surface` is set for video decoders that render directly
    fn create_decoder(
        &self,
        format: &MediaFormat,
        surface: Option<Arc<dyn RenderSurface>>,
    ) -> Result<Box<dyn CodecDevice>, CodecError>;
}
