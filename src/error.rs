//! Error types for the call transport core

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Video error: {0}")]
    Video(#[from] VideoError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio device errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("cpal error: {0}")]
    CpalError(String),
}

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoder initialization failed: {0}")]
    EncoderInit(String),

    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    /// The codec was stopped or released while a buffer operation was in flight
    #[error("Codec in illegal state: {0}")]
    IllegalState(String),

    #[error("Invalid buffer index: {0}")]
    InvalidSlot(usize),

    #[error("Invalid frame size: {0}")]
    InvalidFrameSize(usize),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Address resolution failed: {0}")]
    ResolveFailed(String),

    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),

    #[error("Invalid packet format")]
    InvalidPacket,

    #[error("Unknown packet type: {0}")]
    UnknownPacketType(u8),

    #[error("Channel closed")]
    Closed,
}

/// Video pipeline errors
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Unsupported rotation: {0}")]
    UnsupportedRotation(u32),

    #[error("Unsupported camera size: {width}x{height}, both dimensions must be even")]
    UnsupportedSize { width: u32, height: u32 },

    #[error("Frame buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker already started")]
    AlreadyStarted,

    #[error("Failed to spawn thread: {0}")]
    SpawnFailed(String),

    #[error("Worker thread panicked: {0}")]
    Panicked(String),
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Why a pipeline or session terminated
///
/// Delivered exactly once through the owning pipeline's termination callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Datagram channel could not be created or configured
    Channel(String),
    /// Peer address could not be resolved
    Resolve(String),
    /// Microphone or speaker could not be opened
    AudioDevice(String),
    /// Camera or display could not be opened
    VideoDevice(String),
    /// Codec could not be instantiated or configured
    Codec(String),
    /// A pump thread ended with an unexpected fault
    Worker(String),
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::Channel(msg) => write!(f, "channel failure: {}", msg),
            TerminationReason::Resolve(msg) => write!(f, "address resolution failure: {}", msg),
            TerminationReason::AudioDevice(msg) => write!(f, "audio device failure: {}", msg),
            TerminationReason::VideoDevice(msg) => write!(f, "video device failure: {}", msg),
            TerminationReason::Codec(msg) => write!(f, "codec failure: {}", msg),
            TerminationReason::Worker(msg) => write!(f, "worker failure: {}", msg),
        }
    }
}

impl From<&Error> for TerminationReason {
    fn from(err: &Error) -> Self {
        match err {
            Error::Audio(e) => TerminationReason::AudioDevice(e.to_string()),
            Error::Codec(e) => TerminationReason::Codec(e.to_string()),
            Error::Network(NetworkError::ResolveFailed(msg)) => {
                TerminationReason::Resolve(msg.clone())
            }
            Error::Network(e) => TerminationReason::Channel(e.to_string()),
            Error::Video(e) => TerminationReason::VideoDevice(e.to_string()),
            Error::Io(e) => TerminationReason::Channel(e.to_string()),
            Error::Worker(e) => TerminationReason::Worker(e.to_string()),
            Error::Config(msg) => TerminationReason::Worker(msg.clone()),
        }
    }
}
