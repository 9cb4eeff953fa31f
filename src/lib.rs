//! # P2P Call Streamer
//!
//! Real-time transport core for a peer-to-peer audio/video call over an
//! unreliable datagram link.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────── PEER A ─────────────────────────────────┐
//! │  ┌────────────┐    ┌──────────────┐                                      │
//! │  │ Microphone │    │ Camera frame │ (device callback, 2 buffers)         │
//! │  └─────┬──────┘    └──────┬───────┘                                      │
//! │        ▼                  ▼                                              │
//! │  ┌────────────┐    ┌──────────────┐                                      │
//! │  │  Recorder  │    │ rotate YV12  │                                      │
//! │  │   pump     │    │   → I420     │                                      │
//! │  └─────┬──────┘    └──────┬───────┘                                      │
//! │        ▼                  ▼                                              │
//! │  ┌────────────┐    ┌──────────────┐                                      │
//! │  │Opus encoder│    │video encoder │ + cached config header               │
//! │  └─────┬──────┘    └──────┬───────┘                                      │
//! │        └────────┬─────────┘                                              │
//! │                 ▼                                                        │
//! │  ┌─────────────────────────────────────┐                                 │
//! │  │ Session: single-slot send pump      │  [tag:u8][payload]              │
//! │  │          (newest packet wins)       │  0 = video, 1 = audio           │
//! │  └──────────────┬──────────────────────┘                                 │
//! └─────────────────┼────────────────────────────────────────────────────────┘
//!                   │ UDP, unordered, lossy
//! ┌─────────────────┼──────────────────────────────── PEER B ───────────────┐
//! │  ┌──────────────▼──────────────────────┐                                 │
//! │  │ Session: receive pump, learns peer  │                                 │
//! │  │ address from first datagram         │                                 │
//! │  └──────┬──────────────────┬───────────┘                                 │
//! │         ▼ tag 1            ▼ tag 0                                       │
//! │  ┌────────────┐    ┌──────────────┐                                      │
//! │  │Opus decoder│    │video decoder │ → render surface                     │
//! │  └─────┬──────┘    └──────────────┘                                      │
//! │        ▼                                                                 │
//! │  ┌────────────┐    collect ──swap──▶ play (one mutex)                    │
//! │  │ Player pump│ ─▶ speaker, zero-fill after each write                   │
//! │  └────────────┘                                                          │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod call;
pub mod codec;
pub mod config;
pub mod error;
pub mod network;
pub mod video;
pub mod worker;

pub use call::{Call, CallEvent};
pub use error::{Error, Result, TerminationReason};

/// Application-wide constants
pub mod constants {
    /// Fixed UDP port for both peers
    pub const DEFAULT_PORT: u16 = 54321;

    /// Datagram buffer size; payloads are capped at one byte less
    pub const MTU: usize = 65000;

    /// Audio sample rate
    pub const DEFAULT_SAMPLE_RATE: u32 = 8000;

    /// Mono
    pub const DEFAULT_CHANNELS: u16 = 1;

    /// Audio bitrate in bits per second
    pub const DEFAULT_AUDIO_BITRATE: u32 = 12_200;

    /// Codec-native audio frame: 20ms at 8kHz
    pub const AUDIO_FRAME_SIZE: usize = 160;

    /// Video codec MIME type
    pub const VIDEO_MIME: &str = "video/mp4v-es";

    /// Video bitrate in bits per second
    pub const DEFAULT_VIDEO_BITRATE: u32 = 500_000;

    pub const DEFAULT_VIDEO_FRAME_RATE: u32 = 15;

    /// Seconds between video key frames
    pub const DEFAULT_KEY_FRAME_INTERVAL: u32 = 5;

    /// Codec buffer acquisition timeout in microseconds
    pub const CODEC_TIMEOUT_US: u64 = 10_000;

    /// Camera buffers kept in flight
    pub const CAPTURE_BUFFERS: usize = 2;
}
