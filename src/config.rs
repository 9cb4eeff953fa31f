//! Call configuration
//!
//! Every section defaults to the fixed call profile, so an empty or
//! missing config file is valid.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::codec::device::{AudioParams, VideoParams};
use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    pub network: NetworkConfig,
    pub audio: AudioConfig,
    pub video: VideoConfig,
    pub codec: CodecConfig,
}

/// Datagram channel settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Local address to bind
    pub bind_address: IpAddr,
    /// Local UDP port
    pub port: u16,
    /// Port the peer listens on
    pub peer_port: u16,
    /// Datagram buffer size; payloads are capped at one byte less
    pub buffer_size: usize,
    /// Receive timeout so the receive pump can observe shutdown
    pub recv_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            peer_port: DEFAULT_PORT,
            buffer_size: MTU,
            recv_timeout_ms: 100,
        }
    }
}

impl NetworkConfig {
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    /// Largest payload `send` accepts
    pub fn max_payload(&self) -> usize {
        self.buffer_size.saturating_sub(1)
    }
}

/// Fixed audio profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub mime: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate: u32,
    /// Samples per codec-native frame
    pub frame_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            mime: crate::codec::opus::OPUS_MIME.to_string(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            bitrate: DEFAULT_AUDIO_BITRATE,
            frame_size: AUDIO_FRAME_SIZE,
        }
    }
}

impl AudioConfig {
    /// Codec parameters for a device buffer of `buffer_size` samples
    pub fn params(&self, buffer_size: usize) -> AudioParams {
        AudioParams {
            mime: self.mime.clone(),
            sample_rate: self.sample_rate,
            channels: self.channels,
            bitrate: self.bitrate,
            frame_size: self.frame_size,
            max_input_size: buffer_size * 2,
        }
    }
}

/// Fixed video profile; the image size comes from the opened camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub mime: String,
    pub bitrate: u32,
    pub frame_rate: u32,
    pub key_frame_interval: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            mime: VIDEO_MIME.to_string(),
            bitrate: DEFAULT_VIDEO_BITRATE,
            frame_rate: DEFAULT_VIDEO_FRAME_RATE,
            key_frame_interval: DEFAULT_KEY_FRAME_INTERVAL,
        }
    }
}

impl VideoConfig {
    /// Codec parameters for the camera's actual image size
    pub fn params(&self, width: u32, height: u32) -> VideoParams {
        VideoParams {
            mime: self.mime.clone(),
            width,
            height,
            bitrate: self.bitrate,
            frame_rate: self.frame_rate,
            key_frame_interval: self.key_frame_interval,
        }
    }
}

/// Codec buffer-queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Bounded wait when acquiring a codec buffer slot
    pub buffer_timeout_us: u64,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            buffer_timeout_us: CODEC_TIMEOUT_US,
        }
    }
}

impl CodecConfig {
    pub fn buffer_timeout(&self) -> Duration {
        Duration::from_micros(self.buffer_timeout_us)
    }
}

impl CallConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: CallConfig =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Per-user config file location
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "p2p-call", "p2p-call-streamer")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load the per-user config file, falling back to defaults if absent
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::info!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject values the pipelines cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.network.buffer_size < 2 {
            return Err(Error::Config(format!(
                "network.buffer_size must be at least 2, got {}",
                self.network.buffer_size
            )));
        }
        if self.audio.frame_size == 0 {
            return Err(Error::Config("audio.frame_size must be positive".into()));
        }
        if !matches!(self.audio.channels, 1 | 2) {
            return Err(Error::Config(format!(
                "audio.channels must be 1 or 2, got {}",
                self.audio.channels
            )));
        }
        if self.video.frame_rate == 0 {
            return Err(Error::Config("video.frame_rate must be positive".into()));
        }
        Ok(())
    }
}
