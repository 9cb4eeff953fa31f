//! Opus backend for the audio codec units
//!
//! Runs libopus behind the software buffer-queue device so the audio path
//! works without a platform codec. Input and output buffers carry mono or
//! stereo PCM as little-endian `i16`.

use std::sync::Arc;

use opus::{Application, Bitrate, Channels, Decoder, Encoder};

use crate::codec::device::{AudioParams, CodecDevice, CodecFactory, MediaFormat, RenderSurface};
use crate::codec::queue::{FrameProcessor, ProcessedUnit, QueuedCodec};
use crate::error::CodecError;

/// MIME type used for the fixed audio profile
pub const OPUS_MIME: &str = "audio/opus";

/// Buffer slots per direction
const QUEUE_SLOTS: usize = 4;

/// Largest Opus packet we expect to produce
const MAX_PACKET_SIZE: usize = 4000;

fn opus_channels(channels: u16) -> Option<Channels> {
    match channels {
        1 => Some(Channels::Mono),
        2 => Some(Channels::Stereo),
        _ => None,
    }
}

/// Opus encoder as a frame processor
pub struct OpusEncodeProcessor {
    encoder: Encoder,
    samples_per_frame: usize,
    pcm: Vec<i16>,
    packet: Vec<u8>,
}

impl OpusEncodeProcessor {
    pub fn new(params: &AudioParams) -> Result<Self, CodecError> {
        let channels = opus_channels(params.channels).ok_or_else(|| {
            CodecError::EncoderInit(format!("Unsupported channel count: {}", params.channels))
        })?;

        let mut encoder = Encoder::new(params.sample_rate, channels, Application::Voip)
            .map_err(|e| CodecError::EncoderInit(e.to_string()))?;
        encoder
            .set_bitrate(Bitrate::Bits(params.bitrate as i32))
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set bitrate: {}", e)))?;

        let samples_per_frame = params.frame_size * params.channels as usize;
        Ok(Self {
            encoder,
            samples_per_frame,
            pcm: Vec::with_capacity(samples_per_frame),
            packet: vec![0u8; MAX_PACKET_SIZE],
        })
    }
}

impl FrameProcessor for OpusEncodeProcessor {
    fn process(&mut self, input: &[u8]) -> Result<Vec<ProcessedUnit>, CodecError> {
        if input.len() != self.samples_per_frame * 2 {
            return Err(CodecError::InvalidFrameSize(input.len() / 2));
        }

        self.pcm.clear();
        self.pcm.extend(
            input
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]])),
        );

        let size = self
            .encoder
            .encode(&self.pcm, &mut self.packet)
            .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;
        Ok(vec![ProcessedUnit::frame(self.packet[..size].to_vec())])
    }
}

/// Opus decoder as a frame processor
pub struct OpusDecodeProcessor {
    decoder: Decoder,
    channels: usize,
    pcm: Vec<i16>,
}

impl OpusDecodeProcessor {
    pub fn new(params: &AudioParams) -> Result<Self, CodecError> {
        let channels = opus_channels(params.channels).ok_or_else(|| {
            CodecError::DecoderInit(format!("Unsupported channel count: {}", params.channels))
        })?;
        let decoder = Decoder::new(params.sample_rate, channels)
            .map_err(|e| CodecError::DecoderInit(e.to_string()))?;

        // 120ms is the longest Opus frame
        let max_samples = params.sample_rate as usize * 120 / 1000 * params.channels as usize;
        Ok(Self {
            decoder,
            channels: params.channels as usize,
            pcm: vec![0i16; max_samples],
        })
    }
}

impl FrameProcessor for OpusDecodeProcessor {
    fn process(&mut self, input: &[u8]) -> Result<Vec<ProcessedUnit>, CodecError> {
        let samples = self
            .decoder
            .decode(input, &mut self.pcm, false)
            .map_err(|e| CodecError::DecodingFailed(e.to_string()))?;

        let total = samples * self.channels;
        let bytes = self.pcm[..total]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        Ok(vec![ProcessedUnit::frame(bytes)])
    }
}

/// Codec factory for the Opus audio profile
///
/// Video formats are rejected; they come from the platform codec factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpusCodecFactory;

impl OpusCodecFactory {
    fn audio_params(format: &MediaFormat) -> Result<&AudioParams, CodecError> {
        match format {
            MediaFormat::Audio(params) if params.mime == OPUS_MIME => Ok(params),
            other => Err(CodecError::EncoderInit(format!(
                "No software codec for {}",
                other.mime()
            ))),
        }
    }
}

impl CodecFactory for OpusCodecFactory {
    fn create_encoder(&self, format: &MediaFormat) -> Result<Box<dyn CodecDevice>, CodecError> {
        let params = Self::audio_params(format)?;
        let processor = OpusEncodeProcessor::new(params)?;
        let input_size = params
            .max_input_size
            .max(params.frame_size * params.channels as usize * 2);
        Ok(Box::new(QueuedCodec::new(
            "opus encoder",
            processor,
            QUEUE_SLOTS,
            input_size,
        )))
    }

    fn create_decoder(
        &self,
        format: &MediaFormat,
        _surface: Option<Arc<dyn RenderSurface>>,
    ) -> Result<Box<dyn CodecDevice>, CodecError> {
        let params = Self::audio_params(format)
            .map_err(|e| CodecError::DecoderInit(e.to_string()))?;
        let processor = OpusDecodeProcessor::new(params)?;
        Ok(Box::new(QueuedCodec::new(
            "opus decoder",
            processor,
            QUEUE_SLOTS,
            MAX_PACKET_SIZE,
        )))
    }
}
