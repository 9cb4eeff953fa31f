//! Audio encoder/decoder pair
//!
//! Encode runs on the capture pump, decode on the network receive pump, so
//! each unit sits behind its own lock.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::codec::device::{AudioParams, CodecFactory, MediaFormat};
use crate::codec::unit::{absorb, CodecState, CodecUnit};
use crate::error::CodecError;

/// Configured audio codecs for one call
pub struct AudioCodecs {
    params: AudioParams,
    encoder: Mutex<CodecUnit>,
    decoder: Mutex<CodecUnit>,
    frames_encoded: AtomicU64,
    frames_decoded: AtomicU64,
}

impl AudioCodecs {
    /// Build and start the encoder and decoder
    ///
    /// Any failure here is fatal to the audio pipeline.
    pub fn configure(
        factory: &dyn CodecFactory,
        params: AudioParams,
        timeout: Duration,
    ) -> Result<Self, CodecError> {
        let format = MediaFormat::Audio(params.clone());

        let mut encoder = CodecUnit::unconfigured("audio encoder", timeout);
        encoder.configure(factory.create_encoder(&format)?);
        encoder.start()?;

        let mut decoder = CodecUnit::unconfigured("audio decoder", timeout);
        decoder.configure(factory.create_decoder(&format, None)?);
        decoder.start()?;

        tracing::info!(
            "Audio codecs configured: {} {}Hz, {} channel(s), {} samples/frame, {} bps",
            params.mime,
            params.sample_rate,
            params.channels,
            params.frame_size,
            params.bitrate
        );

        Ok(Self {
            params,
            encoder: Mutex::new(encoder),
            decoder: Mutex::new(decoder),
            frames_encoded: AtomicU64::new(0),
            frames_decoded: AtomicU64::new(0),
        })
    }

    /// Samples per codec-native frame, all channels
    pub fn frame_samples(&self) -> usize {
        self.params.frame_size * self.params.channels as usize
    }

    pub fn params(&self) -> &AudioParams {
        &self.params
    }

    /// Encode one codec-native frame of PCM
    ///
    /// A full input queue drops this frame but still drains one output, so
    /// a backed-up encoder keeps moving. Returns `None` when no output was
    /// ready, the codec is tearing down, or the encoder produced nothing.
    pub fn encode_frame(&self, frame: &[i16]) -> Option<Bytes> {
        let mut encoder = self.encoder.lock();

        let pushed = encoder.push_input(frame.len() * 2, |buf| {
            for (dst, sample) in buf.chunks_exact_mut(2).zip(frame) {
                dst.copy_from_slice(&sample.to_le_bytes());
            }
        });
        if let Err(e) = pushed {
            return absorb::<Bytes>(encoder.name(), "encode input", Err(e));
        }

        let pulled = encoder.pull_output(false, |data, _| Bytes::copy_from_slice(data));
        let packet = absorb(encoder.name(), "encode output", pulled)?;
        if packet.is_empty() {
            return None;
        }
        self.frames_encoded.fetch_add(1, Ordering::Relaxed);
        Some(packet)
    }

    /// Decode one packet into `out`, starting at its first sample
    ///
    /// Callers pass the slice of their accumulation buffer at the current
    /// offset. Returns the number of samples written.
    pub fn decode_frame(&self, packet: &[u8], out: &mut [i16]) -> Option<usize> {
        let mut decoder = self.decoder.lock();

        let pushed = decoder.push_input(packet.len(), |buf| buf.copy_from_slice(packet));
        if let Err(e) = pushed {
            return absorb::<usize>(decoder.name(), "decode input", Err(e));
        }

        let pulled = decoder.pull_output(false, |data, _| {
            let count = (data.len() / 2).min(out.len());
            for (dst, src) in out[..count].iter_mut().zip(data.chunks_exact(2)) {
                *dst = i16::from_le_bytes([src[0], src[1]]);
            }
            count
        });
        let written = absorb(decoder.name(), "decode output", pulled)?;
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
        Some(written)
    }

    /// Stop and free both codecs; safe to call repeatedly
    pub fn release(&self) {
        self.decoder.lock().release();
        self.encoder.lock().release();
    }

    pub fn is_released(&self) -> bool {
        self.encoder.lock().state() == CodecState::Released
            && self.decoder.lock().state() == CodecState::Released
    }

    pub fn stats(&self) -> AudioCodecStats {
        AudioCodecStats {
            frames_encoded: self.frames_encoded.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
        }
    }
}

/// Audio codec statistics
#[derive(Debug, Clone, Default)]
pub struct AudioCodecStats {
    pub frames_encoded: u64,
    pub frames_decoded: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::opus::{OpusCodecFactory, OPUS_MIME};

    fn codecs() -> AudioCodecs {
        let params = AudioParams {
            mime: OPUS_MIME.to_string(),
            sample_rate: 8000,
            channels: 1,
            bitrate: 12_200,
            frame_size: 160,
            max_input_size: 3200,
        };
        AudioCodecs::configure(&OpusCodecFactory, params, Duration::from_millis(10)).unwrap()
    }

    #[test]
    fn test_encode_then_decode_at_offset() {
        let codecs = codecs();
        let frame: Vec<i16> = (0..160).map(|i| ((i % 40) * 200) as i16).collect();

        let packet = codecs.encode_frame(&frame).expect("encoded packet");
        assert!(!packet.is_empty());

        let mut collect = vec![0i16; 480];
        let written = codecs.decode_frame(&packet, &mut collect[160..]).unwrap();
        assert_eq!(written, 160);
        assert!(collect[..160].iter().all(|s| *s == 0));

        let stats = codecs.stats();
        assert_eq!(stats.frames_encoded, 1);
        assert_eq!(stats.frames_decoded, 1);
    }

    #[test]
    fn test_wrong_size_frame_produces_nothing() {
        let codecs = codecs();
        assert!(codecs.encode_frame(&[0i16; 100]).is_none());
        // the encoder stays usable
        assert!(codecs.encode_frame(&[0i16; 160]).is_some());
    }

    #[test]
    fn test_release_twice_then_use() {
        let codecs = codecs();
        codecs.release();
        codecs.release();
        assert!(codecs.is_released());
        assert!(codecs.encode_frame(&[0i16; 160]).is_none());
        let mut out = [0i16; 160];
        assert!(codecs.decode_frame(&[1, 2, 3], &mut out).is_none());
    }
}
