//! Video encoder/decoder pair with codec-config header caching
//!
//! The encoder emits its initialization blob (parameter sets) exactly once.
//! On an unreliable link that one packet may never arrive, so the blob is
//! cached and prepended to every later frame. A decoder that joins after
//! loss can initialize from any packet.

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::codec::device::{CodecFactory, MediaFormat, RenderSurface, VideoParams};
use crate::codec::unit::{absorb, CodecState, CodecUnit};
use crate::error::CodecError;

struct EncoderState {
    unit: CodecUnit,
    config_header: Option<Bytes>,
}

enum EncodedUnit {
    Config(Bytes),
    Frame(Bytes),
}

/// Configured video codecs for one call
pub struct VideoCodecs {
    params: VideoParams,
    encoder: Mutex<EncoderState>,
    decoder: Mutex<CodecUnit>,
    frames_encoded: AtomicU64,
    frames_dropped: AtomicU64,
    frames_decoded: AtomicU64,
}

impl VideoCodecs {
    /// Build and start the encoder, and a decoder rendering to `surface`
    ///
    /// Any failure here is fatal to the video pipeline.
    pub fn configure(
        factory: &dyn CodecFactory,
        params: VideoParams,
        surface: Arc<dyn RenderSurface>,
        timeout: Duration,
    ) -> Result<Self, CodecError> {
        let mut encoder = CodecUnit::unconfigured("video encoder", timeout);
        encoder.configure(factory.create_encoder(&MediaFormat::Video(params.clone()))?);
        encoder.start()?;

        // the decoder is sized to its render surface, not the camera
        let (width, height) = surface.size();
        let decoder_format = MediaFormat::Video(VideoParams {
            width,
            height,
            ..params.clone()
        });
        let mut decoder = CodecUnit::unconfigured("video decoder", timeout);
        decoder.configure(factory.create_decoder(&decoder_format, Some(surface))?);
        decoder.start()?;

        tracing::info!(
            "Video codecs configured: {} {}x{}, {} bps, {} fps, key frame every {}s",
            params.mime,
            params.width,
            params.height,
            params.bitrate,
            params.frame_rate,
            params.key_frame_interval
        );

        Ok(Self {
            params,
            encoder: Mutex::new(EncoderState {
                unit: encoder,
                config_header: None,
            }),
            decoder: Mutex::new(decoder),
            frames_encoded: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            frames_decoded: AtomicU64::new(0),
        })
    }

    pub fn params(&self) -> &VideoParams {
        &self.params
    }

    /// Encode one I420 image
    ///
    /// Returns `[config header][frame]`, or `None` when the output was the
    /// config blob itself (cached), nothing was ready, or the codec is
    /// tearing down. A frame produced while no header is cached is dropped
    /// rather than sent without one.
    pub fn encode_frame(&self, image: &[u8]) -> Option<Bytes> {
        let mut state = self.encoder.lock();
        let name = state.unit.name();

        if let Err(e) = state
            .unit
            .push_input(image.len(), |buf| buf.copy_from_slice(image))
        {
            return absorb::<Bytes>(name, "encode input", Err(e));
        }

        let pulled = state.unit.pull_output(false, |data, info| {
            let bytes = Bytes::copy_from_slice(data);
            if info.flags.codec_config {
                EncodedUnit::Config(bytes)
            } else {
                EncodedUnit::Frame(bytes)
            }
        });

        match absorb(name, "encode output", pulled)? {
            EncodedUnit::Config(header) => {
                tracing::debug!("Cached {} byte video config header", header.len());
                state.config_header = Some(header);
                None
            }
            EncodedUnit::Frame(frame) => {
                let header = match &state.config_header {
                    Some(header) => header,
                    None => {
                        let dropped = self.frames_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        tracing::warn!(
                            "Dropping {} byte video frame: no config header cached ({} dropped)",
                            frame.len(),
                            dropped
                        );
                        return None;
                    }
                };
                let mut packet = BytesMut::with_capacity(header.len() + frame.len());
                packet.extend_from_slice(header);
                packet.extend_from_slice(&frame);
                self.frames_encoded.fetch_add(1, Ordering::Relaxed);
                Some(packet.freeze())
            }
        }
    }

    /// Push one packet into the decoder; output renders to the surface
    ///
    /// Returns `true` if a decoded image was rendered during this call.
    pub fn decode_frame(&self, packet: &[u8]) -> bool {
        let mut decoder = self.decoder.lock();
        let name = decoder.name();

        if let Err(e) = decoder.push_input(packet.len(), |buf| buf.copy_from_slice(packet)) {
            absorb::<()>(name, "decode input", Err(e));
            return false;
        }

        let rendered =
            absorb(name, "decode output", decoder.pull_output(true, |_, _| ())).is_some();
        if rendered {
            self.frames_decoded.fetch_add(1, Ordering::Relaxed);
        }
        rendered
    }

    /// The cached config header, if the encoder has produced one
    pub fn config_header(&self) -> Option<Bytes> {
        self.encoder.lock().config_header.clone()
    }

    /// Forget the cached header; frames are dropped until the encoder
    /// emits a new one
    pub fn clear_config_header(&self) {
        self.encoder.lock().config_header = None;
    }

    /// Stop and free both codecs; safe to call repeatedly
    pub fn release(&self) {
        self.decoder.lock().release();
        self.encoder.lock().unit.release();
    }

    pub fn is_released(&self) -> bool {
        self.encoder.lock().unit.state() == CodecState::Released
            && self.decoder.lock().state() == CodecState::Released
    }

    pub fn stats(&self) -> VideoCodecStats {
        VideoCodecStats {
            frames_encoded: self.frames_encoded.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
        }
    }
}

/// Video codec statistics
#[derive(Debug, Clone, Default)]
pub struct VideoCodecStats {
    pub frames_encoded: u64,
    /// Frames discarded because no config header was cached
    pub frames_dropped: u64,
    pub frames_decoded: u64,
}


#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;

    fn params() -> VideoParams {
        VideoParams {
            mime: "video/mp4v-es".into(),
            width: 4,
            height: 4,
            bitrate: 500_000,
            frame_rate: 15,
            key_frame_interval: 5,
        }
    }

    fn codecs(silent: bool) -> (VideoCodecs, Arc<Screen>) {
        let screen = Arc::new(Screen::default());
        let codecs = VideoCodecs::configure(
            &FakeFactory { silent },
            params(),
            screen.clone(),
            Duration::from_millis(10),
        )
        .unwrap();
        (codecs, screen)
    }

    #[test]
    fn test_every_frame_carries_header() {
        let (codecs, _) = codecs(false);

        // first call drains the config blob and emits nothing
        assert!(codecs.encode_frame(&[10; 24]).is_none());
        assert_eq!(codecs.config_header().as_deref(), Some(&HEADER[..]));

        let mut emitted = Vec::new();
        for i in 0..5u8 {
            if let Some(packet) = codecs.encode_frame(&[20 + i; 24]) {
                emitted.push(packet);
            }
        }
        assert!(!emitted.is_empty());
        for packet in &emitted {
            assert_eq!(&packet[..HEADER.len()], &HEADER[..]);
            assert_eq!(packet.len(), HEADER.len() + 1);
        }
    }

    #[test]
    fn test_no_header_means_no_packet() {
        let (codecs, _) = codecs(true);
        for i in 0..3u8 {
            assert!(codecs.encode_frame(&[i; 24]).is_none());
        }
        assert_eq!(codecs.stats().frames_dropped, 3);
        assert_eq!(codecs.stats().frames_encoded, 0);
    }

    #[test]
    fn test_evicted_header_stops_emission() {
        let (codecs, _) = codecs(false);
        codecs.encode_frame(&[1; 24]);
        assert!(codecs.encode_frame(&[2; 24]).is_some());

        codecs.clear_config_header();
        assert!(codecs.encode_frame(&[3; 24]).is_none());
        assert_eq!(codecs.stats().frames_dropped, 1);
    }

    #[test]
    fn test_decode_renders_to_surface() {
        let (codecs, screen) = codecs(false);
        assert!(codecs.decode_frame(&[9, 8, 7]));
        assert_eq!(screen.images.lock().as_slice(), &[vec![9, 8, 7]]);
    }

    #[test]
    fn test_release_is_idempotent() {
        let (codecs, _) = codecs(false);
        codecs.release();
        codecs.release();
        assert!(codecs.is_released());
        assert!(codecs.encode_frame(&[0; 24]).is_none());
        assert!(!codecs.decode_frame(&[1]));
    }
}
