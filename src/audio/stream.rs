//! Audio call pipeline
//!
//! Recorder pump: microphone → codec-sized chunks → encode → send.
//! Player pump: double buffer → speaker. Inbound packets are decoded on the
//! network receive pump straight into the collection buffer.

use std::sync::Arc;

use crate::audio::buffer::{buffer_size_for, DoubleBuffer};
use crate::audio::device::AudioBackend;
use crate::codec::{AudioCodecs, CodecFactory};
use crate::config::CallConfig;
use crate::error::Result;
use crate::network::{PacketHandler, PacketSink, PacketType};
use crate::worker::{PumpControl, Termination, Worker};

/// Decodes inbound audio packets into the playback buffer
struct PlaybackSink {
    codecs: Arc<AudioCodecs>,
    buffer: Arc<DoubleBuffer>,
}

impl PacketHandler for PlaybackSink {
    fn handle_packet(&self, payload: &[u8]) {
        self.buffer
            .collect(|slot| self.codecs.decode_frame(payload, slot).unwrap_or(0));
    }
}

/// Running audio pipeline for one call
pub struct AudioStream {
    codecs: Arc<AudioCodecs>,
    buffer: Arc<DoubleBuffer>,
    recorder: Worker,
    player: Worker,
}

impl AudioStream {
    /// Configure codecs, open devices and start both pumps paused
    ///
    /// Codec and buffer-size failures are returned. Device-open failures
    /// happen on the pump threads and are reported through `termination`.
    pub fn start(
        backend: Arc<dyn AudioBackend>,
        factory: &dyn CodecFactory,
        config: &CallConfig,
        sink: Arc<dyn PacketSink>,
        termination: Arc<Termination>,
    ) -> Result<Self> {
        let audio = &config.audio;
        let min_capture = backend.min_input_buffer(audio.sample_rate, audio.channels)?;
        let min_playback = backend.min_output_buffer(audio.sample_rate, audio.channels)?;
        let frame_samples = audio.frame_size * audio.channels as usize;
        let buffer_size = buffer_size_for(min_capture, min_playback, frame_samples);

        tracing::info!(
            "Audio buffer: {} samples (capture min {}, playback min {})",
            buffer_size,
            min_capture,
            min_playback
        );

        let codecs = Arc::new(AudioCodecs::configure(
            factory,
            audio.params(buffer_size),
            config.codec.buffer_timeout(),
        )?);
        let buffer = Arc::new(DoubleBuffer::new(buffer_size));

        let stream = Self {
            codecs,
            buffer,
            recorder: Worker::new("audio-record"),
            player: Worker::new("audio-play"),
        };

        let (rate, channels) = (audio.sample_rate, audio.channels);

        let recorder_backend = backend.clone();
        let codecs = stream.codecs.clone();
        stream.recorder.start(
            move |control| {
                record_loop(
                    control,
                    recorder_backend.as_ref(),
                    &codecs,
                    sink.as_ref(),
                    rate,
                    channels,
                    buffer_size,
                )
            },
            Some(termination.handler()),
        )?;

        let buffer = stream.buffer.clone();
        stream.player.start(
            move |control| {
                play_loop(control, backend.as_ref(), &buffer, rate, channels)
            },
            Some(termination.handler()),
        )?;

        Ok(stream)
    }

    /// Handler to register with the session for inbound audio
    pub fn packet_handler(&self) -> Arc<dyn PacketHandler> {
        Arc::new(PlaybackSink {
            codecs: self.codecs.clone(),
            buffer: self.buffer.clone(),
        })
    }

    /// Let both pumps run
    pub fn resume(&self) {
        self.recorder.resume();
        self.player.resume();
    }

    pub fn pause(&self) {
        self.recorder.pause();
        self.player.pause();
    }

    /// Stop both pumps and release the codecs; safe to call repeatedly
    pub fn stop(&self) {
        self.recorder.shutdown();
        self.player.shutdown();
        self.codecs.release();
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn codecs(&self) -> &AudioCodecs {
        &self.codecs
    }

    pub fn buffer(&self) -> &DoubleBuffer {
        &self.buffer
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn record_loop(
    control: &PumpControl,
    backend: &dyn AudioBackend,
    codecs: &AudioCodecs,
    sink: &dyn PacketSink,
    rate: u32,
    channels: u16,
    buffer_size: usize,
) -> Result<()> {
    let mut input = backend.open_input(rate, channels, buffer_size)?;
    let mut pcm = vec![0i16; buffer_size];
    let chunk = codecs.frame_samples();

    while control.in_pump() {
        let read = input.read(&mut pcm)?;
        if read < pcm.len() {
            tracing::debug!("Short capture read: {} of {} samples", read, pcm.len());
        }
        for frame in pcm[..read].chunks_exact(chunk) {
            let Some(packet) = codecs.encode_frame(frame) else {
                continue;
            };
            if sink.is_ready() {
                sink.send(PacketType::Audio, &packet);
            }
        }
    }
    Ok(())
}

fn play_loop(
    control: &PumpControl,
    backend: &dyn AudioBackend,
    buffer: &DoubleBuffer,
    rate: u32,
    channels: u16,
) -> Result<()> {
    let mut output = backend.open_output(rate, channels, buffer.len())?;

    while control.in_pump() {
        let written = buffer.drain(|play| output.write(play))?;
        if written < buffer.len() {
            tracing::debug!("Short playback write: {} of {} samples", written, buffer.len());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::device::mock::MockBackend;
    use crate::codec::OpusCodecFactory;
    use crate::error::TerminationReason;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct RecordingSink {
        ready: AtomicBool,
        sent: Mutex<Vec<(PacketType, Vec<u8>)>>,
    }

    impl PacketSink for RecordingSink {
        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        fn send(&self, kind: PacketType, payload: &[u8]) {
            self.sent.lock().push((kind, payload.to_vec()));
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    fn tone() -> Vec<i16> {
        (0..160)
            .map(|i| ((i as f32 * 0.2).sin() * 8000.0) as i16)
            .collect()
    }

    fn no_faults() -> Arc<Termination> {
        Termination::new("audio", |reason| panic!("unexpected fault: {}", reason))
    }

    #[test]
    fn test_buffer_sized_from_devices() {
        let backend = Arc::new(MockBackend::new(tone()));
        let stream = AudioStream::start(
            backend,
            &OpusCodecFactory,
            &CallConfig::default(),
            Arc::new(RecordingSink::default()),
            no_faults(),
        )
        .unwrap();
        // max(300, 200) rounded up to a multiple of 160
        assert_eq!(stream.buffer_size(), 320);
        stream.stop();
    }

    #[test]
    fn test_records_only_when_ready() {
        let backend = Arc::new(MockBackend::new(tone()));
        let sink = Arc::new(RecordingSink::default());
        let stream = AudioStream::start(
            backend,
            &OpusCodecFactory,
            &CallConfig::default(),
            sink.clone(),
            no_faults(),
        )
        .unwrap();

        stream.resume();
        std::thread::sleep(Duration::from_millis(50));
        assert!(sink.sent.lock().is_empty());

        sink.ready.store(true, Ordering::SeqCst);
        assert!(wait_until(|| !sink.sent.lock().is_empty()));
        stream.stop();

        for (kind, payload) in sink.sent.lock().iter() {
            assert_eq!(*kind, PacketType::Audio);
            assert!(!payload.is_empty());
        }
    }

    #[test]
    fn test_inbound_packets_reach_speaker() {
        let backend = Arc::new(MockBackend::new(tone()));
        let played = backend.played.clone();
        let stream = AudioStream::start(
            backend,
            &OpusCodecFactory,
            &CallConfig::default(),
            Arc::new(RecordingSink::default()),
            no_faults(),
        )
        .unwrap();

        // a second codec pair stands in for the remote peer's encoder
        let remote = AudioCodecs::configure(
            &OpusCodecFactory,
            CallConfig::default().audio.params(320),
            Duration::from_millis(10),
        )
        .unwrap();
        let handler = stream.packet_handler();
        for _ in 0..4 {
            let packet = remote.encode_frame(&tone()).unwrap();
            handler.handle_packet(&packet);
        }
        assert!(stream.buffer().swaps() >= 1);

        stream.resume();
        assert!(wait_until(|| played
            .try_iter()
            .any(|block| block.iter().any(|s| *s != 0))));
        stream.stop();
    }

    #[test]
    fn test_device_failure_terminates_once() {
        let mut backend = MockBackend::new(tone());
        backend.fail_input = true;
        let faults = Arc::new(Mutex::new(Vec::new()));
        let seen = faults.clone();

        let stream = AudioStream::start(
            Arc::new(backend),
            &OpusCodecFactory,
            &CallConfig::default(),
            Arc::new(RecordingSink::default()),
            Termination::new("audio", move |reason| seen.lock().push(reason)),
        )
        .unwrap();

        assert!(wait_until(|| !faults.lock().is_empty()));
        stream.stop();
        let faults = faults.lock();
        assert_eq!(faults.len(), 1);
        assert!(matches!(faults[0], TerminationReason::AudioDevice(_)));
    }

    #[test]
    fn test_stop_twice() {
        let stream = AudioStream::start(
            Arc::new(MockBackend::new(tone())),
            &OpusCodecFactory,
            &CallConfig::default(),
            Arc::new(RecordingSink::default()),
            no_faults(),
        )
        .unwrap();
        stream.resume();
        stream.stop();
        stream.stop();
        assert!(stream.codecs().is_released());
    }
}
