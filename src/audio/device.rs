//! Audio device access
//!
//! The pumps read and write blocking PCM through [`AudioInput`] and
//! [`AudioOutput`]. Devices are opened on the pump thread itself, so the
//! handles need not be `Send`.

use crate::error::AudioError;

/// Blocking microphone reader
pub trait AudioInput {
    /// Fill `buf` with interleaved samples
    ///
    /// Returns the number of samples read; fewer than `buf.len()` means the
    /// device stalled.
    fn read(&mut self, buf: &mut [i16]) -> Result<usize, AudioError>;
}

/// Blocking speaker writer
pub trait AudioOutput {
    /// Queue interleaved samples for playback, blocking while the device
    /// is full
    fn write(&mut self, buf: &[i16]) -> Result<usize, AudioError>;
}

/// Source of audio devices
pub trait AudioBackend: Send + Sync {
    /// Smallest capture buffer the device accepts, in samples
    fn min_input_buffer(&self, sample_rate: u32, channels: u16) -> Result<usize, AudioError>;

    /// Smallest playback buffer the device accepts, in samples
    fn min_output_buffer(&self, sample_rate: u32, channels: u16) -> Result<usize, AudioError>;

    fn open_input(
        &self,
        sample_rate: u32,
        channels: u16,
        buffer_size: usize,
    ) -> Result<Box<dyn AudioInput>, AudioError>;

    fn open_output(
        &self,
        sample_rate: u32,
        channels: u16,
        buffer_size: usize,
    ) -> Result<Box<dyn AudioOutput>, AudioError>;
}

#[cfg(feature = "cpal-audio")]
pub use self::cpal_backend::CpalBackend;

#[cfg(feature = "cpal-audio")]
mod cpal_backend {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig, SupportedBufferSize};
    use crossbeam::queue::ArrayQueue;
    use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::{AudioBackend, AudioInput, AudioOutput};
    use crate::audio::resample::{scale_samples, FormatConverter};
    use crate::error::AudioError;

    /// Longest a blocking read or write waits on the device
    const DEVICE_STALL: Duration = Duration::from_millis(500);

    /// Default host devices through cpal
    ///
    /// Streams run at the device's default rate, channel count and sample
    /// format; samples are converted to and from the call profile here.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct CpalBackend;

    impl CpalBackend {
        fn input_device() -> Result<cpal::Device, AudioError> {
            cpal::default_host()
                .default_input_device()
                .ok_or_else(|| AudioError::DeviceNotFound("No default input device".to_string()))
        }

        fn output_device() -> Result<cpal::Device, AudioError> {
            cpal::default_host()
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()))
        }

        fn input_config(device: &cpal::Device) -> Result<cpal::SupportedStreamConfig, AudioError> {
            device
                .default_input_config()
                .map_err(|e| AudioError::CpalError(e.to_string()))
        }

        fn output_config(device: &cpal::Device) -> Result<cpal::SupportedStreamConfig, AudioError> {
            device
                .default_output_config()
                .map_err(|e| AudioError::CpalError(e.to_string()))
        }
    }

    /// Device minimum buffer expressed in profile samples
    fn min_samples(native: &cpal::SupportedStreamConfig, sample_rate: u32, channels: u16) -> usize {
        match native.buffer_size() {
            SupportedBufferSize::Range { min, .. } => {
                let frames = scale_samples(*min as usize, native.sample_rate().0, sample_rate);
                frames * channels as usize
            }
            SupportedBufferSize::Unknown => 0,
        }
    }

    fn stream_error(e: impl std::fmt::Display) -> AudioError {
        AudioError::StreamError(e.to_string())
    }

    fn build_input<T>(
        device: &cpal::Device,
        config: &StreamConfig,
        mut converter: FormatConverter,
        samples: Sender<Vec<i16>>,
        errors: Sender<AudioError>,
    ) -> Result<cpal::Stream, AudioError>
    where
        T: SizedSample,
        i16: FromSample<T>,
    {
        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    let native: Vec<i16> = data.iter().map(|&s| i16::from_sample(s)).collect();
                    let block = converter.convert(&native);
                    if !block.is_empty() {
                        // overflow drops the newest block
                        let _ = samples.try_send(block);
                    }
                },
                move |err| {
                    let _ = errors.try_send(stream_error(err));
                },
                None,
            )
            .map_err(stream_error)
    }

    fn build_output<T>(
        device: &cpal::Device,
        config: &StreamConfig,
        ring: Arc<ArrayQueue<i16>>,
        errors: Sender<AudioError>,
    ) -> Result<cpal::Stream, AudioError>
    where
        T: SizedSample + FromSample<i16>,
    {
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    for sample in data.iter_mut() {
                        *sample = T::from_sample(ring.pop().unwrap_or(0));
                    }
                },
                move |err| {
                    let _ = errors.try_send(stream_error(err));
                },
                None,
            )
            .map_err(stream_error)
    }

    impl AudioBackend for CpalBackend {
        fn min_input_buffer(&self, sample_rate: u32, channels: u16) -> Result<usize, AudioError> {
            let native = Self::input_config(&Self::input_device()?)?;
            Ok(min_samples(&native, sample_rate, channels))
        }

        fn min_output_buffer(&self, sample_rate: u32, channels: u16) -> Result<usize, AudioError> {
            let native = Self::output_config(&Self::output_device()?)?;
            Ok(min_samples(&native, sample_rate, channels))
        }

        fn open_input(
            &self,
            sample_rate: u32,
            channels: u16,
            buffer_size: usize,
        ) -> Result<Box<dyn AudioInput>, AudioError> {
            let device = Self::input_device()?;
            let native = Self::input_config(&device)?;
            let config: StreamConfig = native.config();
            let converter =
                FormatConverter::new(config.sample_rate.0, config.channels, sample_rate, channels);
            let (sample_tx, sample_rx) = bounded::<Vec<i16>>(64);
            let (error_tx, error_rx) = bounded::<AudioError>(16);

            let stream = match native.sample_format() {
                SampleFormat::F32 => {
                    build_input::<f32>(&device, &config, converter, sample_tx, error_tx)?
                }
                SampleFormat::I16 => {
                    build_input::<i16>(&device, &config, converter, sample_tx, error_tx)?
                }
                SampleFormat::U16 => {
                    build_input::<u16>(&device, &config, converter, sample_tx, error_tx)?
                }
                other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
            };
            stream.play().map_err(stream_error)?;

            tracing::info!(
                "Capture device opened: native {}Hz/{}ch/{:?}, converted to {}Hz/{}ch, {} sample buffer",
                config.sample_rate.0,
                config.channels,
                native.sample_format(),
                sample_rate,
                channels,
                buffer_size
            );

            Ok(Box::new(CpalInput {
                _stream: stream,
                samples: sample_rx,
                errors: error_rx,
                pending: Vec::with_capacity(buffer_size),
            }))
        }

        fn open_output(
            &self,
            sample_rate: u32,
            channels: u16,
            buffer_size: usize,
        ) -> Result<Box<dyn AudioOutput>, AudioError> {
            let device = Self::output_device()?;
            let native = Self::output_config(&device)?;
            let config: StreamConfig = native.config();
            let converter =
                FormatConverter::new(sample_rate, channels, config.sample_rate.0, config.channels);

            // two profile buffers' worth of device samples
            let frames = scale_samples(buffer_size.max(1), sample_rate, config.sample_rate.0)
                / channels.max(1) as usize;
            let native_samples = frames * config.channels as usize;
            let ring = Arc::new(ArrayQueue::<i16>::new(native_samples.max(1) * 2));
            let (error_tx, error_rx) = bounded::<AudioError>(16);

            let playback = ring.clone();
            let stream = match native.sample_format() {
                SampleFormat::F32 => build_output::<f32>(&device, &config, playback, error_tx)?,
                SampleFormat::I16 => build_output::<i16>(&device, &config, playback, error_tx)?,
                SampleFormat::U16 => build_output::<u16>(&device, &config, playback, error_tx)?,
                other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
            };
            stream.play().map_err(stream_error)?;

            tracing::info!(
                "Playback device opened: native {}Hz/{}ch/{:?}, fed from {}Hz/{}ch, {} sample buffer",
                config.sample_rate.0,
                config.channels,
                native.sample_format(),
                sample_rate,
                channels,
                buffer_size
            );

            Ok(Box::new(CpalOutput {
                _stream: stream,
                converter,
                ring,
                errors: error_rx,
            }))
        }
    }

    struct CpalInput {
        _stream: cpal::Stream,
        samples: Receiver<Vec<i16>>,
        errors: Receiver<AudioError>,
        pending: Vec<i16>,
    }

    impl AudioInput for CpalInput {
        fn read(&mut self, buf: &mut [i16]) -> Result<usize, AudioError> {
            if let Ok(err) = self.errors.try_recv() {
                return Err(err);
            }

            let deadline = Instant::now() + DEVICE_STALL;
            while self.pending.len() < buf.len() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match self.samples.recv_timeout(remaining) {
                    Ok(block) => self.pending.extend_from_slice(&block),
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(AudioError::StreamError("capture stream closed".into()))
                    }
                }
            }

            let count = self.pending.len().min(buf.len());
            buf[..count].copy_from_slice(&self.pending[..count]);
            self.pending.drain(..count);
            Ok(count)
        }
    }

    struct CpalOutput {
        _stream: cpal::Stream,
        converter: FormatConverter,
        ring: Arc<ArrayQueue<i16>>,
        errors: Receiver<AudioError>,
    }

    impl AudioOutput for CpalOutput {
        fn write(&mut self, buf: &[i16]) -> Result<usize, AudioError> {
            if let Ok(err) = self.errors.try_recv() {
                return Err(err);
            }

            let native = self.converter.convert(buf);
            let deadline = Instant::now() + DEVICE_STALL;
            let mut written = 0;
            while written < native.len() {
                if self.ring.push(native[written]).is_ok() {
                    written += 1;
                } else if Instant::now() >= deadline {
                    break;
                } else {
                    thread::sleep(Duration::from_millis(1));
                }
            }

            // report progress in profile samples
            if written == native.len() {
                Ok(buf.len())
            } else {
                Ok(written * buf.len() / native.len())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted devices for pipeline tests

    use crossbeam_channel::{unbounded, Receiver, Sender};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    use super::{AudioBackend, AudioInput, AudioOutput};
    use crate::error::AudioError;

    /// Backend whose microphone replays a fixed signal and whose speaker
    /// records everything written
    pub struct MockBackend {
        pub min_input: usize,
        pub min_output: usize,
        pub signal: Vec<i16>,
        pub fail_input: bool,
        played_tx: Sender<Vec<i16>>,
        pub played: Receiver<Vec<i16>>,
        pub opened: Arc<Mutex<Vec<&'static str>>>,
    }

    impl MockBackend {
        pub fn new(signal: Vec<i16>) -> Self {
            let (played_tx, played) = unbounded();
            Self {
                min_input: 300,
                min_output: 200,
                signal,
                fail_input: false,
                played_tx,
                played,
                opened: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    struct MockInput {
        signal: Vec<i16>,
    }

    impl AudioInput for MockInput {
        fn read(&mut self, buf: &mut [i16]) -> Result<usize, AudioError> {
            std::thread::sleep(Duration::from_millis(2));
            for (dst, src) in buf.iter_mut().zip(self.signal.iter().cycle()) {
                *dst = *src;
            }
            Ok(buf.len())
        }
    }

    struct MockOutput {
        played: Sender<Vec<i16>>,
    }

    impl AudioOutput for MockOutput {
        fn write(&mut self, buf: &[i16]) -> Result<usize, AudioError> {
            std::thread::sleep(Duration::from_millis(2));
            let _ = self.played.send(buf.to_vec());
            Ok(buf.len())
        }
    }

    impl AudioBackend for MockBackend {
        fn min_input_buffer(&self, _: u32, _: u16) -> Result<usize, AudioError> {
            Ok(self.min_input)
        }

        fn min_output_buffer(&self, _: u32, _: u16) -> Result<usize, AudioError> {
            Ok(self.min_output)
        }

        fn open_input(&self, _: u32, _: u16, _: usize) -> Result<Box<dyn AudioInput>, AudioError> {
            if self.fail_input {
                return Err(AudioError::DeviceNotFound("mock microphone".into()));
            }
            self.opened.lock().push("input");
            Ok(Box::new(MockInput {
                signal: self.signal.clone(),
            }))
        }

        fn open_output(
            &self,
            _: u32,
            _: u16,
            _: usize,
        ) -> Result<Box<dyn AudioOutput>, AudioError> {
            self.opened.lock().push("output");
            Ok(Box::new(MockOutput {
                played: self.played_tx.clone(),
            }))
        }
    }
}
