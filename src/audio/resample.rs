//! Format conversion between device-native audio and the call profile
//!
//! Desktop devices rarely offer the 8 kHz profile directly, so the device
//! backend runs at the device's own rate and channel count and converts at
//! the edge: channel remix first, then linear-interpolation resampling.

/// Convert interleaved `samples` from `from` channels to `to` channels
///
/// Downmixing to mono averages each frame. Upmixing from mono duplicates
/// the sample. Other combinations copy the leading channels and pad with
/// the first one.
pub fn remix(samples: &[i16], from: usize, to: usize) -> Vec<i16> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }
    let mut out = Vec::with_capacity(samples.len() / from * to);
    for frame in samples.chunks_exact(from) {
        if to == 1 {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            out.push((sum / from as i32) as i16);
        } else {
            out.extend((0..to).map(|c| frame.get(c).copied().unwrap_or(frame[0])));
        }
    }
    out
}

/// Streaming linear resampler over interleaved frames
///
/// Keeps its fractional read position and the last input frame across
/// calls, so feeding a signal in arbitrary blocks yields the same output
/// as feeding it at once.
#[derive(Debug, Clone)]
pub struct Resampler {
    channels: usize,
    /// Input advance per output frame, in units of 1/`to_rate` frames
    step: i64,
    to_rate: i64,
    /// Read position relative to the next block, in the same units;
    /// negative positions interpolate from `last`
    pos: i64,
    last: Vec<i16>,
}

impl Resampler {
    pub fn new(from_rate: u32, to_rate: u32, channels: usize) -> Self {
        Self {
            channels: channels.max(1),
            step: from_rate.max(1) as i64,
            to_rate: to_rate.max(1) as i64,
            pos: 0,
            last: Vec::new(),
        }
    }

    /// Whether input passes through untouched
    pub fn is_identity(&self) -> bool {
        self.step == self.to_rate
    }

    /// Resample one block of interleaved input, appending to `out`
    pub fn process(&mut self, input: &[i16], out: &mut Vec<i16>) {
        let ch = self.channels;
        if self.is_identity() {
            out.extend_from_slice(input);
            return;
        }
        let frames = input.len() / ch;
        if frames == 0 {
            return;
        }

        loop {
            let idx = self.pos.div_euclid(self.to_rate);
            if idx + 1 >= frames as i64 {
                break;
            }
            let fraction = self.pos.rem_euclid(self.to_rate) as f64 / self.to_rate as f64;
            let right = (idx + 1) as usize * ch;
            for c in 0..ch {
                let r = input[right + c] as f64;
                let l = if idx < 0 {
                    self.last.get(c).map_or(r, |&s| s as f64)
                } else {
                    input[idx as usize * ch + c] as f64
                };
                out.push((l + (r - l) * fraction).round() as i16);
            }
            self.pos += self.step;
        }

        self.pos -= frames as i64 * self.to_rate;
        self.last.clear();
        self.last.extend_from_slice(&input[(frames - 1) * ch..frames * ch]);
    }
}

/// Remix plus resample from one interleaved format to another
#[derive(Debug, Clone)]
pub struct FormatConverter {
    from_channels: usize,
    to_channels: usize,
    resampler: Resampler,
}

impl FormatConverter {
    pub fn new(from_rate: u32, from_channels: u16, to_rate: u32, to_channels: u16) -> Self {
        Self {
            from_channels: from_channels as usize,
            to_channels: to_channels as usize,
            resampler: Resampler::new(from_rate, to_rate, to_channels as usize),
        }
    }

    /// Convert one block; conversion state carries over to the next block
    pub fn convert(&mut self, input: &[i16]) -> Vec<i16> {
        let mixed = remix(input, self.from_channels, self.to_channels);
        if self.resampler.is_identity() {
            return mixed;
        }
        let mut out = Vec::with_capacity(mixed.len());
        self.resampler.process(&mixed, &mut out);
        out
    }
}

/// Samples at `to_rate` covering the same time as `samples` at `from_rate`,
/// rounded up
pub fn scale_samples(samples: usize, from_rate: u32, to_rate: u32) -> usize {
    if from_rate == 0 {
        return samples;
    }
    (samples as u64 * to_rate as u64).div_ceil(from_rate as u64) as usize
}
