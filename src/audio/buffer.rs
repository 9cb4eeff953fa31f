//! Playback double buffer
//!
//! Decoded network audio accumulates in a collection buffer. When it is
//! full it is swapped into the play buffer, which the playback pump streams
//! to the device and then zero-fills. Both halves sit behind one mutex, so
//! the player never sees a partially collected buffer and replays silence
//! rather than stale audio when nothing new arrives.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Device buffer length in samples
///
/// The larger of the capture and playback minimums, rounded up to a whole
/// number of codec frames (at least one frame).
pub fn buffer_size_for(min_capture: usize, min_playback: usize, frame_size: usize) -> usize {
    if frame_size == 0 {
        return min_capture.max(min_playback);
    }
    let needed = min_capture.max(min_playback).max(1);
    needed.div_ceil(frame_size) * frame_size
}

struct Halves {
    collect: Vec<i16>,
    offset: usize,
    play: Vec<i16>,
}

/// Collection/play buffer pair
pub struct DoubleBuffer {
    halves: Mutex<Halves>,
    len: usize,
    swaps: AtomicU64,
    underruns: AtomicU64,
}

impl DoubleBuffer {
    /// Both halves hold `len` samples, initially silent
    pub fn new(len: usize) -> Self {
        Self {
            halves: Mutex::new(Halves {
                collect: vec![0; len],
                offset: 0,
                play: vec![0; len],
            }),
            len,
            swaps: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append to the collection buffer
    ///
    /// `fill` receives the unfilled tail and returns how many samples it
    /// wrote. Returns `true` if the buffer filled and was swapped into play.
    pub fn collect<F>(&self, fill: F) -> bool
    where
        F: FnOnce(&mut [i16]) -> usize,
    {
        let mut halves = self.halves.lock();
        let Halves {
            collect,
            offset,
            play,
        } = &mut *halves;

        let written = fill(&mut collect[*offset..]);
        *offset = (*offset + written).min(self.len);

        if *offset < self.len {
            return false;
        }
        std::mem::swap(collect, play);
        *offset = 0;
        self.swaps.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Hand the play buffer to `sink`, then silence it
    pub fn drain<R, F>(&self, sink: F) -> R
    where
        F: FnOnce(&[i16]) -> R,
    {
        let mut halves = self.halves.lock();
        let result = sink(&halves.play);
        if halves.play.iter().all(|s| *s == 0) {
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
        halves.play.fill(0);
        result
    }

    /// Number of completed collection buffers
    pub fn swaps(&self) -> u64 {
        self.swaps.load(Ordering::Relaxed)
    }

    /// Number of drains that played silence
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}
