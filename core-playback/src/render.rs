//! Render-side consumer of the ring buffer.
//!
//! [`RenderSource`] runs inside the output device's callback. It never
//! blocks and never logs; a missing frame, a contended lock or a paused
//! player produce silence. It does not allocate either, but a frame that has
//! been fully played is dropped here, so its sample buffer is freed on the
//! device thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bridge_traits::playback::RenderCallback;

use crate::clock::Clock;
use crate::frame::PcmFrame;
use crate::ring_buffer::RingBuffer;

/// Flags shared between the render callback, the decode pipeline and the
/// player.
#[derive(Debug)]
pub struct RenderShared {
    playing: AtomicBool,
    exhausted: AtomicBool,
    idle: AtomicBool,
    underruns: AtomicU64,
}

impl Default for RenderShared {
    fn default() -> Self {
        Self {
            playing: AtomicBool::new(false),
            exhausted: AtomicBool::new(false),
            idle: AtomicBool::new(true),
            underruns: AtomicU64::new(0),
        }
    }
}

impl RenderShared {
    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Set once the decoder has pushed its last frame. Empty callbacks after
    /// that are the end of the track, not underruns.
    pub fn set_exhausted(&self, exhausted: bool) {
        self.exhausted.store(exhausted, Ordering::Release);
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Acquire)
    }

    /// `true` when the last callback held no partially played frame and
    /// found the ring buffer empty.
    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::Acquire)
    }

    /// Callbacks that had to pad with silence while more audio was expected.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

pub struct RenderSource {
    ring: RingBuffer,
    clock: Arc<Clock>,
    shared: Arc<RenderShared>,
    channels: usize,
    current: Option<PcmFrame>,
    /// Samples of `current` already written out.
    offset: usize,
    epoch: u64,
}

impl RenderSource {
    pub fn new(ring: RingBuffer, clock: Arc<Clock>, shared: Arc<RenderShared>, channels: u16) -> Self {
        let epoch = clock.epoch();
        Self {
            ring,
            clock,
            shared,
            channels: channels.max(1) as usize,
            current: None,
            offset: 0,
            epoch,
        }
    }

    /// Fill `out` with interleaved samples.
    pub fn render(&mut self, out: &mut [f32]) {
        // A seek or stop happened since the last callback: whatever was in
        // flight belongs to the old position.
        let epoch = self.clock.epoch();
        if epoch != self.epoch {
            self.current = None;
            self.offset = 0;
            self.epoch = epoch;
        }

        if !self.shared.is_playing() {
            out.fill(0.0);
            return;
        }
        self.shared.idle.store(false, Ordering::Release);

        let mut written = 0;
        let mut position = None;
        while written < out.len() {
            if self.current.is_none() {
                match self.ring.try_pop() {
                    Some(frame) => {
                        self.current = Some(frame);
                        self.offset = 0;
                    }
                    None => break,
                }
            }
            let Some(frame) = self.current.as_ref() else {
                break;
            };

            let available = &frame.samples[self.offset..];
            let n = available.len().min(out.len() - written);
            out[written..written + n].copy_from_slice(&available[..n]);
            written += n;
            self.offset += n;
            position = Some(frame.start_frame + (self.offset / self.channels) as u64);

            if self.offset >= frame.samples.len() {
                self.current = None;
                self.offset = 0;
            }
        }

        let starved = written < out.len();
        if starved {
            out[written..].fill(0.0);
            if !self.shared.is_exhausted() {
                self.shared.underruns.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.shared
            .idle
            .store(starved && self.current.is_none(), Ordering::Release);

        if let Some(frame) = position {
            self.clock.try_advance(frame, epoch);
        }
    }

    /// Box the source as a device callback.
    pub fn into_callback(mut self) -> RenderCallback {
        Box::new(move |out: &mut [f32]| self.render(out))
    }
}
