//! Playback position tracking.
//!
//! The exact position lives behind a [`Lock`] in sample frames. The render
//! callback only ever try-acquires it, so a contended advance is skipped and
//! picked up by the next callback. A copy in seconds is published to an
//! atomic after every change for non-blocking queries.
//!
//! Invariants:
//! - the position never exceeds the track length
//! - advances never move it backwards
//! - while frozen (paused) it does not move at all
//! - a seek takes effect immediately and invalidates advances computed
//!   against the previous seek epoch

use std::sync::atomic::{AtomicU64, Ordering};

use core_async::lock::Lock;

#[derive(Debug)]
struct ClockState {
    position: u64,
    frozen: bool,
    epoch: u64,
}

#[derive(Debug)]
pub struct Clock {
    sample_rate: u32,
    total_frames: u64,
    state: Lock<ClockState>,
    epoch: AtomicU64,
    cached_secs: AtomicU64,
}

impl Clock {
    /// Creates a frozen clock at frame 0.
    pub fn new(sample_rate: u32, total_frames: u64) -> Self {
        Self {
            sample_rate,
            total_frames,
            state: Lock::new(ClockState {
                position: 0,
                frozen: true,
                epoch: 0,
            }),
            epoch: AtomicU64::new(0),
            cached_secs: AtomicU64::new(0f64.to_bits()),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Track length in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.frames_to_secs(self.total_frames)
    }

    pub fn frames_to_secs(&self, frames: u64) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        frames as f64 / self.sample_rate as f64
    }

    /// Convert seconds to a frame position clamped to `[0, total_frames]`.
    /// Negative and non-finite inputs map to 0.
    pub fn secs_to_frame(&self, secs: f64) -> u64 {
        if !secs.is_finite() || secs <= 0.0 {
            return 0;
        }
        let frame = (secs * self.sample_rate as f64).round();
        if frame >= self.total_frames as f64 {
            self.total_frames
        } else {
            frame as u64
        }
    }

    /// Seek epoch. Changes on every [`seek_to_frame`](Self::seek_to_frame)
    /// and [`reset`](Self::reset). Never blocks.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Exact position in sample frames. Blocks while another context holds
    /// the clock.
    pub fn position_frames(&self) -> u64 {
        self.state.lock().position
    }

    /// Last published position in seconds. Never blocks; may lag by one
    /// render callback.
    pub fn cached_secs(&self) -> f64 {
        f64::from_bits(self.cached_secs.load(Ordering::Acquire))
    }

    /// Move the position forward to `frame` without blocking.
    ///
    /// Returns `false` when the advance was dropped: the clock was contended,
    /// frozen, already past `frame`, or seeked since `epoch` was read.
    pub fn try_advance(&self, frame: u64, epoch: u64) -> bool {
        let Some(mut state) = self.state.try_lock() else {
            return false;
        };
        if state.frozen || state.epoch != epoch {
            return false;
        }
        let frame = frame.min(self.total_frames);
        if frame <= state.position {
            return false;
        }
        state.position = frame;
        self.publish(frame);
        true
    }

    /// Jump to `frame` (clamped), forwards or backwards.
    pub fn seek_to_frame(&self, frame: u64) {
        let frame = frame.min(self.total_frames);
        let mut state = self.state.lock();
        state.position = frame;
        state.epoch += 1;
        self.epoch.store(state.epoch, Ordering::Release);
        self.publish(frame);
    }

    /// Back to the start of the track.
    pub fn reset(&self) {
        self.seek_to_frame(0);
    }

    /// Stop accepting advances.
    pub fn freeze(&self) {
        self.state.lock().frozen = true;
    }

    pub fn thaw(&self) {
        self.state.lock().frozen = false;
    }

    pub fn is_frozen(&self) -> bool {
        self.state.lock().frozen
    }

    /// Read the exact position, refresh the cached copy and return it in
    /// seconds.
    pub fn reconcile(&self) -> f64 {
        let state = self.state.lock();
        self.publish(state.position);
        self.frames_to_secs(state.position)
    }

    fn publish(&self, frame: u64) {
        let secs = self.frames_to_secs(frame);
        self.cached_secs.store(secs.to_bits(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> Clock {
        // 10 s at 48 kHz
        Clock::new(48_000, 480_000)
    }

    #[test]
    fn test_starts_frozen_at_zero() {
        let clock = clock();
        assert!(clock.is_frozen());
        assert!(!clock.try_advance(960, clock.epoch()));
        assert_eq!(clock.position_frames(), 0);
        assert_eq!(clock.cached_secs(), 0.0);
    }

    #[test]
    fn test_advance_is_monotonic() {
        let clock = clock();
        clock.thaw();
        assert!(clock.try_advance(4_800, 0));
        assert!(!clock.try_advance(2_400, 0));
        assert_eq!(clock.position_frames(), 4_800);
        assert!((clock.cached_secs() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_freeze_stops_advance() {
        let clock = clock();
        clock.thaw();
        clock.try_advance(960, 0);
        clock.freeze();
        assert!(!clock.try_advance(1_920, 0));
        assert_eq!(clock.position_frames(), 960);
        clock.thaw();
        assert!(clock.try_advance(1_920, 0));
    }

    #[test]
    fn test_seek_invalidates_old_epoch() {
        let clock = clock();
        clock.thaw();
        let before = clock.epoch();
        clock.try_advance(240_000, before);

        clock.seek_to_frame(48_000);
        assert_ne!(clock.epoch(), before);
        assert_eq!(clock.position_frames(), 48_000);
        assert_eq!(clock.cached_secs(), 1.0);

        // An advance computed before the seek must not undo it.
        assert!(!clock.try_advance(250_000, before));
        assert!(clock.try_advance(49_000, clock.epoch()));
        assert_eq!(clock.position_frames(), 49_000);
    }

    #[test]
    fn test_clamps_to_duration() {
        let clock = clock();
        clock.thaw();
        clock.seek_to_frame(10_000_000);
        assert_eq!(clock.position_frames(), 480_000);
        assert!(!clock.try_advance(500_000, clock.epoch()));
        assert_eq!(clock.reconcile(), 10.0);

        clock.reset();
        assert_eq!(clock.position_frames(), 0);
    }

    #[test]
    fn test_try_advance_skips_when_contended() {
        let clock = clock();
        clock.thaw();
        let guard = clock.state.lock();
        assert!(!clock.try_advance(960, 0));
        drop(guard);
        assert!(clock.try_advance(960, 0));
    }

    #[test]
    fn test_secs_to_frame_clamps() {
        let clock = clock();
        assert_eq!(clock.secs_to_frame(-1.0), 0);
        assert_eq!(clock.secs_to_frame(f64::NAN), 0);
        assert_eq!(clock.secs_to_frame(2.5), 120_000);
        assert_eq!(clock.secs_to_frame(11.0), 480_000);
        assert_eq!(clock.duration_secs(), 10.0);
    }
}
