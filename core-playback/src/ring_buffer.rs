//! # Ring Buffer for PCM Frames
//!
//! Bounded FIFO of [`PcmFrame`]s between the decode task (producer) and the
//! render callback (consumer).
//!
//! ## Design
//!
//! - **Capacity**: Fixed number of frame slots chosen at creation
//! - **Overflow policy**: Never overwrites; a push into a full buffer hands
//!   the frame back so the producer can retry later
//! - **Consumer**: [`RingBuffer::try_pop`] only try-acquires the lock and
//!   reports "no data" on contention, so the render path never blocks
//! - **Generations**: [`RingBuffer::flush`] bumps a generation counter. A
//!   producer pushes with the generation it started from; frames decoded
//!   before a flush are rejected as stale
//!
//! ## Usage
//!
//! ```rust
//! use core_playback::frame::PcmFrame;
//! use core_playback::ring_buffer::{PushResult, RingBuffer};
//!
//! let buffer = RingBuffer::new(4);
//! let generation = buffer.generation();
//!
//! let frame = PcmFrame::new(0, 0, 1, vec![0.0; 960]);
//! assert!(matches!(buffer.push(frame, generation), PushResult::Pushed));
//!
//! let popped = buffer.try_pop().unwrap();
//! assert_eq!(popped.index, 0);
//! ```

use std::sync::Arc;

use core_async::lock::Lock;

use crate::frame::PcmFrame;

/// Outcome of [`RingBuffer::push`].
#[derive(Debug, PartialEq)]
pub enum PushResult {
    /// The frame was queued.
    Pushed,
    /// No free slot; the frame is handed back.
    Full(PcmFrame),
    /// The buffer was flushed since the producer read the generation. The
    /// frame was dropped.
    Stale,
}

#[derive(Clone)]
pub struct RingBuffer {
    inner: Arc<RingBufferInner>,
}

struct RingBufferInner {
    slots: Lock<Slots>,
    capacity: usize,
}

struct Slots {
    frames: Vec<Option<PcmFrame>>,
    head: usize,
    tail: usize,
    len: usize,
    generation: u64,
}

impl Slots {
    fn clear(&mut self) {
        self.frames.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }

    fn take_head(&mut self) -> Option<PcmFrame> {
        if self.len == 0 {
            return None;
        }
        let frame = self.frames[self.head].take();
        self.head = (self.head + 1) % self.frames.len();
        self.len -= 1;
        frame
    }
}

impl RingBuffer {
    /// Create a ring buffer holding at most `capacity` frames.
    ///
    /// A zero capacity is raised to one slot.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(RingBufferInner {
                slots: Lock::new(Slots {
                    frames: (0..capacity).map(|_| None).collect(),
                    head: 0,
                    tail: 0,
                    len: 0,
                    generation: 0,
                }),
                capacity,
            }),
        }
    }

    /// Queue `frame` if the buffer still has `generation` and a free slot.
    pub fn push(&self, frame: PcmFrame, generation: u64) -> PushResult {
        let mut slots = self.inner.slots.lock();
        if slots.generation != generation {
            return PushResult::Stale;
        }
        if slots.len == self.inner.capacity {
            return PushResult::Full(frame);
        }

        let tail = slots.tail;
        slots.frames[tail] = Some(frame);
        slots.tail = (tail + 1) % self.inner.capacity;
        slots.len += 1;
        PushResult::Pushed
    }

    /// Pop the oldest frame without blocking.
    ///
    /// Returns `None` when the buffer is empty or another context holds the
    /// lock. Safe to call from the render callback.
    pub fn try_pop(&self) -> Option<PcmFrame> {
        self.inner.slots.try_lock()?.take_head()
    }

    /// Pop the oldest frame, waiting for the lock if needed.
    pub fn pop(&self) -> Option<PcmFrame> {
        self.inner.slots.lock().take_head()
    }

    /// Drop every queued frame and start a new generation.
    ///
    /// Returns the new generation.
    pub fn flush(&self) -> u64 {
        let mut slots = self.inner.slots.lock();
        slots.clear();
        slots.generation += 1;
        slots.generation
    }

    /// Current generation; producers push with this value.
    pub fn generation(&self) -> u64 {
        self.inner.slots.lock().generation
    }

    /// Number of queued frames.
    pub fn len(&self) -> usize {
        self.inner.slots.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.inner.capacity
    }

    /// Returns the capacity of the buffer in frames.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}
