//! # Decode-Ahead Pipeline
//!
//! Keeps the ring buffer topped up from a [`PacketDecoder`] on a background
//! serial queue.
//!
//! ## Scheduling
//!
//! The fill task decodes at most `decode_batch_frames` frames per run and
//! then re-dispatches itself, so one long decode never monopolises the
//! queue. When the ring buffer is full it retries after `refill_delay`
//! instead of spinning.
//!
//! Every run carries the epoch it was scheduled under. [`DecodePipeline::halt`],
//! [`DecodePipeline::seek`] and [`DecodePipeline::start`] bump the epoch, and
//! a task whose epoch is stale exits at the next iteration boundary.
//!
//! ## End of stream
//!
//! Once the decoder is exhausted the task turns into a watch that polls
//! until the ring buffer and the render callback are both drained, then calls
//! the completion handler with its epoch, once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use core_async::lock::Lock;
use core_async::queue::Queue;
use tracing::{debug, error, trace, warn};

use crate::clock::Clock;
use crate::config::PlayerConfig;
use crate::decoder::{DecodeStep, DecodedChunk, PacketDecoder};
use crate::error::{PlaybackError, Result};
use crate::frame::PcmFrame;
use crate::render::RenderShared;
use crate::ring_buffer::{PushResult, RingBuffer};

/// Called on the decode queue when playback drained to the end. The argument
/// is the pipeline epoch the end was observed under.
pub type CompletionHandler = Arc<dyn Fn(u64) + Send + Sync>;

// ============================================================================
// Reframer
// ============================================================================

/// Cuts variable-size decoder output into fixed-size [`PcmFrame`]s.
#[derive(Debug)]
pub struct Reframer {
    frame_samples: usize,
    channels: u16,
    pending: Vec<f32>,
    pending_start: u64,
    /// Input before this stream position is discarded.
    skip_until: u64,
    next_index: u64,
}

impl Reframer {
    /// `frame_samples` is per channel.
    pub fn new(frame_samples: usize, channels: u16) -> Self {
        Self {
            frame_samples: frame_samples.max(1),
            channels: channels.max(1),
            pending: Vec::new(),
            pending_start: 0,
            skip_until: 0,
            next_index: 0,
        }
    }

    /// Drop buffered samples and restart at `start`. The first frame emitted
    /// afterwards begins exactly at `start` even if the decoder resumes
    /// earlier.
    pub fn reset(&mut self, start: u64) {
        self.pending.clear();
        self.pending_start = start;
        self.skip_until = start;
        self.next_index = 0;
    }

    pub fn push(&mut self, chunk: DecodedChunk) {
        let channels = self.channels as usize;
        let mut start = chunk.start_frame;
        let mut samples = chunk.samples.as_slice();

        if start < self.skip_until {
            let skip = ((self.skip_until - start) as usize).min(samples.len() / channels);
            samples = &samples[skip * channels..];
            start += skip as u64;
        }
        if samples.is_empty() {
            return;
        }

        if self.pending.is_empty() {
            self.pending_start = start;
        }
        self.pending.extend_from_slice(samples);
    }

    /// Next full frame, if enough samples are buffered.
    pub fn next_frame(&mut self) -> Option<PcmFrame> {
        let len = self.frame_samples * self.channels as usize;
        if self.pending.len() < len {
            return None;
        }
        let rest = self.pending.split_off(len);
        let samples = std::mem::replace(&mut self.pending, rest);
        Some(self.emit(samples))
    }

    /// Whatever is left as a final, possibly short, frame.
    pub fn finish(&mut self) -> Option<PcmFrame> {
        if self.pending.is_empty() {
            return None;
        }
        let samples = std::mem::take(&mut self.pending);
        Some(self.emit(samples))
    }

    fn emit(&mut self, samples: Vec<f32>) -> PcmFrame {
        let frame = PcmFrame::new(self.next_index, self.pending_start, self.channels, samples);
        self.next_index += 1;
        self.pending_start = frame.end_frame();
        frame
    }
}

// ============================================================================
// Pipeline
// ============================================================================

struct Source {
    decoder: Box<dyn PacketDecoder>,
    reframer: Reframer,
    /// Frame handed back by a full ring buffer.
    pending: Option<PcmFrame>,
    end_of_stream: bool,
    consecutive_errors: usize,
}

impl Source {
    /// Next frame in stream order; `Ok(None)` once everything was emitted.
    fn next_frame(&mut self, max_errors: usize) -> Result<Option<PcmFrame>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        loop {
            if let Some(frame) = self.reframer.next_frame() {
                return Ok(Some(frame));
            }
            if self.end_of_stream {
                return Ok(self.reframer.finish());
            }

            match self.decoder.next_chunk() {
                Ok(DecodeStep::Chunk(chunk)) => {
                    self.consecutive_errors = 0;
                    self.reframer.push(chunk);
                }
                Ok(DecodeStep::EndOfStream) => self.end_of_stream = true,
                Err(PlaybackError::DecodeError(msg)) => {
                    self.consecutive_errors += 1;
                    warn!(
                        attempt = self.consecutive_errors,
                        max = max_errors,
                        error = %msg,
                        "Skipping undecodable packet"
                    );
                    if self.consecutive_errors >= max_errors {
                        self.end_of_stream = true;
                        return Err(PlaybackError::CorruptedStream(format!(
                            "{} consecutive packets failed to decode",
                            self.consecutive_errors
                        )));
                    }
                }
                Err(e) => {
                    self.end_of_stream = true;
                    return Err(e);
                }
            }
        }
    }

    fn reposition(&mut self, frame: u64, total_frames: u64) -> Result<u64> {
        self.pending = None;
        self.consecutive_errors = 0;
        self.reframer.reset(frame);

        if frame >= total_frames {
            self.end_of_stream = true;
            return Ok(total_frames);
        }
        match self.decoder.seek(frame) {
            Ok(reached) => {
                self.end_of_stream = false;
                Ok(reached)
            }
            Err(e) => {
                self.end_of_stream = true;
                Err(e)
            }
        }
    }
}

#[derive(Debug, Default)]
struct Control {
    epoch: u64,
    active: bool,
    exhausted: bool,
    failed: bool,
}

struct PipelineInner {
    source: Lock<Source>,
    control: Lock<Control>,
    ring: RingBuffer,
    clock: Arc<Clock>,
    render: Arc<RenderShared>,
    queue: Queue,
    batch: usize,
    refill_delay: Duration,
    max_errors: usize,
    total_frames: u64,
    reported_underruns: AtomicU64,
    on_complete: CompletionHandler,
}

/// Decode-ahead driver for one session.
#[derive(Clone)]
pub struct DecodePipeline {
    inner: Arc<PipelineInner>,
}

impl DecodePipeline {
    pub fn new(
        decoder: Box<dyn PacketDecoder>,
        ring: RingBuffer,
        clock: Arc<Clock>,
        render: Arc<RenderShared>,
        config: &PlayerConfig,
        queue: Queue,
        on_complete: CompletionHandler,
    ) -> Self {
        let track = decoder.track_info();
        let total_frames = track.total_frames;
        let reframer = Reframer::new(config.frame_samples(track.sample_rate), track.channels);

        Self {
            inner: Arc::new(PipelineInner {
                source: Lock::new(Source {
                    decoder,
                    reframer,
                    pending: None,
                    end_of_stream: false,
                    consecutive_errors: 0,
                }),
                control: Lock::new(Control::default()),
                ring,
                clock,
                render,
                queue,
                batch: config.decode_batch_frames.max(1),
                refill_delay: config.refill_delay,
                max_errors: config.max_consecutive_decode_errors.max(1),
                total_frames,
                reported_underruns: AtomicU64::new(0),
                on_complete,
            }),
        }
    }

    /// Begin (or resume) decode-ahead. No-op while already running.
    pub fn start(&self) {
        let epoch = {
            let mut control = self.inner.control.lock();
            if control.active {
                return;
            }
            control.active = true;
            control.epoch += 1;
            control.epoch
        };
        trace!(epoch, "Decode pipeline started");
        self.inner.schedule(epoch, Duration::ZERO, PipelineInner::fill);
    }

    /// Stop scheduling decode work. Buffered frames stay in the ring buffer.
    pub fn halt(&self) {
        let mut control = self.inner.control.lock();
        control.active = false;
        control.epoch += 1;
    }

    /// Reposition to `frame`: cancel in-flight work, move the decoder, flush
    /// the ring buffer and move the clock. Decode-ahead resumes if it was
    /// running.
    ///
    /// The clock and ring buffer are updated even when the decoder fails to
    /// seek; the stream then ends at the new position.
    pub fn seek(&self, frame: u64) -> Result<u64> {
        let frame = frame.min(self.inner.total_frames);
        let restart = {
            let mut control = self.inner.control.lock();
            control.epoch += 1;
            control.exhausted = false;
            control.failed = false;
            control.active.then_some(control.epoch)
        };

        let result = {
            let mut source = self.inner.source.lock();
            let result = source.reposition(frame, self.inner.total_frames);
            self.inner.ring.flush();
            self.inner.render.set_exhausted(false);
            self.inner.clock.seek_to_frame(frame);
            result
        };

        if let Some(epoch) = restart {
            self.inner.schedule(epoch, Duration::ZERO, PipelineInner::fill);
        }
        match &result {
            Ok(reached) => debug!(frame, reached, "Pipeline repositioned"),
            Err(e) => warn!(frame, error = %e, "Decoder failed to seek"),
        }
        result
    }

    /// Halt and rewind to the start with an empty ring buffer.
    pub fn reset(&self) -> Result<()> {
        self.halt();
        self.seek(0).map(|_| ())
    }

    pub fn is_active(&self) -> bool {
        self.inner.control.lock().active
    }

    /// `true` once the decoder has produced its last frame.
    pub fn is_exhausted(&self) -> bool {
        self.inner.control.lock().exhausted
    }

    /// `true` if decoding stopped early on an error.
    pub fn has_failed(&self) -> bool {
        self.inner.control.lock().failed
    }

    /// `true` if `epoch` is the epoch of the running pipeline.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.inner.is_current(epoch)
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.inner.ring
    }
}

impl PipelineInner {
    fn is_current(&self, epoch: u64) -> bool {
        let control = self.control.lock();
        control.active && control.epoch == epoch
    }

    fn schedule(self: &Arc<Self>, epoch: u64, delay: Duration, step: fn(&Arc<PipelineInner>, u64)) {
        let inner = Arc::clone(self);
        let task = move || step(&inner, epoch);
        if delay.is_zero() {
            self.queue.dispatch(task);
        } else {
            self.queue.dispatch_after(delay, task);
        }
    }

    fn fill(self: &Arc<Self>, epoch: u64) {
        if !self.is_current(epoch) {
            return;
        }
        self.report_underruns();

        let mut source = self.source.lock();
        let generation = self.ring.generation();

        for _ in 0..self.batch {
            if !self.is_current(epoch) {
                return;
            }

            let frame = match source.next_frame(self.max_errors) {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    drop(source);
                    self.mark_exhausted(epoch, false);
                    self.schedule(epoch, Duration::ZERO, PipelineInner::watch);
                    return;
                }
                Err(e) => {
                    drop(source);
                    error!(error = %e, "Decoding stopped early");
                    self.mark_exhausted(epoch, true);
                    self.schedule(epoch, Duration::ZERO, PipelineInner::watch);
                    return;
                }
            };

            match self.ring.push(frame, generation) {
                PushResult::Pushed => {}
                PushResult::Full(frame) => {
                    source.pending = Some(frame);
                    drop(source);
                    self.schedule(epoch, self.refill_delay, PipelineInner::fill);
                    return;
                }
                PushResult::Stale => {
                    trace!(epoch, "Dropped frame decoded before a flush");
                    return;
                }
            }
        }

        drop(source);
        self.schedule(epoch, Duration::ZERO, PipelineInner::fill);
    }

    fn watch(self: &Arc<Self>, epoch: u64) {
        if !self.is_current(epoch) {
            return;
        }
        self.report_underruns();

        if self.ring.is_empty() && self.render.is_idle() {
            debug!(epoch, "Playback drained");
            (self.on_complete)(epoch);
            return;
        }
        self.schedule(epoch, self.refill_delay, PipelineInner::watch);
    }

    fn mark_exhausted(&self, epoch: u64, failed: bool) {
        let mut control = self.control.lock();
        if control.epoch != epoch {
            return;
        }
        control.exhausted = true;
        control.failed |= failed;
        self.render.set_exhausted(true);
    }

    fn report_underruns(&self) {
        let total = self.render.underruns();
        let previous = self.reported_underruns.swap(total, Ordering::Relaxed);
        if total > previous {
            warn!(new = total - previous, total, "Render underrun, played silence");
        }
    }
}
