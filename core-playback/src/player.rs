//! # Opus Player
//!
//! Public transport controller. Owns one session (track, decoder pipeline,
//! ring buffer, clock and output stream) at a time and drives the
//! [`PlaybackState`] machine.
//!
//! ## Threading
//!
//! - Transport methods may be called from any thread. They serialize on the
//!   session lock and return without waiting for the decoder.
//! - Decoding runs on a private background queue per player.
//! - The output device's callback only touches the ring buffer and the clock,
//!   both without blocking.
//! - Delegate notifications are delivered on [`Queue::main`].
//!
//! ## Invalid transitions
//!
//! Calling an operation that makes no sense in the current state (pausing
//! while stopped, playing while playing) is a no-op and returns `Ok(())`.
//! Only device failures and undecodable files are reported as errors.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use core_playback::OpusPlayer;
//!
//! # fn example() -> core_playback::Result<()> {
//! let player = OpusPlayer::new()?;
//! player.open("/music/track.opus")?;
//! player.play()?;
//! println!("{:.1}s of {:.1}s", player.current_position(false), player.duration());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bridge_traits::playback::{AudioOutput, OutputStream};
use core_async::lock::Lock;
use core_async::queue::{Queue, QueuePriority};
use core_runtime::logging::display_path;
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::config::PlayerConfig;
use crate::decoder::{DecoderBackend, OggOpusBackend};
use crate::delegate::{DelegateSlot, Notification, PlayerDelegate};
use crate::error::{PlaybackError, Result};
use crate::pipeline::DecodePipeline;
use crate::render::{RenderShared, RenderSource};
use crate::ring_buffer::RingBuffer;
use crate::state::{Operation, PlaybackState};
use crate::track::TrackInfo;

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`OpusPlayer`].
#[derive(Default)]
pub struct PlayerBuilder {
    config: PlayerConfig,
    backend: Option<Arc<dyn DecoderBackend>>,
    output: Option<Arc<dyn AudioOutput>>,
    delegate: Option<Arc<dyn PlayerDelegate>>,
}

impl PlayerBuilder {
    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    /// Decoder backend. Defaults to [`OggOpusBackend`].
    pub fn backend(mut self, backend: Arc<dyn DecoderBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Audio output. Required unless the `desktop-shims` feature supplies a
    /// default.
    pub fn output(mut self, output: Arc<dyn AudioOutput>) -> Self {
        self.output = Some(output);
        self
    }

    /// Initial delegate. Held weakly, like [`OpusPlayer::set_delegate`].
    pub fn delegate(mut self, delegate: Arc<dyn PlayerDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn build(self) -> Result<OpusPlayer> {
        self.config
            .validate()
            .map_err(PlaybackError::InvalidConfig)?;

        let output = match self.output {
            Some(output) => output,
            None => default_output()?,
        };
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(OggOpusBackend::new()));

        let inner = Arc::new(PlayerInner {
            config: self.config,
            backend,
            output,
            delegate: DelegateSlot::default(),
            slot: Lock::new(Slot::default()),
            control: Queue::with_name("opuskit.player.control"),
            decode_queue: Queue::with_priority(QueuePriority::Low),
            next_session: AtomicU64::new(1),
        });
        inner.delegate.set(self.delegate.as_ref());

        debug!(output = inner.output.name(), "Player created");
        Ok(OpusPlayer { inner })
    }
}

#[cfg(all(feature = "desktop-shims", feature = "cpal-output"))]
fn default_output() -> Result<Arc<dyn AudioOutput>> {
    Ok(Arc::new(bridge_desktop::CpalOutput::new()))
}

#[cfg(all(feature = "desktop-shims", not(feature = "cpal-output")))]
fn default_output() -> Result<Arc<dyn AudioOutput>> {
    Ok(Arc::new(bridge_desktop::TimerOutput::default()))
}

#[cfg(not(feature = "desktop-shims"))]
fn default_output() -> Result<Arc<dyn AudioOutput>> {
    Err(PlaybackError::CapabilityMissing {
        capability: "AudioOutput".to_string(),
        message: "Provide an output with PlayerBuilder::output or enable the desktop-shims feature"
            .to_string(),
    })
}

// ============================================================================
// Session
// ============================================================================

struct Session {
    id: u64,
    track: TrackInfo,
    resolved_path: PathBuf,
    clock: Arc<Clock>,
    render: Arc<RenderShared>,
    pipeline: DecodePipeline,
    stream: Box<dyn OutputStream>,
}

impl Session {
    fn halt_output(&self) {
        self.render.set_playing(false);
        if let Err(e) = self.stream.pause() {
            warn!(error = %e, "Failed to pause output");
        }
        self.clock.freeze();
        self.pipeline.halt();
    }
}

#[derive(Default)]
struct Slot {
    state: PlaybackState,
    session: Option<Session>,
}

struct PlayerInner {
    config: PlayerConfig,
    backend: Arc<dyn DecoderBackend>,
    output: Arc<dyn AudioOutput>,
    delegate: DelegateSlot,
    slot: Lock<Slot>,
    /// Serializes end-of-stream handling away from the decode queue.
    control: Queue,
    decode_queue: Queue,
    next_session: AtomicU64,
}

impl Drop for PlayerInner {
    fn drop(&mut self) {
        if let Some(session) = self.slot.get_mut().session.take() {
            session.halt_output();
            debug!(session = session.id, "Player dropped; session closed");
        }
    }
}

// ============================================================================
// Player
// ============================================================================

/// Handle to an Opus playback controller.
///
/// Clones share the same session. The session is stopped when the last
/// handle is dropped.
#[derive(Clone)]
pub struct OpusPlayer {
    inner: Arc<PlayerInner>,
}

/// Non-owning player handle.
#[derive(Clone)]
pub struct WeakPlayer(Weak<PlayerInner>);

impl WeakPlayer {
    pub fn upgrade(&self) -> Option<OpusPlayer> {
        self.0.upgrade().map(|inner| OpusPlayer { inner })
    }
}

impl OpusPlayer {
    pub fn builder() -> PlayerBuilder {
        PlayerBuilder::default()
    }

    /// Player with the default configuration, backend and output.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn downgrade(&self) -> WeakPlayer {
        WeakPlayer(Arc::downgrade(&self.inner))
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.inner.config
    }

    fn display(&self, path: &Path) -> String {
        display_path(path, self.inner.config.redact_paths)
    }

    /// Open `path` and make it the current track, replacing any previous
    /// session.
    ///
    /// On failure the previous session, if any, is left untouched.
    #[instrument(skip(self, path), fields(path = %self.display(path.as_ref())))]
    pub fn open(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let decoder = self.inner.backend.open(path).map_err(|e| {
            warn!(error = %e, "Failed to open track");
            e
        })?;

        let track = decoder.track_info().clone();
        if track.sample_rate == 0 || track.channels == 0 {
            return Err(PlaybackError::UnsupportedFormat(format!(
                "Invalid stream layout: {} Hz, {} channels",
                track.sample_rate, track.channels
            )));
        }

        let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        let clock = Arc::new(Clock::new(track.sample_rate, track.total_frames));
        let ring = RingBuffer::new(self.inner.config.ring_capacity_frames);
        let render = Arc::new(RenderShared::default());

        let source = RenderSource::new(ring.clone(), Arc::clone(&clock), Arc::clone(&render), track.channels);
        let stream = self
            .inner
            .output
            .open(track.output_spec(), source.into_callback())?;

        let pipeline = DecodePipeline::new(
            decoder,
            ring,
            Arc::clone(&clock),
            Arc::clone(&render),
            &self.inner.config,
            self.inner.decode_queue.clone(),
            self.completion_handler(id),
        );

        let session = Session {
            id,
            resolved_path: resolve(path),
            track,
            clock,
            render,
            pipeline,
            stream,
        };
        info!(
            duration_secs = session.track.duration_secs(),
            sample_rate = session.track.sample_rate,
            channels = session.track.channels,
            "Opened track"
        );

        let previous = {
            let mut slot = self.inner.slot.lock();
            slot.state = slot.state.transition(Operation::Open)?;
            slot.session.replace(session)
        };
        // Dropping the old stream joins its device thread; keep that outside
        // the lock.
        if let Some(previous) = previous {
            previous.halt_output();
        }
        Ok(())
    }

    /// Start or resume playback.
    #[instrument(skip(self))]
    pub fn play(&self) -> Result<()> {
        {
            let mut slot = self.inner.slot.lock();
            let Some(next) = self.transition(&slot, Operation::Play) else {
                return Ok(());
            };
            if let Some(session) = slot.session.as_ref() {
                start_output(session)?;
            }
            slot.state = next;
        }
        self.notify(Notification::Started);
        Ok(())
    }

    /// Seek to `secs` (clamped to the track) and play.
    #[instrument(skip(self))]
    pub fn play_from(&self, secs: f64) -> Result<()> {
        {
            let mut slot = self.inner.slot.lock();
            if !self.seek_locked(&mut slot, secs)? {
                return Ok(());
            }
            let Some(next) = self.transition(&slot, Operation::Play) else {
                // Already playing; the seek restarted decode-ahead.
                return Ok(());
            };
            if let Some(session) = slot.session.as_ref() {
                start_output(session)?;
            }
            slot.state = next;
        }
        self.notify(Notification::Started);
        Ok(())
    }

    /// Pause, keeping buffered audio and position.
    #[instrument(skip(self))]
    pub fn pause(&self) -> Result<()> {
        {
            let mut slot = self.inner.slot.lock();
            let Some(next) = self.transition(&slot, Operation::Pause) else {
                return Ok(());
            };
            if let Some(session) = slot.session.as_ref() {
                session.halt_output();
            }
            slot.state = next;
        }
        self.notify(Notification::Paused);
        Ok(())
    }

    /// Stop, drop buffered audio and rewind to the start. Idempotent.
    #[instrument(skip(self))]
    pub fn stop(&self) -> Result<()> {
        let mut slot = self.inner.slot.lock();
        let Some(next) = self.transition(&slot, Operation::Stop) else {
            return Ok(());
        };
        if let Some(session) = slot.session.as_ref() {
            session.halt_output();
            if let Err(e) = session.pipeline.reset() {
                // The clock and ring are already reset; decoding resumes
                // from wherever the decoder ended up.
                warn!(error = %e, "Failed to rewind decoder");
            }
        }
        slot.state = next;
        Ok(())
    }

    /// Seek to `secs` keeping the current play/pause state. Leaves
    /// `Finished` for `Paused`.
    #[instrument(skip(self))]
    pub fn set_current_position(&self, secs: f64) -> Result<()> {
        let mut slot = self.inner.slot.lock();
        self.seek_locked(&mut slot, secs).map(|_| ())
    }

    /// Playback position in seconds.
    ///
    /// With `sync` the exact position is read under the clock lock; without
    /// it the last published value is returned immediately.
    pub fn current_position(&self, sync: bool) -> f64 {
        let clock = {
            let slot = self.inner.slot.lock();
            match slot.session.as_ref() {
                Some(session) => Arc::clone(&session.clock),
                None => return 0.0,
            }
        };
        if sync {
            clock.reconcile()
        } else {
            clock.cached_secs()
        }
    }

    /// Duration of the current track in seconds, 0 with no track.
    pub fn duration(&self) -> f64 {
        self.inner
            .slot
            .lock()
            .session
            .as_ref()
            .map_or(0.0, |s| s.track.duration_secs())
    }

    pub fn is_paused(&self) -> bool {
        self.state() == PlaybackState::Paused
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.slot.lock().state
    }

    /// Path the current track was opened from.
    pub fn path(&self) -> Option<PathBuf> {
        self.inner
            .slot
            .lock()
            .session
            .as_ref()
            .map(|s| s.track.path.clone())
    }

    pub fn track_info(&self) -> Option<TrackInfo> {
        self.inner
            .slot
            .lock()
            .session
            .as_ref()
            .map(|s| s.track.clone())
    }

    /// `true` if the current track was opened from `path`, comparing
    /// canonical paths where they resolve.
    pub fn is_equal_to_path(&self, path: impl AsRef<Path>) -> bool {
        let resolved = resolve(path.as_ref());
        self.inner
            .slot
            .lock()
            .session
            .as_ref()
            .is_some_and(|s| s.resolved_path == resolved)
    }

    /// Install `delegate`. The player keeps only a weak reference.
    pub fn set_delegate(&self, delegate: &Arc<dyn PlayerDelegate>) {
        self.inner.delegate.set(Some(delegate));
    }

    pub fn clear_delegate(&self) {
        self.inner.delegate.set(None);
    }

    pub fn has_delegate(&self) -> bool {
        self.inner.delegate.is_set()
    }

    /// Render callbacks of the current session that played silence while
    /// waiting for the decoder.
    pub fn underrun_count(&self) -> u64 {
        self.inner
            .slot
            .lock()
            .session
            .as_ref()
            .map_or(0, |s| s.render.underruns())
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Next state for `operation`, or `None` when it is a no-op here.
    fn transition(&self, slot: &Slot, operation: Operation) -> Option<PlaybackState> {
        match slot.state.transition(operation) {
            Ok(next) => Some(next),
            Err(e) => {
                debug!(error = %e, "Ignoring operation");
                None
            }
        }
    }

    /// Seek the current session. Returns `Ok(false)` when there is nothing
    /// to seek.
    fn seek_locked(&self, slot: &mut Slot, secs: f64) -> Result<bool> {
        let Some(next) = self.transition(slot, Operation::Seek) else {
            return Ok(false);
        };
        let Some(session) = slot.session.as_ref() else {
            return Ok(false);
        };

        let frame = session.clock.secs_to_frame(secs);
        debug!(secs, frame, "Seeking");
        session.pipeline.seek(frame)?;
        slot.state = next;
        Ok(true)
    }

    fn notify(&self, notification: Notification) {
        self.inner.delegate.notify(self.downgrade(), notification);
    }

    fn completion_handler(&self, session_id: u64) -> crate::pipeline::CompletionHandler {
        let player = self.downgrade();
        Arc::new(move |epoch| {
            let Some(strong) = player.upgrade() else {
                return;
            };
            let control = strong.inner.control.clone();
            control.dispatch(move || strong.finish(session_id, epoch));
        })
    }

    /// End of stream observed by the pipeline of `session_id` under `epoch`.
    fn finish(&self, session_id: u64, epoch: u64) {
        {
            let mut slot = self.inner.slot.lock();
            let Some(session) = slot.session.as_ref() else {
                return;
            };
            // A seek, pause or new track since the watch fired makes it moot.
            if session.id != session_id || !session.pipeline.is_current(epoch) {
                return;
            }
            let Some(next) = self.transition(&slot, Operation::Finish) else {
                return;
            };
            let Some(session) = slot.session.as_ref() else {
                return;
            };

            session.halt_output();
            session.clock.seek_to_frame(session.track.total_frames);
            if session.pipeline.has_failed() {
                warn!("Playback finished early on a corrupt stream");
            } else {
                info!("Playback finished");
            }
            slot.state = next;
        }
        self.notify(Notification::Finished);
    }
}

fn start_output(session: &Session) -> Result<()> {
    session.clock.thaw();
    session.render.set_playing(true);
    session.pipeline.start();
    if let Err(e) = session.stream.play() {
        session.render.set_playing(false);
        session.clock.freeze();
        session.pipeline.halt();
        return Err(e.into());
    }
    Ok(())
}

fn resolve(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl PartialEq for OpusPlayer {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        let ours = self
            .inner
            .slot
            .lock()
            .session
            .as_ref()
            .map(|s| s.resolved_path.clone());
        match ours {
            Some(path) => other.is_equal_to_path(path),
            None => false,
        }
    }
}

impl fmt::Debug for OpusPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.inner.slot.lock();
        f.debug_struct("OpusPlayer")
            .field("state", &slot.state)
            .field(
                "track",
                &slot
                    .session
                    .as_ref()
                    .map(|s| self.display(&s.track.path)),
            )
            .finish()
    }
}
