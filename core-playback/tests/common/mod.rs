//! Shared fixtures for the player integration tests.

#![allow(dead_code)]

pub mod ogg_opus;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bridge_desktop::{TimerOutput, TimerOutputConfig};
use core_async::lock::Lock;
use core_async::queue::Queue;
use core_playback::{
    DecodeStep, DecodedChunk, DecoderBackend, OpusPlayer, PacketDecoder, PlaybackError,
    PlayerConfig, PlayerDelegate, Result, TrackInfo,
};

pub const RATE: u32 = 48_000;
/// One 20 ms packet at 48 kHz.
pub const PACKET_FRAMES: u64 = 960;

#[derive(Debug, Clone, Copy)]
pub struct ToneTrack {
    pub secs: f64,
    /// Packets from this index on fail to decode.
    pub corrupt_from: Option<u64>,
}

/// Backend serving synthetic mono sine tracks registered by path. Unknown
/// paths are undecodable.
#[derive(Default)]
pub struct ToneBackend {
    tracks: Lock<HashMap<PathBuf, ToneTrack>>,
    opened: AtomicUsize,
}

impl ToneBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_track(self: Arc<Self>, path: &str, secs: f64) -> Arc<Self> {
        self.tracks.lock().insert(
            PathBuf::from(path),
            ToneTrack {
                secs,
                corrupt_from: None,
            },
        );
        self
    }

    pub fn with_corrupt_track(self: Arc<Self>, path: &str, secs: f64, corrupt_from: u64) -> Arc<Self> {
        self.tracks.lock().insert(
            PathBuf::from(path),
            ToneTrack {
                secs,
                corrupt_from: Some(corrupt_from),
            },
        );
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn lookup(&self, path: &Path) -> Result<ToneTrack> {
        self.tracks
            .lock()
            .get(path)
            .copied()
            .ok_or_else(|| PlaybackError::UnsupportedFormat(format!("{} is not Opus", path.display())))
    }
}

impl DecoderBackend for ToneBackend {
    fn can_decode(&self, path: &Path) -> bool {
        self.lookup(path).is_ok()
    }

    fn duration_secs(&self, path: &Path) -> Result<f64> {
        Ok(self.lookup(path)?.secs)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn PacketDecoder>> {
        let track = self.lookup(path)?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        let total_frames = (track.secs * RATE as f64).round() as u64;
        Ok(Box::new(ToneDecoder {
            info: TrackInfo::new(path, RATE, 1, total_frames),
            position: 0,
            corrupt_from: track.corrupt_from,
        }))
    }
}

struct ToneDecoder {
    info: TrackInfo,
    position: u64,
    corrupt_from: Option<u64>,
}

impl PacketDecoder for ToneDecoder {
    fn track_info(&self) -> &TrackInfo {
        &self.info
    }

    fn next_chunk(&mut self) -> Result<DecodeStep> {
        if self.position >= self.info.total_frames {
            return Ok(DecodeStep::EndOfStream);
        }
        let start = self.position;
        let frames = PACKET_FRAMES.min(self.info.total_frames - start);
        self.position += frames;

        if self.corrupt_from.is_some_and(|from| start / PACKET_FRAMES >= from) {
            return Err(PlaybackError::DecodeError(format!("bad packet at {start}")));
        }

        let samples = (start..start + frames)
            .map(|n| (n as f32 * 440.0 * std::f32::consts::TAU / RATE as f32).sin() * 0.25)
            .collect();
        Ok(DecodeStep::Chunk(DecodedChunk::new(start, 1, samples)))
    }

    fn seek(&mut self, frame: u64) -> Result<u64> {
        self.position = frame - frame % PACKET_FRAMES;
        Ok(self.position)
    }
}

/// Player wired to `backend` and a real-time timer output.
pub fn player(backend: Arc<ToneBackend>, config: PlayerConfig) -> OpusPlayer {
    OpusPlayer::builder()
        .config(config)
        .backend(backend)
        .output(Arc::new(TimerOutput::new(TimerOutputConfig {
            period: Duration::from_millis(5),
        })))
        .build()
        .expect("player")
}

/// Four 20 ms frames, as in the reference scenario.
pub fn small_ring() -> PlayerConfig {
    PlayerConfig {
        ring_capacity_frames: 4,
        frame_duration: Duration::from_millis(20),
        refill_delay: Duration::from_millis(5),
        ..PlayerConfig::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Started,
    Paused,
    Finished,
}

/// Delegate that records every notification and whether it arrived on the
/// main queue.
#[derive(Default)]
pub struct RecordingDelegate {
    events: Lock<Vec<Event>>,
    off_main: AtomicUsize,
}

impl RecordingDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: Event) -> usize {
        self.events.lock().iter().filter(|e| **e == event).count()
    }

    pub fn off_main(&self) -> usize {
        self.off_main.load(Ordering::SeqCst)
    }

    fn record(&self, event: Event) {
        if !Queue::main().is_current() {
            self.off_main.fetch_add(1, Ordering::SeqCst);
        }
        self.events.lock().push(event);
    }
}

impl PlayerDelegate for RecordingDelegate {
    fn did_finish_playing(&self, _player: &OpusPlayer) {
        self.record(Event::Finished);
    }

    fn did_start_playing(&self, _player: &OpusPlayer) {
        self.record(Event::Started);
    }

    fn did_pause(&self, _player: &OpusPlayer) {
        self.record(Event::Paused);
    }
}

/// Delegate implementing only the mandatory notification.
#[derive(Default)]
pub struct FinishOnly {
    pub finished: AtomicUsize,
}

impl PlayerDelegate for FinishOnly {
    fn did_finish_playing(&self, _player: &OpusPlayer) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
