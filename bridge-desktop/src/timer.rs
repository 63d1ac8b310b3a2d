//! Software-clocked output device.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bridge_traits::error::{BridgeError, Result};
use bridge_traits::playback::{AudioOutput, OutputSpec, OutputStream, RenderCallback};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Configuration for [`TimerOutput`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerOutputConfig {
    /// Interval between render callbacks. Each callback requests
    /// `period * sample_rate` frames.
    #[serde(default = "default_period")]
    pub period: Duration,
}

fn default_period() -> Duration {
    Duration::from_millis(5)
}

impl Default for TimerOutputConfig {
    fn default() -> Self {
        Self {
            period: default_period(),
        }
    }
}

/// Output that renders into a scratch buffer on a paced thread and discards
/// the samples.
///
/// Consumption runs at real-time speed, so playback position, underruns and
/// end-of-stream behave as they would on hardware.
#[derive(Debug, Clone, Default)]
pub struct TimerOutput {
    config: TimerOutputConfig,
}

impl TimerOutput {
    pub fn new(config: TimerOutputConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TimerOutputConfig {
        &self.config
    }
}

impl AudioOutput for TimerOutput {
    fn name(&self) -> &str {
        "timer"
    }

    fn open(&self, spec: OutputSpec, callback: RenderCallback) -> Result<Box<dyn OutputStream>> {
        if spec.sample_rate == 0 || spec.channels == 0 {
            return Err(BridgeError::Device(format!(
                "Invalid output layout: {} Hz, {} channels",
                spec.sample_rate, spec.channels
            )));
        }
        if self.config.period.is_zero() {
            return Err(BridgeError::Device("Timer period must be non-zero".into()));
        }

        let shared = Arc::new(Shared {
            control: Mutex::new(Control::default()),
            wake: Condvar::new(),
            playing: AtomicBool::new(false),
            callbacks: AtomicU64::new(0),
        });

        let period = self.config.period;
        let worker_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("opuskit-timer-output".into())
            .spawn(move || render_loop(worker_shared, spec, period, callback))?;

        debug!(
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            period_ms = period.as_millis() as u64,
            "Opened timer output"
        );

        Ok(Box::new(TimerStream {
            shared,
            thread: Some(thread),
        }))
    }
}

#[derive(Default)]
struct Control {
    playing: bool,
    closed: bool,
}

struct Shared {
    control: Mutex<Control>,
    wake: Condvar,
    playing: AtomicBool,
    callbacks: AtomicU64,
}

struct TimerStream {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl TimerStream {
    fn set_playing(&self, playing: bool) {
        let mut control = self.shared.control.lock();
        control.playing = playing;
        self.shared.playing.store(playing, Ordering::Release);
        self.shared.wake.notify_all();
    }
}

impl OutputStream for TimerStream {
    fn play(&self) -> Result<()> {
        self.set_playing(true);
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.set_playing(false);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }
}

impl Drop for TimerStream {
    fn drop(&mut self) {
        {
            let mut control = self.shared.control.lock();
            control.closed = true;
            self.shared.wake.notify_all();
        }

        if let Some(handle) = self.thread.take() {
            // Dropped from inside the callback: the loop exits on its own.
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("Timer output thread panicked");
            }
        }
        debug!(
            callbacks = self.shared.callbacks.load(Ordering::Relaxed),
            "Closed timer output"
        );
    }
}

fn render_loop(shared: Arc<Shared>, spec: OutputSpec, period: Duration, mut callback: RenderCallback) {
    let frames = spec.frames_for(period).max(1);
    let block = Duration::from_secs_f64(frames as f64 / spec.sample_rate as f64);
    let mut buffer = vec![0.0f32; frames * spec.channels as usize];
    let mut deadline = Instant::now();

    loop {
        {
            let mut control = shared.control.lock();
            if !control.playing && !control.closed {
                while !control.playing && !control.closed {
                    shared.wake.wait(&mut control);
                }
                deadline = Instant::now();
            }
            if control.closed {
                break;
            }
        }

        callback(&mut buffer);
        shared.callbacks.fetch_add(1, Ordering::Relaxed);

        deadline += block;
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        } else if now - deadline > block * 4 {
            // Fell far behind (suspended process, debugger); resync instead
            // of bursting callbacks.
            deadline = now;
        }
    }
}
