//! Render boundary between the playback core and an audio output device.
//!
//! The device drives playback: it periodically invokes a [`RenderCallback`]
//! asking for the next block of interleaved `f32` samples. The callback runs
//! in the device's real-time context and must fill the whole slice before
//! returning, substituting silence when it has nothing to play.
//!
//! Host platforms implement [`AudioOutput`] to open such a device. The
//! returned [`OutputStream`] starts paused; dropping it closes the device and
//! drops the callback.

use std::time::Duration;

use crate::{
    error::Result,
    platform::{PlatformSend, PlatformSendSync},
};

/// PCM layout requested from an output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputSpec {
    /// Sample rate in hertz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

impl OutputSpec {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Number of sample frames (one sample per channel) covering `duration`.
    pub fn frames_for(&self, duration: Duration) -> usize {
        (duration.as_secs_f64() * self.sample_rate as f64).round() as usize
    }

    /// Number of interleaved samples covering `duration`.
    pub fn samples_for(&self, duration: Duration) -> usize {
        self.frames_for(duration) * self.channels as usize
    }
}

/// Pull callback invoked from the device context with an interleaved buffer
/// to fill completely.
pub type RenderCallback = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// Factory for output streams on a host audio device.
pub trait AudioOutput: PlatformSendSync {
    /// Human readable backend name used in logs.
    fn name(&self) -> &str;

    /// Opens a stream with the given layout. The stream starts paused.
    fn open(&self, spec: OutputSpec, callback: RenderCallback) -> Result<Box<dyn OutputStream>>;
}

/// Handle to an open output stream.
pub trait OutputStream: PlatformSend {
    /// Starts or resumes invoking the render callback.
    fn play(&self) -> Result<()>;

    /// Stops invoking the render callback without closing the device.
    fn pause(&self) -> Result<()>;

    fn is_playing(&self) -> bool;
}
