//! Immutable description of an opened track.

use std::path::{Path, PathBuf};

use bridge_traits::playback::OutputSpec;

/// Stream parameters of a decodable Opus file. Fixed once the file is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    /// Path the track was opened from.
    pub path: PathBuf,
    /// Output sample rate in hertz.
    pub sample_rate: u32,
    pub channels: u16,
    /// Playable length in sample frames, pre-skip excluded.
    pub total_frames: u64,
    /// Encoder priming samples discarded at the start of the stream.
    pub pre_skip: u32,
}

impl TrackInfo {
    pub fn new(path: impl AsRef<Path>, sample_rate: u32, channels: u16, total_frames: u64) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sample_rate,
            channels,
            total_frames,
            pre_skip: 0,
        }
    }

    pub fn with_pre_skip(mut self, pre_skip: u32) -> Self {
        self.pre_skip = pre_skip;
        self
    }

    /// Total playable duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.total_frames as f64 / self.sample_rate as f64
    }

    /// Layout requested from the output device.
    pub fn output_spec(&self) -> OutputSpec {
        OutputSpec::new(self.sample_rate, self.channels)
    }
}
