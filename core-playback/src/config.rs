//! # Player Configuration
//!
//! Tuning knobs for the decode-ahead pipeline.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{PlaybackError, Result};

/// Player configuration.
///
/// Controls ring buffer size, frame size and how the background decode task
/// paces itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Ring buffer capacity in PCM frames.
    ///
    /// Default: 16 frames (320 ms with 20 ms frames).
    #[serde(default = "default_ring_capacity_frames")]
    pub ring_capacity_frames: usize,

    /// Duration of one PCM frame.
    ///
    /// Default: 20 ms, the usual Opus packet length.
    #[serde(default = "default_frame_duration")]
    pub frame_duration: Duration,

    /// Maximum number of frames the decode task pushes per run before
    /// rescheduling itself.
    ///
    /// Default: 4.
    #[serde(default = "default_decode_batch_frames")]
    pub decode_batch_frames: usize,

    /// Delay before the decode task retries when the ring buffer is full.
    ///
    /// Default: 10 ms.
    #[serde(default = "default_refill_delay")]
    pub refill_delay: Duration,

    /// Consecutive packet failures after which the stream is treated as
    /// corrupt and playback finishes early.
    ///
    /// Default: 10.
    #[serde(default = "default_max_consecutive_decode_errors")]
    pub max_consecutive_decode_errors: usize,

    /// Log file names instead of full paths.
    ///
    /// Default: true.
    #[serde(default = "default_redact_paths")]
    pub redact_paths: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            ring_capacity_frames: default_ring_capacity_frames(),
            frame_duration: default_frame_duration(),
            decode_batch_frames: default_decode_batch_frames(),
            refill_delay: default_refill_delay(),
            max_consecutive_decode_errors: default_max_consecutive_decode_errors(),
            redact_paths: default_redact_paths(),
        }
    }
}

impl PlayerConfig {
    /// Small buffer, short refill delay. Reacts quickly to seeks at the
    /// cost of more underruns under load.
    pub fn low_latency() -> Self {
        Self {
            ring_capacity_frames: 4,
            decode_batch_frames: 2,
            refill_delay: Duration::from_millis(5),
            ..Default::default()
        }
    }

    /// Large buffer for hosts with scheduling jitter.
    pub fn high_stability() -> Self {
        Self {
            ring_capacity_frames: 64,
            decode_batch_frames: 8,
            refill_delay: Duration::from_millis(20),
            ..Default::default()
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PlaybackError::InvalidConfig(e.to_string()))?;
        config.validate().map_err(PlaybackError::InvalidConfig)?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.ring_capacity_frames == 0 {
            return Err("ring_capacity_frames must be > 0".to_string());
        }

        if self.frame_duration < Duration::from_millis(1) {
            return Err("frame_duration must be at least 1 ms".to_string());
        }

        if self.frame_duration > Duration::from_millis(120) {
            return Err("frame_duration must not exceed 120 ms".to_string());
        }

        if self.decode_batch_frames == 0 {
            return Err("decode_batch_frames must be > 0".to_string());
        }

        if self.max_consecutive_decode_errors == 0 {
            return Err("max_consecutive_decode_errors must be > 0".to_string());
        }

        Ok(())
    }

    /// Samples per channel in one frame at `sample_rate`.
    pub fn frame_samples(&self, sample_rate: u32) -> usize {
        let samples = (self.frame_duration.as_secs_f64() * sample_rate as f64).round() as usize;
        samples.max(1)
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_ring_capacity_frames() -> usize {
    16
}

fn default_frame_duration() -> Duration {
    Duration::from_millis(20)
}

fn default_decode_batch_frames() -> usize {
    4
}

fn default_refill_delay() -> Duration {
    Duration::from_millis(10)
}

fn default_max_consecutive_decode_errors() -> usize {
    10
}

fn default_redact_paths() -> bool {
    true
}
