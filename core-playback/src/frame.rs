//! Fixed-size blocks of decoded PCM.

/// A block of interleaved `f32` samples plus its place in the stream.
///
/// Frames are produced by the decode pipeline, owned by the ring buffer while
/// queued and dropped once the render side has consumed them.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmFrame {
    /// Sequence number within the current decode run. Restarts at 0 after a
    /// seek.
    pub index: u64,
    /// Stream position of the first sample frame, in sample frames.
    pub start_frame: u64,
    pub channels: u16,
    /// Interleaved samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
}

impl PcmFrame {
    pub fn new(index: u64, start_frame: u64, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            index,
            start_frame,
            channels,
            samples,
        }
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Stream position just past the last sample frame.
    pub fn end_frame(&self) -> u64 {
        self.start_frame + self.frames() as u64
    }

    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_math() {
        let frame = PcmFrame::new(3, 2880, 2, vec![0.0; 1920]);
        assert_eq!(frame.frames(), 960);
        assert_eq!(frame.end_frame(), 3840);
        assert!((frame.duration_secs(48_000) - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_zero_channels() {
        let frame = PcmFrame::new(0, 0, 0, vec![0.0; 4]);
        assert_eq!(frame.frames(), 0);
        assert_eq!(frame.end_frame(), 0);
    }
}
