//! # Decoder Service
//!
//! Boundary between the playback pipeline and whatever turns a file into
//! PCM.
//!
//! ## Overview
//!
//! - [`DecoderBackend`] answers file-level questions without starting
//!   playback ("can this be decoded", "how long is it") and opens decoders.
//! - [`PacketDecoder`] is one open stream. Each call to
//!   [`PacketDecoder::next_chunk`] decodes one packet into interleaved `f32`
//!   samples.
//!
//! [`OggOpusBackend`] is the default backend: symphonia's Ogg demuxer feeding
//! libopus through `audiopus`.
//!
//! ```text
//! File → MediaSourceStream → OggReader → OpusCodec → SampleConverter → DecodedChunk
//! ```
//!
//! ## Error contract
//!
//! `next_chunk` returns [`PlaybackError::DecodeError`] for a packet that
//! could not be decoded; the caller may skip it and continue. Any other error
//! ends the stream.
//!
//! [`PlaybackError::DecodeError`]: crate::error::PlaybackError::DecodeError

mod ogg_opus;
mod opus_codec;
mod sample_converter;

use std::path::Path;

use crate::error::Result;
use crate::track::TrackInfo;

pub use ogg_opus::{OggOpusBackend, OggOpusDecoder};
pub use opus_codec::OpusCodec;
pub use sample_converter::SampleConverter;

/// Decoded samples from one packet.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedChunk {
    /// Stream position of the first sample frame, pre-skip excluded.
    pub start_frame: u64,
    pub channels: u16,
    /// Interleaved samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
}

impl DecodedChunk {
    pub fn new(start_frame: u64, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            start_frame,
            channels,
            samples,
        }
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }
}

/// Result of one decode step.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeStep {
    Chunk(DecodedChunk),
    EndOfStream,
}

/// An open, positioned decode stream.
pub trait PacketDecoder: Send {
    /// Parameters of the opened track.
    fn track_info(&self) -> &TrackInfo;

    /// Decode the next packet.
    fn next_chunk(&mut self) -> Result<DecodeStep>;

    /// Reposition so decoding resumes at or before `frame`.
    ///
    /// Returns the frame decoding resumes from. It may be earlier than
    /// `frame` because of packet alignment or codec pre-roll; the caller
    /// drops the samples in between.
    fn seek(&mut self, frame: u64) -> Result<u64>;
}

/// Opens files for decoding and answers static queries about them.
pub trait DecoderBackend: Send + Sync {
    /// Returns `true` if `path` is a stream this backend can play.
    fn can_decode(&self, path: &Path) -> bool;

    /// Total duration in seconds, from container metadata or a full decode
    /// pass.
    fn duration_secs(&self, path: &Path) -> Result<f64>;

    fn open(&self, path: &Path) -> Result<Box<dyn PacketDecoder>>;
}

/// Returns `true` if `path` is a decodable Ogg Opus file.
pub fn can_play(path: impl AsRef<Path>) -> bool {
    OggOpusBackend::new().can_decode(path.as_ref())
}

/// Duration in seconds of the Ogg Opus file at `path`, without opening a
/// player.
pub fn file_duration(path: impl AsRef<Path>) -> Result<f64> {
    OggOpusBackend::new().duration_secs(path.as_ref())
}
