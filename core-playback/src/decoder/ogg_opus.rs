//! # Ogg Opus Decoder
//!
//! symphonia demuxes the Ogg container; packets go through [`OpusCodec`]
//! from a private [`CodecRegistry`] so the rest of symphonia's registry is
//! never consulted.
//!
//! Positions exposed to callers exclude the encoder pre-skip: frame 0 is the
//! first audible sample.

use std::fs::File;
use std::path::Path;
use std::sync::OnceLock;

use symphonia::core::codecs::{CodecRegistry, Decoder, DecoderOptions, CODEC_TYPE_OPUS};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, instrument, trace, warn};

use super::opus_codec::OpusCodec;
use super::sample_converter::SampleConverter;
use super::{DecodeStep, DecodedChunk, DecoderBackend, PacketDecoder};
use crate::error::{PlaybackError, Result};
use crate::track::TrackInfo;

/// How far before a seek target decoding restarts. libopus needs about
/// 80 ms of audio after a reset before its output converges.
const SEEK_PRE_ROLL: u64 = 3840;

fn codecs() -> &'static CodecRegistry {
    static CODECS: OnceLock<CodecRegistry> = OnceLock::new();
    CODECS.get_or_init(|| {
        let mut registry = CodecRegistry::new();
        registry.register_all::<OpusCodec>();
        registry
    })
}

/// Default [`DecoderBackend`] for `.opus` / `.ogg` files.
#[derive(Debug, Clone, Default)]
pub struct OggOpusBackend;

impl OggOpusBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DecoderBackend for OggOpusBackend {
    fn can_decode(&self, path: &Path) -> bool {
        match OggOpusDecoder::open(path) {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Not a decodable Opus stream");
                false
            }
        }
    }

    fn duration_secs(&self, path: &Path) -> Result<f64> {
        Ok(OggOpusDecoder::open(path)?.track_info().duration_secs())
    }

    fn open(&self, path: &Path) -> Result<Box<dyn PacketDecoder>> {
        Ok(Box::new(OggOpusDecoder::open(path)?))
    }
}

/// An open Ogg Opus stream.
pub struct OggOpusDecoder {
    reader: Box<dyn FormatReader>,
    codec: Box<dyn Decoder>,
    track_id: u32,
    info: TrackInfo,
    /// Samples decoded before this container timestamp are dropped.
    trim_until: u64,
}

impl OggOpusDecoder {
    /// Open `path` and read enough of it to describe the track.
    ///
    /// Any file that is not an Ogg container carrying a mono or stereo Opus
    /// stream yields [`PlaybackError::UnsupportedFormat`].
    #[instrument(skip_all, level = "debug")]
    pub fn open(path: &Path) -> Result<Self> {
        let (reader, track_id) = Self::probe(path)?;

        let params = reader
            .tracks()
            .iter()
            .find(|t| t.id == track_id)
            .map(|t| t.codec_params.clone())
            .ok_or_else(|| PlaybackError::UnsupportedFormat("Opus track vanished".into()))?;

        let codec = codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| PlaybackError::UnsupportedFormat(format!("Cannot decode stream: {e}")))?;

        let sample_rate = params.sample_rate.unwrap_or(48_000);
        let channels = codec.codec_params().channels.map(|c| c.count()).unwrap_or(2) as u16;
        let pre_skip = params.delay.unwrap_or(0);
        // Trailing samples of the last packet past the final granule position.
        let padding = params.padding.unwrap_or(0);

        let decoded_frames = match params.n_frames {
            Some(frames) => frames,
            None => {
                debug!("Container has no length; counting frames");
                Self::count_frames(path)?
            }
        };
        let total_frames = decoded_frames
            .saturating_sub(padding as u64)
            .saturating_sub(pre_skip as u64);

        let info = TrackInfo::new(path, sample_rate, channels, total_frames).with_pre_skip(pre_skip);
        debug!(
            sample_rate,
            channels,
            total_frames,
            pre_skip,
            padding,
            "Opened Opus stream"
        );

        Ok(Self {
            reader,
            codec,
            track_id,
            info,
            trim_until: pre_skip as u64,
        })
    }

    fn probe(path: &Path) -> Result<(Box<dyn FormatReader>, u32)> {
        let file = File::open(path)
            .map_err(|e| PlaybackError::SourceError(format!("Failed to open file: {e}")))?;
        let stream = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| PlaybackError::UnsupportedFormat(format!("Failed to probe: {e}")))?;

        let track_id = probed
            .format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec == CODEC_TYPE_OPUS)
            .map(|t| t.id)
            .ok_or_else(|| PlaybackError::UnsupportedFormat("No Opus track".into()))?;

        Ok((probed.format, track_id))
    }

    /// Decode the whole stream once to find its length. The count includes
    /// the pre-skip and whatever the encoder padded the last packet with.
    pub(crate) fn count_frames(path: &Path) -> Result<u64> {
        let (mut reader, track_id) = Self::probe(path)?;
        let params = reader
            .tracks()
            .iter()
            .find(|t| t.id == track_id)
            .map(|t| t.codec_params.clone())
            .ok_or_else(|| PlaybackError::UnsupportedFormat("Opus track vanished".into()))?;
        let mut codec = codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| PlaybackError::UnsupportedFormat(format!("Cannot decode stream: {e}")))?;

        let mut frames = 0u64;
        loop {
            let packet = match reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(PlaybackError::CorruptedStream(e.to_string())),
            };
            if packet.track_id() != track_id {
                continue;
            }
            match codec.decode(&packet) {
                Ok(decoded) => frames += decoded.frames() as u64,
                Err(e) => trace!(error = %e, "Skipping undecodable packet while counting"),
            }
        }
        Ok(frames)
    }

    pub fn path(&self) -> &Path {
        &self.info.path
    }

    /// Convert a decoded packet into a chunk in stream coordinates, dropping
    /// the pre-skip and anything past the end of the track.
    fn to_chunk(&self, packet_ts: u64, mut samples: Vec<f32>) -> Option<DecodedChunk> {
        let channels = self.info.channels as usize;
        if channels == 0 {
            return None;
        }
        let frames = (samples.len() / channels) as u64;
        let mut start = packet_ts;

        if start < self.trim_until {
            let skip = (self.trim_until - start).min(frames);
            samples.drain(..skip as usize * channels);
            start += skip;
        }

        let stream_start = start.saturating_sub(self.info.pre_skip as u64);
        let remaining = self.info.total_frames.saturating_sub(stream_start);
        let frames = (samples.len() / channels) as u64;
        if frames > remaining {
            samples.truncate(remaining as usize * channels);
        }

        if samples.is_empty() {
            return None;
        }
        Some(DecodedChunk::new(stream_start, self.info.channels, samples))
    }
}

impl PacketDecoder for OggOpusDecoder {
    fn track_info(&self) -> &TrackInfo {
        &self.info
    }

    fn next_chunk(&mut self) -> Result<DecodeStep> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("Reached end of Opus stream");
                    return Ok(DecodeStep::EndOfStream);
                }
                Err(SymphoniaError::ResetRequired) => {
                    // Chained streams are not followed.
                    warn!("Track list changed mid-stream; stopping at the first stream");
                    return Ok(DecodeStep::EndOfStream);
                }
                Err(SymphoniaError::IoError(e)) => {
                    return Err(PlaybackError::DecodeError(format!("Failed to read packet: {e}")));
                }
                Err(e) => {
                    return Err(PlaybackError::CorruptedStream(format!(
                        "Failed to demux packet: {e}"
                    )));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let samples = match self.codec.decode(&packet) {
                Ok(decoded) => SampleConverter::to_interleaved_f32(&decoded),
                Err(SymphoniaError::DecodeError(e)) => {
                    return Err(PlaybackError::DecodeError(e.to_string()));
                }
                Err(SymphoniaError::IoError(e)) => {
                    return Err(PlaybackError::DecodeError(e.to_string()));
                }
                Err(e) => return Err(PlaybackError::CorruptedStream(e.to_string())),
            };

            if let Some(chunk) = self.to_chunk(packet.ts(), samples) {
                return Ok(DecodeStep::Chunk(chunk));
            }
        }
    }

    fn seek(&mut self, frame: u64) -> Result<u64> {
        let frame = frame.min(self.info.total_frames);
        let target = frame + self.info.pre_skip as u64;
        // Resume early and let the caller discard the pre-roll.
        let resume_at = target.saturating_sub(SEEK_PRE_ROLL);

        let seeked = self
            .reader
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: resume_at,
                    track_id: self.track_id,
                },
            )
            .map_err(|e| PlaybackError::SourceError(format!("Seek failed: {e}")))?;
        self.codec.reset();

        // Never let trimming fall below the pre-skip.
        self.trim_until = self.info.pre_skip as u64;
        let reached = seeked
            .actual_ts
            .max(self.trim_until)
            .saturating_sub(self.info.pre_skip as u64);

        trace!(frame, resume_at, reached, "Seeked Opus stream");
        Ok(reached)
    }
}

#[cfg(test)]
#[allow(dead_code)]
#[path = "../../tests/common/ogg_opus.rs"]
mod encoded;
