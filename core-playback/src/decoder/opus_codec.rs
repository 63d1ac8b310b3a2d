//! libopus packet decoder exposed as a symphonia codec.
//!
//! symphonia 0.5 demuxes Ogg Opus but ships no Opus decoder, so this wraps
//! `audiopus` behind symphonia's [`Decoder`] trait and is registered into a
//! private codec registry by the Ogg Opus backend.

use audiopus::coder::Decoder as LibOpusDecoder;
use audiopus::packet::Packet as OpusPacket;
use audiopus::{Channels, MutSignals, SampleRate};
use core_async::lock::Lock;
use symphonia::core::audio::{AsAudioBufferRef, AudioBuffer, AudioBufferRef, Layout, Signal, SignalSpec};
use symphonia::core::codecs::{
    CodecDescriptor, CodecParameters, Decoder, DecoderOptions, FinalizeResult, CODEC_TYPE_OPUS,
};
use symphonia::core::errors::{Error, Result};
use symphonia::core::formats::Packet;
use symphonia::core::units::Duration;
use tracing::debug;

/// Largest Opus frame: 120 ms at 48 kHz, per channel.
const MAX_FRAME_SAMPLES: usize = 5760;

/// Opus always decodes at 48 kHz in Ogg.
const OPUS_RATE: u32 = 48_000;

pub struct OpusCodec {
    params: CodecParameters,
    channels: usize,
    rate: SampleRate,
    /// libopus state is `Send` only; symphonia codecs must be `Sync`.
    decoder: Lock<LibOpusDecoder>,
    buffer: AudioBuffer<i16>,
    /// Interleaved scratch reused for every packet.
    scratch: Vec<i16>,
}

fn opus_rate(rate: u32) -> SampleRate {
    match rate {
        8_000 => SampleRate::Hz8000,
        12_000 => SampleRate::Hz12000,
        16_000 => SampleRate::Hz16000,
        24_000 => SampleRate::Hz24000,
        _ => SampleRate::Hz48000,
    }
}

fn opus_channels(channels: usize) -> Channels {
    if channels == 1 {
        Channels::Mono
    } else {
        Channels::Stereo
    }
}

impl Decoder for OpusCodec {
    fn try_new(params: &CodecParameters, _options: &DecoderOptions) -> Result<Self> {
        if params.codec != CODEC_TYPE_OPUS {
            return Err(Error::Unsupported("codec is not opus"));
        }

        let channels = params.channels.map(|c| c.count()).unwrap_or(2);
        if !(1..=2).contains(&channels) {
            // Multichannel Opus needs the multistream API.
            return Err(Error::Unsupported("opus streams with more than two channels"));
        }

        let sample_rate = params.sample_rate.unwrap_or(OPUS_RATE);
        let rate = opus_rate(sample_rate);
        let decoder = LibOpusDecoder::new(rate, opus_channels(channels)).map_err(|e| {
            debug!(error = %e, "libopus rejected decoder parameters");
            Error::Unsupported("opus decoder parameters")
        })?;

        let layout = if channels == 1 {
            Layout::Mono
        } else {
            Layout::Stereo
        };
        let spec = SignalSpec::new_with_layout(sample_rate, layout);

        Ok(Self {
            params: params.clone(),
            channels,
            rate,
            decoder: Lock::new(decoder),
            buffer: AudioBuffer::new(MAX_FRAME_SAMPLES as Duration, spec),
            scratch: vec![0; MAX_FRAME_SAMPLES * channels],
        })
    }

    fn supported_codecs() -> &'static [CodecDescriptor] {
        &[CodecDescriptor {
            codec: CODEC_TYPE_OPUS,
            short_name: "opus",
            long_name: "Opus (libopus)",
            inst_func: |params, options| Ok(Box::new(OpusCodec::try_new(params, options)?)),
        }]
    }

    fn reset(&mut self) {
        // libopus keeps prediction state between packets; start fresh after a
        // seek.
        match LibOpusDecoder::new(self.rate, opus_channels(self.channels)) {
            Ok(decoder) => *self.decoder.get_mut() = decoder,
            Err(e) => debug!(error = %e, "Failed to reset libopus decoder"),
        }
    }

    fn codec_params(&self) -> &CodecParameters {
        &self.params
    }

    fn decode(&mut self, packet: &Packet) -> Result<AudioBufferRef<'_>> {
        let input = OpusPacket::try_from(&packet.data[..])
            .map_err(|_| Error::DecodeError("empty opus packet"))?;
        let output = MutSignals::try_from(self.scratch.as_mut_slice())
            .map_err(|_| Error::DecodeError("opus output buffer unavailable"))?;

        let decoded = self
            .decoder
            .get_mut()
            .decode(Some(input), output, false)
            .map_err(|e| {
                debug!(error = %e, bytes = packet.data.len(), "libopus failed to decode packet");
                Error::DecodeError("opus packet rejected by libopus")
            })?;

        self.buffer.clear();
        self.buffer.render_reserved(Some(decoded));

        let channels = self.channels;
        for channel in 0..channels {
            let plane = self.buffer.chan_mut(channel);
            for (i, sample) in plane.iter_mut().enumerate() {
                *sample = self.scratch[i * channels + channel];
            }
        }

        Ok(self.buffer.as_audio_buffer_ref())
    }

    fn finalize(&mut self) -> FinalizeResult {
        FinalizeResult::default()
    }

    fn last_decoded(&self) -> AudioBufferRef<'_> {
        self.buffer.as_audio_buffer_ref()
    }
}
