//! Planar symphonia buffers to interleaved `f32`.

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::conv::IntoSample;
use symphonia::core::sample::Sample;

/// Normalises decoded audio to interleaved `f32` in `[-1.0, 1.0]`.
pub struct SampleConverter;

impl SampleConverter {
    /// Interleave `buffer` into a new vector, converting the sample format.
    pub fn to_interleaved_f32(buffer: &AudioBufferRef<'_>) -> Vec<f32> {
        let mut out = Vec::new();
        Self::append_interleaved_f32(buffer, &mut out);
        out
    }

    /// Interleave `buffer` onto the end of `out`.
    pub fn append_interleaved_f32(buffer: &AudioBufferRef<'_>, out: &mut Vec<f32>) {
        match buffer {
            AudioBufferRef::F32(buf) => interleave(buf, out),
            AudioBufferRef::F64(buf) => interleave(buf, out),
            AudioBufferRef::S32(buf) => interleave(buf, out),
            AudioBufferRef::S24(buf) => interleave(buf, out),
            AudioBufferRef::S16(buf) => interleave(buf, out),
            AudioBufferRef::S8(buf) => interleave(buf, out),
            AudioBufferRef::U32(buf) => interleave(buf, out),
            AudioBufferRef::U24(buf) => interleave(buf, out),
            AudioBufferRef::U16(buf) => interleave(buf, out),
            AudioBufferRef::U8(buf) => interleave(buf, out),
        }
    }
}

fn interleave<S>(buf: &AudioBuffer<S>, out: &mut Vec<f32>)
where
    S: Sample + IntoSample<f32>,
{
    let channels = buf.spec().channels.count();
    let frames = buf.frames();
    out.reserve(frames * channels);

    for frame in 0..frames {
        for channel in 0..channels {
            out.push(buf.chan(channel)[frame].into_sample());
        }
    }
}
