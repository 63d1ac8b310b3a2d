//! Real Ogg Opus files, encoded with libopus when a test needs one.

use std::io::Write;
use std::path::Path;

use audiopus::coder::Encoder;
use audiopus::{Application, Channels, SampleRate};
use ogg::writing::{PacketWriteEndInfo, PacketWriter};
use tempfile::NamedTempFile;

/// 20 ms at 48 kHz, per channel.
pub const OPUS_PACKET_FRAMES: u64 = 960;

const PACKETS_PER_PAGE: u64 = 10;
const SERIAL: u32 = 0x0b05_0001;

pub struct OpusFile {
    pub file: NamedTempFile,
    pub channels: u8,
    /// Audible frames per channel, pre-skip excluded.
    pub frames: u64,
    pub pre_skip: u16,
    pub packets: u64,
}

impl OpusFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

fn opus_head(channels: u8, pre_skip: u16) -> Vec<u8> {
    let mut head = Vec::with_capacity(19);
    head.extend_from_slice(b"OpusHead");
    head.push(1);
    head.push(channels);
    head.extend_from_slice(&pre_skip.to_le_bytes());
    head.extend_from_slice(&48_000u32.to_le_bytes());
    head.extend_from_slice(&0i16.to_le_bytes());
    // Mapping family 0: mono or stereo, no table.
    head.push(0);
    head
}

fn opus_tags() -> Vec<u8> {
    let vendor = b"opuskit tests";
    let mut tags = Vec::with_capacity(8 + 4 + vendor.len() + 4);
    tags.extend_from_slice(b"OpusTags");
    tags.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    tags.extend_from_slice(vendor);
    tags.extend_from_slice(&0u32.to_le_bytes());
    tags
}

/// Encode `frames` of sine tone per channel into a temporary `.opus` file.
/// Channel `c` plays `440 * (c + 1)` Hz.
///
/// Page granule positions are exact, so the last packet carries the
/// encoder padding past `pre_skip + frames`.
pub fn tone_file(channels: u8, frames: u64) -> OpusFile {
    let layout = if channels == 1 { Channels::Mono } else { Channels::Stereo };
    let encoder = Encoder::new(SampleRate::Hz48000, layout, Application::Audio).unwrap();
    let pre_skip = encoder.lookahead().unwrap() as u16;
    let packets = (frames + pre_skip as u64).div_ceil(OPUS_PACKET_FRAMES);
    let end_granule = pre_skip as u64 + frames;

    let mut bytes = Vec::new();
    {
        let mut writer = PacketWriter::new(&mut bytes);
        writer
            .write_packet(opus_head(channels, pre_skip), SERIAL, PacketWriteEndInfo::EndPage, 0)
            .unwrap();
        writer
            .write_packet(opus_tags(), SERIAL, PacketWriteEndInfo::EndPage, 0)
            .unwrap();

        let mut pcm = vec![0i16; OPUS_PACKET_FRAMES as usize * channels as usize];
        let mut out = vec![0u8; 4000];
        for packet in 0..packets {
            for i in 0..OPUS_PACKET_FRAMES {
                let n = packet * OPUS_PACKET_FRAMES + i;
                for c in 0..channels as u64 {
                    let sample = if n < frames {
                        let freq = 440.0 * (c + 1) as f32;
                        let phase = 2.0 * std::f32::consts::PI * freq * n as f32 / 48_000.0;
                        (phase.sin() * 12_000.0) as i16
                    } else {
                        0
                    };
                    pcm[(i * channels as u64 + c) as usize] = sample;
                }
            }
            let len = encoder.encode(&pcm, &mut out).unwrap();

            let last = packet + 1 == packets;
            let (end_info, granule) = if last {
                (PacketWriteEndInfo::EndStream, end_granule)
            } else if (packet + 1) % PACKETS_PER_PAGE == 0 {
                (PacketWriteEndInfo::EndPage, (packet + 1) * OPUS_PACKET_FRAMES)
            } else {
                (PacketWriteEndInfo::NormalPacket, (packet + 1) * OPUS_PACKET_FRAMES)
            };
            writer
                .write_packet(out[..len].to_vec(), SERIAL, end_info, granule)
                .unwrap();
        }
    }

    let mut file = tempfile::Builder::new().suffix(".opus").tempfile().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    OpusFile {
        file,
        channels,
        frames,
        pre_skip,
        packets,
    }
}
