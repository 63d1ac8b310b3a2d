//! # Opus Playback Engine
//!
//! Decodes Ogg Opus files ahead of real time and feeds an audio output's
//! render callback, with transport controls and lifecycle notifications.
//!
//! ## Overview
//!
//! - [`OpusPlayer`]: the controller and its [`PlaybackState`] machine
//! - [`pipeline`]: background decode-ahead into the [`RingBuffer`]
//! - [`render`]: non-blocking consumer running in the device callback
//! - [`Clock`]: playback position, exact or cached
//! - [`decoder`]: the decoder service boundary and the Ogg Opus backend
//!
//! Static queries need no player: [`can_play`] and [`file_duration`].
//!
//! ## Features
//!
//! - `desktop-shims` (default): a software-clocked output is used when the
//!   builder is given none
//! - `cpal-output`: the default output becomes the system audio device

pub mod clock;
pub mod config;
pub mod decoder;
pub mod delegate;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod player;
pub mod render;
pub mod ring_buffer;
pub mod state;
pub mod track;

pub use clock::Clock;
pub use config::PlayerConfig;
pub use decoder::{
    can_play, file_duration, DecodeStep, DecodedChunk, DecoderBackend, OggOpusBackend,
    PacketDecoder,
};
pub use delegate::PlayerDelegate;
pub use error::{PlaybackError, Result};
pub use frame::PcmFrame;
pub use player::{OpusPlayer, PlayerBuilder, WeakPlayer};
pub use ring_buffer::{PushResult, RingBuffer};
pub use state::{Operation, PlaybackState};
pub use track::TrackInfo;
