//! Workspace facade crate.
//!
//! Re-exports the playback engine from `core-playback` and exposes the
//! feature flags that select its default audio output, so host applications
//! depend on `opuskit-workspace` alone.
//!
//! ```no_run
//! use opuskit_workspace::OpusPlayer;
//!
//! let player = OpusPlayer::new()?;
//! player.open("/music/track.opus")?;
//! player.play()?;
//! # Ok::<(), opuskit_workspace::PlaybackError>(())
//! ```

pub use core_playback::*;
