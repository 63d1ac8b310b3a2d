//! Playback lifecycle state machine.

use std::fmt;

use crate::error::{PlaybackError, Result};

/// Lifecycle state of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlaybackState {
    /// No track has been opened successfully.
    #[default]
    Idle,
    /// A track is loaded; position is at the start.
    Stopped,
    Playing,
    Paused,
    /// The stream ran out. Left only by a seek or by opening a new track.
    Finished,
}

/// Operations that drive [`PlaybackState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Open,
    Play,
    Pause,
    Stop,
    Seek,
    Finish,
}

impl PlaybackState {
    /// Compute the state reached by applying `operation`.
    ///
    /// Returns [`PlaybackError::InvalidTransition`] when the operation has no
    /// effect in this state. Callers on the public API treat that as a no-op.
    pub fn transition(self, operation: Operation) -> Result<PlaybackState> {
        use Operation::*;
        use PlaybackState::*;

        let next = match (self, operation) {
            (_, Open) => Some(Stopped),

            (Stopped | Paused, Play) => Some(Playing),

            (Playing, Pause) => Some(Paused),

            // Nothing is loaded, so there is nothing to stop.
            (Idle, Stop) => Some(Idle),
            (_, Stop) => Some(Stopped),

            (Finished, Seek) => Some(Paused),
            (Stopped | Playing | Paused, Seek) => Some(self),

            (Playing, Finish) => Some(Finished),

            _ => None,
        };

        next.ok_or(PlaybackError::InvalidTransition {
            from: self,
            operation,
        })
    }

    /// Returns `true` if a track is loaded.
    pub fn has_track(self) -> bool {
        !matches!(self, PlaybackState::Idle)
    }

    pub fn is_playing(self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Stopped => "stopped",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Finished => "finished",
        };
        f.write_str(name)
    }
}
