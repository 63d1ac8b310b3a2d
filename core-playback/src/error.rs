//! # Playback Error Types
//!
//! Errors surfaced by the player, the decode pipeline and the decoder
//! backends. None of these cross the render boundary: render-side failures
//! degrade to silence.

use thiserror::Error;

use crate::state::{Operation, PlaybackState};

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Source / Format Errors
    // ========================================================================
    /// The file is not a decodable Opus stream.
    #[error("Unsupported or invalid audio format: {0}")]
    UnsupportedFormat(String),

    /// Failed to open or read the audio source.
    #[error("Failed to open audio source: {0}")]
    SourceError(String),

    // ========================================================================
    // Decoding Errors
    // ========================================================================
    /// A single packet failed to decode. Recovered by skipping the packet.
    #[error("Decoding error: {0}")]
    DecodeError(String),

    /// Too many consecutive packets failed to decode.
    #[error("Corrupted audio stream: {0}")]
    CorruptedStream(String),

    /// The ring buffer was empty while playing. Never returned to callers;
    /// the render path plays silence instead.
    #[error("Buffer underrun")]
    Underrun,

    // ========================================================================
    // Playback Control Errors
    // ========================================================================
    /// The operation is not valid in the current state.
    #[error("Cannot {operation:?} while {from:?}")]
    InvalidTransition {
        from: PlaybackState,
        operation: Operation,
    },

    /// Attempted operation when no track is loaded.
    #[error("No track loaded")]
    NoTrackLoaded,

    // ========================================================================
    // Platform / Configuration Errors
    // ========================================================================
    /// The audio output device failed to open or change state.
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    /// A required host capability was not provided.
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlaybackError {
    /// Returns `true` if the condition may clear up on its own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlaybackError::DecodeError(_) | PlaybackError::Underrun | PlaybackError::AudioDevice(_)
        )
    }

    /// Returns `true` if the error is caused by the content of the file.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::UnsupportedFormat(_)
                | PlaybackError::DecodeError(_)
                | PlaybackError::CorruptedStream(_)
        )
    }
}

impl From<bridge_traits::BridgeError> for PlaybackError {
    fn from(err: bridge_traits::BridgeError) -> Self {
        PlaybackError::AudioDevice(err.to_string())
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(PlaybackError::DecodeError("bad packet".into()).is_transient());
        assert!(PlaybackError::DecodeError("bad packet".into()).is_format_error());
        assert!(PlaybackError::UnsupportedFormat("x.wav".into()).is_format_error());
        assert!(!PlaybackError::UnsupportedFormat("x.wav".into()).is_transient());
        assert!(!PlaybackError::NoTrackLoaded.is_format_error());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = PlaybackError::InvalidTransition {
            from: PlaybackState::Idle,
            operation: Operation::Pause,
        };
        assert_eq!(err.to_string(), "Cannot Pause while Idle");
    }

    #[test]
    fn test_bridge_error_maps_to_audio_device() {
        let err: PlaybackError = bridge_traits::BridgeError::Device("gone".into()).into();
        assert!(matches!(err, PlaybackError::AudioDevice(msg) if msg.contains("gone")));
    }
}
