//! Error types for decoding and playback.
//!
//! Decode errors are fatal to the load that produced them: the session keeps
//! whatever song it had before. Playback errors are caller mistakes and never
//! change session state.

use std::io;

use thiserror::Error;

/// Errors raised while turning SMF bytes into a [`Song`](crate::midi::song::Song).
///
/// Offsets inside track chunks are relative to the start of the chunk body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid track header for track {track}: expected MTrk, found {found:?}")]
    InvalidTrackHeader { track: usize, found: [u8; 4] },

    /// The stream ended in the middle of a variable-length quantity.
    #[error("Malformed variable-length quantity at offset {offset}")]
    MalformedVlq { offset: usize },

    #[error("Unexpected end of stream at offset {offset} (needed {needed} more bytes)")]
    UnexpectedEndOfStream { offset: usize, needed: usize },

    /// A status byte the decoder cannot size. Decoding stops rather than guess.
    #[error("Unsupported event type 0x{status:02X} at offset {offset}")]
    UnsupportedEventType { status: u8, offset: usize },
}

/// Errors raised by [`load_midi_file`](crate::midi::loader::load_midi_file).
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read MIDI file: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Caller errors on the session surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("No song is loaded")]
    NoSongLoaded,

    #[error("Track index {index} out of range ({count} tracks)")]
    InvalidTrackIndex { index: usize, count: usize },

    #[error("Seek tick {tick} is past the end of the song ({end_tick})")]
    InvalidSeekTick { tick: u64, end_tick: u64 },

    #[error("Channel {0} is outside 1..=16")]
    InvalidChannel(u8),

    #[error("Failed to start playback thread: {0}")]
    Spawn(String),
}

/// A failed write to the sound backend. Logged and counted, never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Event sink rejected message: {0}")]
pub struct SinkError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = DecodeError::UnsupportedEventType {
            status: 0xF4,
            offset: 12,
        };
        assert_eq!(err.to_string(), "Unsupported event type 0xF4 at offset 12");

        let err = PlaybackError::InvalidTrackIndex { index: 3, count: 2 };
        assert_eq!(err.to_string(), "Track index 3 out of range (2 tracks)");
    }

    #[test]
    fn load_error_wraps_decode_error() {
        let err: LoadError = DecodeError::InvalidHeader("bad magic".into()).into();
        assert_eq!(err.to_string(), "Invalid header: bad magic");
    }
}
