//! Collaborators the playback engine drives.

use crate::error::SinkError;
use crate::midi::analyzer::TrackKind;

/// Destination for scheduled MIDI messages, usually a synthesizer driver.
///
/// Called from the playback thread once per message. Implementations should
/// not block for long: a stalled write stalls the timeline and teardown.
pub trait EventSink: Send + Sync {
    fn emit(&self, message: &[u8]) -> Result<(), SinkError>;
}

impl<F> EventSink for F
where
    F: Fn(&[u8]) + Send + Sync,
{
    fn emit(&self, message: &[u8]) -> Result<(), SinkError> {
        self(message);
        Ok(())
    }
}

/// Receives playback updates for display.
///
/// Calls for one session never overlap, and time updates are monotonic
/// between seeks. Every method defaults to doing nothing.
pub trait PlaybackObserver: Send + Sync {
    fn on_time_update(&self, _elapsed_millis: u64) {}

    fn on_instrument_update(&self, _name: &str) {}

    fn on_channel_update(&self, _channel: u8) {}

    fn on_track_type_update(&self, _kind: TrackKind) {}

    fn on_playback_complete(&self) {}
}

/// Observer that ignores every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl PlaybackObserver for NullObserver {}
