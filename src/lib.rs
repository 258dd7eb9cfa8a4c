//! Standard MIDI File decoding and real-time playback scheduling.
//!
//! Bytes go through [`midi::loader::decode`] into a [`Song`], which is
//! analyzed into per-track [`TrackInfo`] and merged into a tick-ordered
//! [`Timeline`]. A [`Session`] plays that timeline on a background thread,
//! writing messages to an [`EventSink`] and reporting progress to a
//! [`PlaybackObserver`].
//!
//! ```rust,no_run
//! use smf_player::{NullObserver, Session};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = Session::new(|message: &[u8]| println!("{message:02X?}"), NullObserver);
//! session.load_file("song.mid")?;
//! for info in session.track_infos() {
//!     println!("{} ({}) on channel {}", info.name, info.instrument_name(), info.channel);
//! }
//! session.play()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod midi;
pub mod session;
pub mod sink;

pub use config::PlayerConfig;
pub use error::{DecodeError, LoadError, PlaybackError, SinkError};
pub use midi::analyzer::{InstrumentMap, TrackInfo, TrackKind};
pub use midi::loader::{decode, load_midi_file};
pub use midi::song::{Format, Header, RawEvent, Song, Track};
pub use midi::tempo::{TempoChange, TempoMap};
pub use midi::timeline::{Timeline, TimelineEvent};
pub use midi::utils::format_duration;
pub use session::{PlaybackStatus, Session};
pub use sink::{EventSink, NullObserver, PlaybackObserver};
