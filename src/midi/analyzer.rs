//! Per-track metadata derived from a decoded song.

use std::collections::BTreeMap;
use std::fmt;

use crate::midi::gm::instrument_name;
use crate::midi::song::{DRUM_CHANNEL, Song, Track};

pub const UNKNOWN_INSTRUMENT: &str = "Unknown Instrument";
pub const DRUMS: &str = "Drums";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Instrument,
    Rhythm,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Instrument => f.write_str("Instrument"),
            TrackKind::Rhythm => f.write_str("Rhythm"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub name: String,
    /// General MIDI program number.
    pub instrument: Option<u8>,
    /// 1-based channel of the first channel-voice event, 1 if there is none.
    pub channel: u8,
    pub is_drum: bool,
}

impl TrackInfo {
    pub fn instrument_name(&self) -> &'static str {
        if self.is_drum {
            return DRUMS;
        }
        self.instrument.map_or(UNKNOWN_INSTRUMENT, instrument_name)
    }

    pub fn kind(&self) -> TrackKind {
        if self.is_drum {
            TrackKind::Rhythm
        } else {
            TrackKind::Instrument
        }
    }
}

/// Latest program per channel over the whole song.
///
/// Tracks are scanned in file order, so a later track overrides an earlier
/// one on the same channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentMap {
    programs: BTreeMap<u8, u8>,
}

impl InstrumentMap {
    pub fn from_song(song: &Song) -> Self {
        let mut programs = BTreeMap::new();
        for event in song.tracks.iter().flat_map(|t| &t.events) {
            if let (Some(channel), Some(program)) = (event.channel(), event.program()) {
                programs.insert(channel, program);
            }
        }
        InstrumentMap { programs }
    }

    pub fn program(&self, channel: u8) -> Option<u8> {
        self.programs.get(&channel).copied()
    }

    /// `(channel, program)` pairs in channel order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.programs.iter().map(|(c, p)| (*c, *p))
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

/// Derive one [`TrackInfo`] per track, in track order.
///
/// Every track gets an entry, even one with no usable evidence, so callers
/// can keep addressing tracks by their file index.
pub fn analyze(song: &Song) -> Vec<TrackInfo> {
    let instruments = InstrumentMap::from_song(song);
    song.tracks
        .iter()
        .enumerate()
        .map(|(index, track)| analyze_track(index, track, &instruments))
        .collect()
}

fn analyze_track(index: usize, track: &Track, instruments: &InstrumentMap) -> TrackInfo {
    let mut channel = None;
    let mut program = None;
    let mut is_drum = false;

    for event in &track.events {
        let Some(event_channel) = event.channel() else {
            continue;
        };
        channel.get_or_insert(event_channel);
        is_drum |= event_channel == DRUM_CHANNEL;
        if program.is_none() {
            program = event.program();
        }
    }

    let channel = channel.unwrap_or(1);
    let instrument = program.or_else(|| instruments.program(channel));

    TrackInfo {
        name: track
            .name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("Track {}", index + 1)),
        instrument,
        channel,
        is_drum,
    }
}
