//! Decoded song model.
//!
//! A [`Song`] is immutable once the decoder hands it out. Ticks are absolute:
//! delta times are resolved while decoding.

pub const META_TRACK_NAME: u8 = 0x03;
pub const META_END_OF_TRACK: u8 = 0x2F;
pub const META_TEMPO: u8 = 0x51;

/// MIDI channel that General MIDI reserves for percussion (1-based).
pub const DRUM_CHANNEL: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Format 0: one multi-channel track.
    SingleTrack,
    /// Format 1: simultaneous tracks sharing one timeline.
    Parallel,
    /// Format 2: independent sequential patterns.
    Sequential,
}

impl Format {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Format::SingleTrack),
            1 => Some(Format::Parallel),
            2 => Some(Format::Sequential),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub format: Format,
    /// Track count as declared in `MThd`.
    pub track_count: u16,
    pub ticks_per_quarter: u16,
}

/// Channel-voice message family, taken from the status high nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceKind {
    NoteOff,
    NoteOn,
    PolyPressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchBend,
}

impl VoiceKind {
    pub fn from_status(status: u8) -> Option<Self> {
        match status & 0xF0 {
            0x80 => Some(VoiceKind::NoteOff),
            0x90 => Some(VoiceKind::NoteOn),
            0xA0 => Some(VoiceKind::PolyPressure),
            0xB0 => Some(VoiceKind::ControlChange),
            0xC0 => Some(VoiceKind::ProgramChange),
            0xD0 => Some(VoiceKind::ChannelPressure),
            0xE0 => Some(VoiceKind::PitchBend),
            _ => None,
        }
    }

    /// Number of data bytes following the status byte.
    pub fn data_len(self) -> usize {
        match self {
            VoiceKind::ProgramChange | VoiceKind::ChannelPressure => 1,
            _ => 2,
        }
    }
}

/// One decoded event, channel-voice or meta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub tick: u64,
    /// The effective status byte. Running-status events carry the reused one.
    pub status: u8,
    /// Data bytes for channel-voice events, the payload for meta events.
    pub data: Vec<u8>,
    pub meta_type: Option<u8>,
}

impl RawEvent {
    pub fn is_meta(&self) -> bool {
        self.meta_type.is_some()
    }

    pub fn voice_kind(&self) -> Option<VoiceKind> {
        if self.is_meta() {
            return None;
        }
        VoiceKind::from_status(self.status)
    }

    /// 1-based channel of a channel-voice event.
    pub fn channel(&self) -> Option<u8> {
        self.voice_kind().map(|_| (self.status & 0x0F) + 1)
    }

    pub fn program(&self) -> Option<u8> {
        match self.voice_kind() {
            Some(VoiceKind::ProgramChange) => self.data.first().copied(),
            _ => None,
        }
    }

    /// Microseconds per quarter note for a tempo meta event.
    pub fn tempo(&self) -> Option<u32> {
        match (self.meta_type, self.data.as_slice()) {
            (Some(META_TEMPO), [a, b, c, ..]) => {
                Some((u32::from(*a) << 16) | (u32::from(*b) << 8) | u32::from(*c))
            }
            _ => None,
        }
    }

    pub fn track_name(&self) -> Option<String> {
        match self.meta_type {
            Some(META_TRACK_NAME) => Some(String::from_utf8_lossy(&self.data).trim().to_string()),
            _ => None,
        }
    }

    /// Status byte followed by data bytes, ready for a synthesizer.
    pub fn message_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + self.data.len());
        bytes.push(self.status);
        bytes.extend_from_slice(&self.data);
        bytes
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Track {
    pub events: Vec<RawEvent>,
    /// First track-name meta event, if any.
    pub name: Option<String>,
}

impl Track {
    pub fn end_tick(&self) -> u64 {
        self.events.last().map_or(0, |e| e.tick)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    pub header: Header,
    pub tracks: Vec<Track>,
}

impl Song {
    pub fn ticks_per_quarter(&self) -> u16 {
        self.header.ticks_per_quarter
    }

    /// Tick of the last event across all tracks, meta events included.
    pub fn total_ticks(&self) -> u64 {
        self.tracks.iter().map(Track::end_tick).max().unwrap_or(0)
    }

    pub fn event_count(&self) -> usize {
        self.tracks.iter().map(|t| t.events.len()).sum()
    }
}
