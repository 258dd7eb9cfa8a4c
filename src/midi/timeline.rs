use log::debug;
use thousands::Separable;

use crate::midi::analyzer::TrackInfo;
use crate::midi::song::{DRUM_CHANNEL, Song, VoiceKind};
use crate::midi::tempo::TempoMap;

/// A channel-voice message placed on the song-wide timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEvent {
    pub tick: u64,
    /// Status byte followed by data bytes.
    pub message: Vec<u8>,
    /// Resolved channel of the originating track (1-based).
    pub source_channel: u8,
    pub track: usize,
}

impl TimelineEvent {
    /// 1-based channel the message itself addresses.
    pub fn channel(&self) -> u8 {
        (self.message[0] & 0x0F) + 1
    }

    pub fn is_drum(&self) -> bool {
        self.channel() == DRUM_CHANNEL
    }

    pub fn program(&self) -> Option<u8> {
        match VoiceKind::from_status(self.message[0]) {
            Some(VoiceKind::ProgramChange) => self.message.get(1).copied(),
            _ => None,
        }
    }

    /// Message bytes routed to `channel` (1-based). Drum-channel messages
    /// keep their channel.
    pub fn routed_to(&self, channel: u8) -> Vec<u8> {
        let mut message = self.message.clone();
        if !self.is_drum() && channel != self.channel() {
            message[0] = (message[0] & 0xF0) | ((channel - 1) & 0x0F);
        }
        message
    }
}

/// Every channel-voice event of a song in tick order, plus its tempo map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    events: Vec<TimelineEvent>,
    tempo_map: TempoMap,
    ticks_per_quarter: u16,
    end_tick: u64,
}

/// Merge every track into one tick-ordered timeline.
///
/// Events sharing a tick keep track order, then in-track order. Meta events
/// are left out; tempo changes go to the tempo map.
pub fn merge(song: &Song, infos: &[TrackInfo]) -> Timeline {
    let mut events: Vec<TimelineEvent> = song
        .tracks
        .iter()
        .enumerate()
        .flat_map(|(index, track)| {
            let source_channel = infos.get(index).map_or(1, |info| info.channel);
            track
                .events
                .iter()
                .filter(|e| e.voice_kind().is_some())
                .map(move |e| TimelineEvent {
                    tick: e.tick,
                    message: e.message_bytes(),
                    source_channel,
                    track: index,
                })
        })
        .collect();
    events.sort_by_key(|e| e.tick);

    let tempo_map = TempoMap::from_song(song);
    debug!(
        "Merged {} events from {} tracks, {} tempo changes",
        events.len().separate_with_commas(),
        song.tracks.len(),
        tempo_map.changes().len()
    );

    Timeline {
        events,
        tempo_map,
        ticks_per_quarter: song.ticks_per_quarter(),
        end_tick: song.total_ticks(),
    }
}

impl Timeline {
    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo_map
    }

    pub fn ticks_per_quarter(&self) -> u16 {
        self.ticks_per_quarter
    }

    /// Song length in ticks, including trailing meta events.
    pub fn end_tick(&self) -> u64 {
        self.end_tick
    }

    /// Index of the first event at or after `tick`.
    pub fn index_at(&self, tick: u64) -> usize {
        self.events.partition_point(|e| e.tick < tick)
    }

    /// Latest program per channel among events strictly before `tick`.
    pub fn programs_before(&self, tick: u64) -> Vec<(u8, u8)> {
        let mut programs = [None; 16];
        for event in &self.events[..self.index_at(tick)] {
            if let Some(program) = event.program() {
                programs[usize::from(event.channel() - 1)] = Some(program);
            }
        }
        programs
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.map(|p| (i as u8 + 1, p)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::analyzer::analyze;
    use crate::midi::song::{Format, Header, META_TEMPO, RawEvent, Track};

    fn voice(tick: u64, status: u8, data: &[u8]) -> RawEvent {
        RawEvent {
            tick,
            status,
            data: data.to_vec(),
            meta_type: None,
        }
    }

    fn tempo(tick: u64, micros: u32) -> RawEvent {
        RawEvent {
            tick,
            status: 0xFF,
            data: micros.to_be_bytes()[1..].to_vec(),
            meta_type: Some(META_TEMPO),
        }
    }

    fn song(tracks: Vec<Vec<RawEvent>>) -> Song {
        Song {
            header: Header {
                format: Format::Parallel,
                track_count: tracks.len() as u16,
                ticks_per_quarter: 480,
            },
            tracks: tracks
                .into_iter()
                .map(|events| Track { events, name: None })
                .collect(),
        }
    }

    #[test]
    fn ties_keep_track_order() {
        let song = song(vec![
            vec![voice(0, 0x90, &[60, 1]), voice(480, 0x80, &[60, 0])],
            vec![voice(0, 0x91, &[64, 1]), voice(240, 0x81, &[64, 0])],
            vec![voice(480, 0x92, &[67, 1])],
        ]);
        let timeline = merge(&song, &analyze(&song));
        let order: Vec<(u64, usize)> = timeline
            .events()
            .iter()
            .map(|e| (e.tick, e.track))
            .collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (240, 1), (480, 0), (480, 2)]);
        assert_eq!(timeline.events()[3].source_channel, 1);
        assert_eq!(timeline.events()[4].source_channel, 3);
    }

    #[test]
    fn tempo_goes_to_map_not_timeline() {
        let song = song(vec![
            vec![tempo(0, 600_000), tempo(960, 300_000)],
            vec![voice(0, 0x90, &[60, 1]), voice(1920, 0x80, &[60, 0])],
        ]);
        let timeline = merge(&song, &analyze(&song));
        assert_eq!(timeline.events().len(), 2);
        assert_eq!(timeline.tempo_map().changes().len(), 2);
        assert_eq!(timeline.tempo_map().tempo_at(1000), 300_000);
        assert_eq!(timeline.end_tick(), 1920);
    }

    #[test]
    fn routing_rewrites_channel_except_drums() {
        let event = TimelineEvent {
            tick: 0,
            message: vec![0x92, 60, 100],
            source_channel: 3,
            track: 0,
        };
        assert_eq!(event.routed_to(5), vec![0x94, 60, 100]);
        assert_eq!(event.routed_to(3), vec![0x92, 60, 100]);

        let drum = TimelineEvent {
            tick: 0,
            message: vec![0x99, 36, 100],
            source_channel: 10,
            track: 1,
        };
        assert_eq!(drum.routed_to(1), vec![0x99, 36, 100]);
    }

    #[test]
    fn programs_before_tick() {
        let song = song(vec![
            vec![
                voice(0, 0xC0, &[1]),
                voice(480, 0xC0, &[2]),
                voice(960, 0xC0, &[3]),
            ],
            vec![voice(100, 0xC4, &[7])],
        ]);
        let timeline = merge(&song, &analyze(&song));
        assert_eq!(timeline.programs_before(0), vec![]);
        assert_eq!(timeline.programs_before(480), vec![(1, 1), (5, 7)]);
        assert_eq!(timeline.programs_before(961), vec![(1, 3), (5, 7)]);
        assert_eq!(timeline.index_at(480), 2);
    }
}
