use std::time::Duration;

use crate::midi::song::Song;

/// Microseconds per quarter note when a song sets no tempo (120 BPM).
pub const DEFAULT_TEMPO: u32 = 500_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoChange {
    pub tick: u64,
    pub micros_per_quarter: u32,
}

/// Tick-ordered tempo changes. Always starts with an entry at tick 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempoMap {
    changes: Vec<TempoChange>,
}

impl Default for TempoMap {
    fn default() -> Self {
        TempoMap::new(Vec::new())
    }
}

impl TempoMap {
    /// Build a map from changes in any order. Changes sharing a tick keep
    /// their input order, so the last one given wins.
    pub fn new(mut changes: Vec<TempoChange>) -> Self {
        changes.sort_by_key(|c| c.tick);
        if changes.first().is_none_or(|c| c.tick > 0) {
            changes.insert(
                0,
                TempoChange {
                    tick: 0,
                    micros_per_quarter: DEFAULT_TEMPO,
                },
            );
        }
        TempoMap { changes }
    }

    /// Collect every tempo meta event of `song`, tracks in file order.
    pub fn from_song(song: &Song) -> Self {
        let changes = song
            .tracks
            .iter()
            .flat_map(|t| &t.events)
            .filter_map(|e| {
                e.tempo().map(|micros_per_quarter| TempoChange {
                    tick: e.tick,
                    micros_per_quarter,
                })
            })
            .collect();
        TempoMap::new(changes)
    }

    pub fn changes(&self) -> &[TempoChange] {
        &self.changes
    }

    /// Index of the last change with `tick <= query`.
    fn index_at(&self, tick: u64) -> usize {
        self.changes.partition_point(|c| c.tick <= tick).saturating_sub(1)
    }

    pub fn tempo_at(&self, tick: u64) -> u32 {
        self.changes[self.index_at(tick)].micros_per_quarter
    }

    pub fn cursor_at(&self, tick: u64) -> TempoCursor<'_> {
        let index = self.index_at(tick);
        TempoCursor {
            map: self,
            next: index + 1,
            tempo: self.changes[index].micros_per_quarter,
        }
    }

    /// Wall-clock time between two ticks, honoring every change in between.
    pub fn micros_between(&self, from: u64, to: u64, ticks_per_quarter: u16) -> u64 {
        if to <= from {
            return 0;
        }
        self.cursor_at(from).advance(from, to, ticks_per_quarter)
    }

    pub fn duration_at(&self, tick: u64, ticks_per_quarter: u16) -> Duration {
        Duration::from_micros(self.micros_between(0, tick, ticks_per_quarter))
    }
}

/// Forward-only walk over a [`TempoMap`], used by the playback loop so each
/// event costs no lookup.
#[derive(Debug, Clone)]
pub struct TempoCursor<'a> {
    map: &'a TempoMap,
    next: usize,
    tempo: u32,
}

impl TempoCursor<'_> {
    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    /// Microseconds from `from` to `to`. Moves past every change at or
    /// before `to`, splitting the span at each one.
    pub fn advance(&mut self, from: u64, to: u64, ticks_per_quarter: u16) -> u64 {
        let mut micros = 0;
        let mut position = from;
        while let Some(change) = self.map.changes.get(self.next) {
            if change.tick > to {
                break;
            }
            if change.tick > position {
                micros += ticks_to_micros(change.tick - position, self.tempo, ticks_per_quarter);
                position = change.tick;
            }
            self.tempo = change.micros_per_quarter;
            self.next += 1;
        }
        micros + ticks_to_micros(to.saturating_sub(position), self.tempo, ticks_per_quarter)
    }
}

pub fn ticks_to_micros(ticks: u64, micros_per_quarter: u32, ticks_per_quarter: u16) -> u64 {
    let micros =
        u128::from(ticks) * u128::from(micros_per_quarter) / u128::from(ticks_per_quarter.max(1));
    u64::try_from(micros).unwrap_or(u64::MAX)
}
