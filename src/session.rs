//! The playback session: one loaded song, one playback thread at most.
//!
//! Every operation that restarts playback first stops and joins the running
//! thread, so the thread and the session never write the same state.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, bounded};
use log::{info, warn};

use crate::config::PlayerConfig;
use crate::error::{DecodeError, LoadError, PlaybackError};
use crate::midi::analyzer::{InstrumentMap, TrackInfo, analyze};
use crate::midi::loader::decode;
use crate::midi::player::{PlaybackRun, Progress, RunOutcome, play_timeline};
use crate::midi::song::Song;
use crate::midi::tempo::{DEFAULT_TEMPO, ticks_to_micros};
use crate::midi::timeline::{Timeline, merge};
use crate::sink::{EventSink, PlaybackObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Playing,
    Paused,
    Stopped,
}

/// Everything derived from one decoded file. Shared read-only with the
/// playback thread.
#[derive(Debug)]
struct LoadedSong {
    song: Song,
    infos: Vec<TrackInfo>,
    instruments: InstrumentMap,
    timeline: Timeline,
}

#[derive(Debug, Clone, Default)]
struct PlaybackState {
    status: PlaybackStatus,
    current_tick: u64,
    resume_tick: u64,
    /// First timeline event not yet played at `resume_tick`.
    resume_index: usize,
    elapsed: Duration,
    last_resume: Option<Instant>,
    /// Play time of the last run that reached the end of the song.
    finished_elapsed: Option<Duration>,
    active_track: usize,
    channel_overrides: HashMap<usize, u8>,
}

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<RunOutcome>,
    progress: Arc<Progress>,
}

pub struct Session {
    config: PlayerConfig,
    sink: Arc<dyn EventSink>,
    observer: Arc<dyn PlaybackObserver>,
    loaded: Option<Arc<LoadedSong>>,
    state: PlaybackState,
    worker: Option<Worker>,
}

impl Session {
    pub fn new(sink: impl EventSink + 'static, observer: impl PlaybackObserver + 'static) -> Self {
        Self::with_config(PlayerConfig::default(), sink, observer)
    }

    pub fn with_config(
        config: PlayerConfig,
        sink: impl EventSink + 'static,
        observer: impl PlaybackObserver + 'static,
    ) -> Self {
        Session {
            config,
            sink: Arc::new(sink),
            observer: Arc::new(observer),
            loaded: None,
            state: PlaybackState::default(),
            worker: None,
        }
    }

    /// Decode `bytes` and make it the current song.
    ///
    /// Any playback is stopped first. On failure the previous song stays
    /// loaded.
    pub fn load_song(&mut self, bytes: &[u8]) -> Result<&Song, DecodeError> {
        self.stop();
        let song = decode(bytes)?;
        let infos = analyze(&song);
        let instruments = InstrumentMap::from_song(&song);
        let timeline = merge(&song, &infos);
        info!(
            "Loaded song: {} tracks, {} ticks, {:.1}s",
            infos.len(),
            timeline.end_tick(),
            timeline
                .tempo_map()
                .duration_at(timeline.end_tick(), timeline.ticks_per_quarter())
                .as_secs_f64()
        );

        self.state = PlaybackState::default();
        let loaded = self.loaded.insert(Arc::new(LoadedSong {
            song,
            infos,
            instruments,
            timeline,
        }));
        Ok(&loaded.song)
    }

    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<&Song, LoadError> {
        let bytes = fs::read(path)?;
        Ok(self.load_song(&bytes)?)
    }

    pub fn song(&self) -> Option<&Song> {
        self.loaded.as_ref().map(|l| &l.song)
    }

    pub fn timeline(&self) -> Option<&Timeline> {
        self.loaded.as_ref().map(|l| &l.timeline)
    }

    pub fn instruments(&self) -> Option<&InstrumentMap> {
        self.loaded.as_ref().map(|l| &l.instruments)
    }

    /// Per-track metadata, empty when nothing is loaded.
    pub fn track_infos(&self) -> &[TrackInfo] {
        self.loaded
            .as_ref()
            .map(|l| l.infos.as_slice())
            .unwrap_or(&[])
    }

    /// Song length with every tempo change applied.
    pub fn duration(&self) -> Duration {
        self.timeline().map_or(Duration::ZERO, |t| {
            t.tempo_map().duration_at(t.end_tick(), t.ticks_per_quarter())
        })
    }

    /// Song length assuming 120 BPM throughout, ignoring the tempo map.
    pub fn nominal_duration(&self) -> Duration {
        self.song().map_or(Duration::ZERO, |s| {
            Duration::from_micros(ticks_to_micros(
                s.total_ticks(),
                DEFAULT_TEMPO,
                s.ticks_per_quarter(),
            ))
        })
    }

    pub fn status(&self) -> PlaybackStatus {
        match &self.worker {
            Some(worker) if worker.progress.completed_elapsed().is_some() => PlaybackStatus::Stopped,
            _ => self.state.status,
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.worker
            .as_ref()
            .map_or(self.state.current_tick, |w| w.progress.current_tick())
    }

    pub fn active_track(&self) -> usize {
        self.state.active_track
    }

    /// Wall-clock play time. Does not advance while paused.
    pub fn elapsed_time(&self) -> Duration {
        if let Some(elapsed) = self
            .worker
            .as_ref()
            .and_then(|w| w.progress.completed_elapsed())
        {
            return elapsed;
        }
        if let Some(elapsed) = self.state.finished_elapsed {
            return elapsed;
        }
        match (self.state.status, self.state.last_resume) {
            (PlaybackStatus::Playing, Some(resumed)) => self.state.elapsed + resumed.elapsed(),
            _ => self.state.elapsed,
        }
    }

    /// Start playing from the current resume point.
    pub fn play(&mut self) -> Result<(), PlaybackError> {
        self.reap();
        if self.state.status == PlaybackStatus::Playing {
            return Ok(());
        }
        let tick = self.state.resume_tick;
        let index = self.state.resume_index;
        self.start(tick, index)
    }

    /// Continue a paused session where it stopped.
    pub fn resume(&mut self) -> Result<(), PlaybackError> {
        self.play()
    }

    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        self.reap();
        if self.state.status != PlaybackStatus::Playing {
            return Ok(());
        }
        if let Some(outcome) = self.halt() {
            self.apply_outcome(outcome);
        }
        if self.state.status == PlaybackStatus::Playing {
            if let Some(resumed) = self.state.last_resume.take() {
                self.state.elapsed += resumed.elapsed();
            }
            self.state.status = PlaybackStatus::Paused;
            info!("Paused at tick {}", self.state.resume_tick);
        }
        Ok(())
    }

    /// Stop playback and return to the start of the song.
    pub fn stop(&mut self) {
        self.halt();
        self.state.status = PlaybackStatus::Stopped;
        self.state.current_tick = 0;
        self.state.resume_tick = 0;
        self.state.resume_index = 0;
        self.state.elapsed = Duration::ZERO;
        self.state.last_resume = None;
        self.state.finished_elapsed = None;
    }

    /// Restart from the beginning.
    pub fn rewind(&mut self) -> Result<(), PlaybackError> {
        self.stop();
        self.play()
    }

    /// Stop playback and forget track selection and channel overrides.
    pub fn reset(&mut self) {
        self.stop();
        self.state = PlaybackState::default();
    }

    /// Move the play head to `tick`. Playback continues from there if it was
    /// running.
    pub fn seek(&mut self, tick: u64) -> Result<(), PlaybackError> {
        let loaded = self.loaded.clone().ok_or(PlaybackError::NoSongLoaded)?;
        let timeline = &loaded.timeline;
        if tick > timeline.end_tick() {
            return Err(PlaybackError::InvalidSeekTick {
                tick,
                end_tick: timeline.end_tick(),
            });
        }

        self.reap();
        let was_playing = self.state.status == PlaybackStatus::Playing;
        self.halt();

        self.state.current_tick = tick;
        self.state.resume_tick = tick;
        self.state.resume_index = timeline.index_at(tick);
        self.state.elapsed = timeline
            .tempo_map()
            .duration_at(tick, timeline.ticks_per_quarter());
        self.state.last_resume = None;
        self.state.finished_elapsed = None;
        info!("Seek to tick {tick}");

        if was_playing {
            self.start(tick, self.state.resume_index)
        } else {
            Ok(())
        }
    }

    /// Make `index` the active track and report its metadata. The new track's
    /// channel override applies from the current play head.
    pub fn select_track(&mut self, index: usize) -> Result<(), PlaybackError> {
        self.check_track(index)?;
        self.with_paused(|session| {
            session.state.active_track = index;
            session.notify_track(index);
        })
    }

    /// Route the messages of track `index` to `channel` while it is the active
    /// track, or back to its own channels with `None`. Drum-channel messages
    /// are never rerouted.
    pub fn set_channel_override(
        &mut self,
        index: usize,
        channel: Option<u8>,
    ) -> Result<(), PlaybackError> {
        self.check_track(index)?;
        if let Some(channel) = channel.filter(|c| !(1..=16).contains(c)) {
            return Err(PlaybackError::InvalidChannel(channel));
        }
        self.with_paused(|session| {
            match channel {
                Some(channel) => session.state.channel_overrides.insert(index, channel),
                None => session.state.channel_overrides.remove(&index),
            };
            if session.state.active_track == index {
                session.observer.on_channel_update(session.assigned_channel(index));
            }
        })
    }

    /// Output channel currently used for track `index`.
    pub fn assigned_channel(&self, index: usize) -> u8 {
        self.state
            .channel_overrides
            .get(&index)
            .copied()
            .or_else(|| self.track_infos().get(index).map(|i| i.channel))
            .unwrap_or(1)
    }

    fn check_track(&self, index: usize) -> Result<(), PlaybackError> {
        let count = self
            .loaded
            .as_ref()
            .ok_or(PlaybackError::NoSongLoaded)?
            .infos
            .len();
        if index >= count {
            return Err(PlaybackError::InvalidTrackIndex { index, count });
        }
        Ok(())
    }

    /// Apply `change` with playback paused, then pick up where it left off.
    fn with_paused(&mut self, change: impl FnOnce(&mut Self)) -> Result<(), PlaybackError> {
        self.reap();
        let was_playing = self.state.status == PlaybackStatus::Playing;
        if was_playing {
            self.pause()?;
        }
        change(self);
        if was_playing && self.state.status == PlaybackStatus::Paused {
            self.resume()?;
        }
        Ok(())
    }

    fn notify_track(&self, index: usize) {
        if let Some(info) = self.track_infos().get(index) {
            self.observer.on_instrument_update(info.instrument_name());
            self.observer.on_channel_update(self.assigned_channel(index));
            self.observer.on_track_type_update(info.kind());
        }
    }

    /// Programs to replay when starting at timeline index `index`: every
    /// channel the song ever programs, at its latest value before `index`,
    /// falling back to its song-wide value.
    fn restore_programs(&self, loaded: &LoadedSong, index: usize) -> Vec<(u8, u8)> {
        if !self.config.replay_instruments || index == 0 {
            return Vec::new();
        }
        let mut latest = [None; 16];
        for event in &loaded.timeline.events()[..index] {
            if let Some(program) = event.program() {
                latest[usize::from(event.channel() - 1)] = Some(program);
            }
        }
        loaded
            .instruments
            .iter()
            .map(|(channel, program)| {
                (channel, latest[usize::from(channel - 1)].unwrap_or(program))
            })
            .collect()
    }

    fn start(&mut self, from_tick: u64, start_index: usize) -> Result<(), PlaybackError> {
        let loaded = self.loaded.clone().ok_or(PlaybackError::NoSongLoaded)?;
        self.halt();

        self.state.finished_elapsed = None;
        let resumed_at = Instant::now();
        let run = PlaybackRun {
            from_tick,
            start_index,
            restore: self.restore_programs(&loaded, start_index),
            active_track: self.state.active_track,
            channel_override: self
                .state
                .channel_overrides
                .get(&self.state.active_track)
                .copied(),
            base_elapsed: self.state.elapsed,
            resumed_at,
        };

        let (stop, stop_rx) = bounded(1);
        let progress = Arc::new(Progress::new(from_tick));
        let handle = {
            let progress = Arc::clone(&progress);
            let sink = Arc::clone(&self.sink);
            let observer = Arc::clone(&self.observer);
            let config = self.config.clone();
            thread::Builder::new()
                .name("smf-playback".into())
                .spawn(move || {
                    play_timeline(
                        &loaded.timeline,
                        run,
                        sink.as_ref(),
                        observer.as_ref(),
                        &config,
                        &stop_rx,
                        &progress,
                    )
                })
                .map_err(|err| PlaybackError::Spawn(err.to_string()))?
        };

        self.worker = Some(Worker {
            stop,
            handle,
            progress,
        });
        self.state.status = PlaybackStatus::Playing;
        self.state.current_tick = from_tick;
        self.state.resume_tick = from_tick;
        self.state.last_resume = Some(resumed_at);
        info!("Playing from tick {from_tick}");
        Ok(())
    }

    /// Signal the playback thread to stop and wait for it.
    fn halt(&mut self) -> Option<RunOutcome> {
        let Worker { stop, handle, .. } = self.worker.take()?;
        drop(stop);
        match handle.join() {
            Ok(outcome) => Some(outcome),
            Err(_) => {
                warn!("Playback thread panicked");
                None
            }
        }
    }

    /// Collect a thread that finished on its own.
    fn reap(&mut self) {
        if self.worker.as_ref().is_some_and(|w| w.handle.is_finished())
            && let Some(outcome) = self.halt()
        {
            self.apply_outcome(outcome);
        }
    }

    fn apply_outcome(&mut self, outcome: RunOutcome) {
        if let Some(elapsed) = outcome.final_elapsed {
            self.state.status = PlaybackStatus::Stopped;
            self.state.current_tick = outcome.current_tick;
            self.state.resume_tick = 0;
            self.state.resume_index = 0;
            self.state.elapsed = Duration::ZERO;
            self.state.finished_elapsed = Some(elapsed);
            self.state.last_resume = None;
            info!("Playback complete at tick {}", outcome.current_tick);
        } else {
            self.state.current_tick = outcome.current_tick;
            self.state.resume_tick = outcome.current_tick;
            self.state.resume_index = outcome.next_index;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.halt();
    }
}
