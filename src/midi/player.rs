use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use log::{debug, warn};
use thousands::Separable;

use crate::config::PlayerConfig;
use crate::midi::timeline::{Timeline, TimelineEvent};
use crate::midi::utils::{stop_requested, wait_interruptible};
use crate::sink::{EventSink, PlaybackObserver};

/// Where a playback run starts and what it carries over from the session.
#[derive(Debug, Clone)]
pub struct PlaybackRun {
    pub from_tick: u64,
    /// First timeline event to play. Events before it are never emitted.
    pub start_index: usize,
    /// `(channel, program)` pairs to replay after the grace delay. A channel
    /// that receives a Program Change before then is left out.
    pub restore: Vec<(u8, u8)>,
    /// Track whose messages follow `channel_override`.
    pub active_track: usize,
    pub channel_override: Option<u8>,
    /// Elapsed play time accumulated before this run.
    pub base_elapsed: Duration,
    pub resumed_at: Instant,
}

impl PlaybackRun {
    fn elapsed(&self) -> Duration {
        self.base_elapsed + self.resumed_at.elapsed()
    }

    fn route<'a>(&self, event: &'a TimelineEvent) -> Cow<'a, [u8]> {
        match self.channel_override {
            Some(channel)
                if event.track == self.active_track && channel != event.source_channel =>
            {
                Cow::Owned(event.routed_to(channel))
            }
            _ => Cow::Borrowed(event.message.as_slice()),
        }
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn saturating_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// How a run ended. Returned when the playback thread is joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Tick of the last emitted event, or the song end once completed.
    pub current_tick: u64,
    /// First event not yet emitted.
    pub next_index: usize,
    pub completed: bool,
    /// Total elapsed play time, set once the song finished.
    pub final_elapsed: Option<Duration>,
    pub emitted: u64,
    pub dropped: u64,
}

/// Position shared with the session while a run is live.
#[derive(Debug, Default)]
pub struct Progress {
    current_tick: AtomicU64,
    completed: AtomicBool,
    final_elapsed_micros: AtomicU64,
}

impl Progress {
    pub fn new(tick: u64) -> Self {
        Progress {
            current_tick: AtomicU64::new(tick),
            ..Default::default()
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick.load(Ordering::Acquire)
    }

    /// Elapsed play time at the moment the song finished, once it has.
    pub fn completed_elapsed(&self) -> Option<Duration> {
        self.completed
            .load(Ordering::Acquire)
            .then(|| Duration::from_micros(self.final_elapsed_micros.load(Ordering::Acquire)))
    }

    fn complete(&self, tick: u64, elapsed: Duration) {
        self.current_tick.store(tick, Ordering::Release);
        self.final_elapsed_micros
            .store(saturating_micros(elapsed), Ordering::Release);
        self.completed.store(true, Ordering::Release);
    }
}

/// Absolute deadlines for consecutive events.
///
/// Each delay is added to the previous deadline rather than to "now", so time
/// spent emitting does not accumulate. When the loop falls more than
/// `max_drift` behind, the deadline is pulled forward instead of replaying
/// the backlog as a burst.
#[derive(Debug, Clone)]
pub struct DriftClock {
    next_due: Instant,
    max_drift: Duration,
}

impl DriftClock {
    pub fn new(max_drift: Duration) -> Self {
        DriftClock {
            next_due: Instant::now(),
            max_drift,
        }
    }

    pub fn anchor(&self) -> Instant {
        self.next_due
    }

    /// Advance by `delay` and return when the next event is due.
    pub fn schedule(&mut self, delay: Duration) -> Instant {
        self.next_due += delay;
        let now = Instant::now();
        if now.saturating_duration_since(self.next_due) > self.max_drift {
            self.next_due = now.checked_sub(self.max_drift).unwrap_or(now);
        }
        self.next_due
    }
}

fn wait_until(stop: &Receiver<()>, due: Instant) -> bool {
    wait_interruptible(stop, due.saturating_duration_since(Instant::now()))
}

fn emit(sink: &dyn EventSink, message: &[u8], outcome: &mut RunOutcome) {
    match sink.emit(message) {
        Ok(()) => outcome.emitted += 1,
        Err(err) => {
            outcome.dropped += 1;
            warn!("Dropped message {message:02X?}: {err}");
        }
    }
}

fn emit_programs(sink: &dyn EventSink, programs: &[(u8, u8)], outcome: &mut RunOutcome) {
    for &(channel, program) in programs {
        emit(sink, &[0xC0 | ((channel - 1) & 0x0F), program & 0x7F], outcome);
    }
    debug!("Restored {} channel programs", programs.len());
}

/// Play `timeline` in real time from `run.from_tick` until it ends or a stop
/// request arrives on `stop`.
///
/// Runs on the playback thread. The stop channel is checked before every
/// wait and every emission, and every wait returns as soon as a stop
/// arrives.
pub fn play_timeline(
    timeline: &Timeline,
    mut run: PlaybackRun,
    sink: &dyn EventSink,
    observer: &dyn PlaybackObserver,
    config: &PlayerConfig,
    stop: &Receiver<()>,
    progress: &Progress,
) -> RunOutcome {
    let ticks_per_quarter = timeline.ticks_per_quarter();
    let mut tempo = timeline.tempo_map().cursor_at(run.from_tick);
    let mut clock = DriftClock::new(config.max_drift);
    let restore_at = clock.anchor() + config.restore_grace;
    let mut restore = Some(std::mem::take(&mut run.restore)).filter(|programs| !programs.is_empty());
    let mut previous_tick = run.from_tick;

    let mut outcome = RunOutcome {
        current_tick: run.from_tick,
        next_index: run.start_index,
        completed: false,
        final_elapsed: None,
        emitted: 0,
        dropped: 0,
    };

    let events = timeline.events().iter().enumerate().skip(run.start_index);
    for (index, event) in events {
        let micros = tempo.advance(previous_tick, event.tick, ticks_per_quarter);
        previous_tick = event.tick;
        let due = clock.schedule(Duration::from_micros(micros));

        if let Some(programs) = restore.take_if(|_| restore_at <= due) {
            if wait_until(stop, restore_at) {
                return outcome;
            }
            emit_programs(sink, &programs, &mut outcome);
        }

        if wait_until(stop, due) || stop_requested(stop) {
            return outcome;
        }

        outcome.current_tick = event.tick;
        progress.current_tick.store(event.tick, Ordering::Release);
        observer.on_time_update(saturating_millis(run.elapsed()));

        let message = run.route(event);
        emit(sink, &message, &mut outcome);
        outcome.next_index = index + 1;

        // The song's own program change wins over an older restored one
        if let Some(programs) = restore.as_mut()
            && let Some(&status) = message.first()
            && status & 0xF0 == 0xC0
        {
            let channel = (status & 0x0F) + 1;
            programs.retain(|&(restored, _)| restored != channel);
        }
    }

    if let Some(programs) = restore {
        if wait_until(stop, restore_at) {
            return outcome;
        }
        emit_programs(sink, &programs, &mut outcome);
    }

    // Trailing meta events still count toward the song length
    let end_tick = timeline.end_tick().max(previous_tick);
    let micros = tempo.advance(previous_tick, end_tick, ticks_per_quarter);
    let due = clock.schedule(Duration::from_micros(micros));
    if wait_until(stop, due) {
        return outcome;
    }

    outcome.current_tick = end_tick;
    outcome.completed = true;
    let elapsed = run.elapsed();
    outcome.final_elapsed = Some(elapsed);
    progress.complete(end_tick, elapsed);
    debug!(
        "Playback complete: {} messages sent, {} dropped",
        outcome.emitted.separate_with_commas(),
        outcome.dropped.separate_with_commas()
    );
    observer.on_time_update(saturating_millis(elapsed));
    observer.on_playback_complete();
    outcome
}
