#![allow(dead_code)]

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use smf_player::midi::cursor::encode_vlq;
use smf_player::{EventSink, PlaybackObserver, SinkError, TrackKind};

/// Builds one `MTrk` body from absolute-tick events.
#[derive(Default)]
pub struct TrackBuilder {
    bytes: Vec<u8>,
    last_tick: u64,
}

impl TrackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event(mut self, tick: u64, message: &[u8]) -> Self {
        self.bytes.extend(encode_vlq(tick - self.last_tick));
        self.bytes.extend_from_slice(message);
        self.last_tick = tick;
        self
    }

    pub fn meta(self, tick: u64, meta_type: u8, data: &[u8]) -> Self {
        let mut message = vec![0xFF, meta_type];
        message.extend(encode_vlq(data.len() as u64));
        message.extend_from_slice(data);
        self.event(tick, &message)
    }

    pub fn tempo(self, tick: u64, micros_per_quarter: u32) -> Self {
        self.meta(tick, 0x51, &micros_per_quarter.to_be_bytes()[1..])
    }

    pub fn name(self, tick: u64, name: &str) -> Self {
        self.meta(tick, 0x03, name.as_bytes())
    }

    pub fn end(self, tick: u64) -> Vec<u8> {
        self.meta(tick, 0x2F, &[]).bytes
    }
}

pub fn smf(format: u16, ticks_per_quarter: u16, tracks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&format.to_be_bytes());
    out.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    out.extend_from_slice(&ticks_per_quarter.to_be_bytes());
    for body in tracks {
        out.extend_from_slice(b"MTrk");
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(body);
    }
    out
}

/// Sink that timestamps every message. Clones share one log.
#[derive(Clone)]
pub struct RecordingSink {
    tx: Sender<(Instant, Vec<u8>)>,
}

pub struct SinkLog {
    rx: Receiver<(Instant, Vec<u8>)>,
    seen: Mutex<Vec<(Instant, Vec<u8>)>>,
}

pub fn recording_sink() -> (RecordingSink, SinkLog) {
    let (tx, rx) = unbounded();
    (
        RecordingSink { tx },
        SinkLog {
            rx,
            seen: Mutex::new(Vec::new()),
        },
    )
}

impl EventSink for RecordingSink {
    fn emit(&self, message: &[u8]) -> Result<(), SinkError> {
        self.tx
            .send((Instant::now(), message.to_vec()))
            .map_err(|e| SinkError(e.to_string()))
    }
}

impl SinkLog {
    pub fn timed(&self) -> Vec<(Instant, Vec<u8>)> {
        let mut seen = self.seen.lock().unwrap();
        seen.extend(self.rx.try_iter());
        seen.clone()
    }

    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.timed().into_iter().map(|(_, m)| m).collect()
    }

    /// Block until at least `count` messages arrived or `timeout` passed.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        loop {
            let messages = self.messages();
            if messages.len() >= count || Instant::now() >= deadline {
                return messages;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Time(u64),
    Instrument(String),
    Channel(u8),
    TrackType(TrackKind),
    Complete,
}

pub struct RecordingObserver {
    tx: Sender<Update>,
}

pub fn recording_observer() -> (RecordingObserver, Receiver<Update>) {
    let (tx, rx) = unbounded();
    (RecordingObserver { tx }, rx)
}

impl PlaybackObserver for RecordingObserver {
    fn on_time_update(&self, elapsed_millis: u64) {
        let _ = self.tx.send(Update::Time(elapsed_millis));
    }

    fn on_instrument_update(&self, name: &str) {
        let _ = self.tx.send(Update::Instrument(name.to_string()));
    }

    fn on_channel_update(&self, channel: u8) {
        let _ = self.tx.send(Update::Channel(channel));
    }

    fn on_track_type_update(&self, kind: TrackKind) {
        let _ = self.tx.send(Update::TrackType(kind));
    }

    fn on_playback_complete(&self) {
        let _ = self.tx.send(Update::Complete);
    }
}

/// Drain updates until playback completes, returning everything seen.
pub fn wait_for_completion(updates: &Receiver<Update>, timeout: Duration) -> Option<Vec<Update>> {
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match updates.recv_timeout(remaining) {
            Ok(Update::Complete) => {
                seen.push(Update::Complete);
                return Some(seen);
            }
            Ok(update) => seen.push(update),
            Err(_) => return None,
        }
    }
}
