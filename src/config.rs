use std::time::Duration;

/// Tuning knobs for a playback session.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Lateness the scheduler tolerates before it stops trying to catch up.
    /// Anything beyond this is dropped rather than played as a burst.
    pub max_drift: Duration,
    /// Wait after a resume or seek before Program Changes are replayed.
    pub restore_grace: Duration,
    /// Replay Program Changes skipped by a seek when playback restarts.
    pub replay_instruments: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            max_drift: Duration::from_millis(10),
            restore_grace: Duration::from_millis(10),
            replay_instruments: true,
        }
    }
}
