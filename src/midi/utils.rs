use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

/// Check for a stop request without blocking. A dropped sender counts as one.
pub fn stop_requested(stop: &Receiver<()>) -> bool {
    !matches!(stop.try_recv(), Err(TryRecvError::Empty))
}

/// Sleep for `duration` unless a stop request arrives first.
///
/// Returns `true` when the wait was interrupted.
pub fn wait_interruptible(stop: &Receiver<()>, duration: Duration) -> bool {
    if duration.is_zero() {
        return stop_requested(stop);
    }
    !matches!(stop.recv_timeout(duration), Err(RecvTimeoutError::Timeout))
}

/// `HH:MM:SS`, rounded to the nearest second.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = (duration.as_millis() + 500) / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::time::Instant;

    #[test]
    fn formats_hours_minutes_seconds() {
        assert_eq!(format_duration(Duration::ZERO), "00:00:00");
        assert_eq!(format_duration(Duration::from_millis(1499)), "00:00:01");
        assert_eq!(format_duration(Duration::from_millis(1500)), "00:00:02");
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 25 * 60 + 7)), "03:25:07");
    }

    #[test]
    fn wait_runs_to_completion_without_stop() {
        let (_tx, rx) = bounded::<()>(1);
        let start = Instant::now();
        assert!(!wait_interruptible(&rx, Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(!wait_interruptible(&rx, Duration::ZERO));
    }

    #[test]
    fn stop_interrupts_wait() {
        let (tx, rx) = bounded::<()>(1);
        tx.send(()).unwrap();
        let start = Instant::now();
        assert!(wait_interruptible(&rx, Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));

        drop(tx);
        assert!(stop_requested(&rx));
    }
}
