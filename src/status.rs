use std::time::Instant;

use serde::Serialize;

/// Externally visible progress of the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub remaining_seconds: u64,
    pub iterations: u64,
}

/// Builds the snapshot for a run ending at `ends_at` as seen at `now`.
///
/// A run whose deadline has passed reports `running == false` even if the
/// caller still has it marked as running; remaining time is whole seconds,
/// truncated, and zero whenever the run is not running.
pub fn snapshot(running: bool, ends_at: Instant, iterations: u64, now: Instant) -> StatusSnapshot {
    let running = running && now < ends_at;
    let remaining_seconds = if running {
        ends_at.saturating_duration_since(now).as_secs()
    } else {
        0
    };
    StatusSnapshot {
        running,
        remaining_seconds,
        iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn reports_remaining_whole_seconds() {
        let now = Instant::now();
        let status = snapshot(true, now + Duration::from_millis(4_700), 12, now);
        assert_eq!(
            status,
            StatusSnapshot {
                running: true,
                remaining_seconds: 4,
                iterations: 12,
            }
        );
    }

    #[test]
    fn deadline_reached_means_not_running() {
        let now = Instant::now();
        let status = snapshot(true, now, 7, now);
        assert!(!status.running);
        assert_eq!(status.remaining_seconds, 0);
        assert_eq!(status.iterations, 7);
    }

    #[test]
    fn stopped_run_has_no_remaining_time() {
        let now = Instant::now();
        let status = snapshot(false, now + Duration::from_secs(30), 3, now);
        assert!(!status.running);
        assert_eq!(status.remaining_seconds, 0);
    }

    #[test]
    fn serializes_with_wire_names() {
        let json = serde_json::to_value(StatusSnapshot {
            running: true,
            remaining_seconds: 9,
            iterations: 100,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"running": true, "remaining_seconds": 9, "iterations": 100})
        );
    }
}
