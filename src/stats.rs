//! Running detection statistics.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Mutable counters for one detection session.
///
/// Invariants: `fire_detected_frames <= total_frames` and
/// `alerts_sent == fire_detected_frames`. Every positive frame raises one alert;
/// there is no cooldown.
#[derive(Clone, Debug, Default)]
pub struct StatsAggregate {
    total_frames: u64,
    fire_detected_frames: u64,
    alerts_sent: u64,
    last_detection: Option<DateTime<Utc>>,
}

/// Immutable copy of a `StatsAggregate`, safe to hand to concurrent readers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub total_frames: u64,
    pub fire_detected_frames: u64,
    pub alerts_sent: u64,
    pub last_detection: Option<DateTime<Utc>>,
}

impl StatsAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one processed frame.
    pub fn record(&mut self, detected: bool) {
        self.record_at(detected, Utc::now());
    }

    /// Account for one processed frame, stamping positives with `when`.
    pub fn record_at(&mut self, detected: bool, when: DateTime<Utc>) {
        self.total_frames += 1;
        if detected {
            self.fire_detected_frames += 1;
            self.alerts_sent += 1;
            self.last_detection = Some(when);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_frames: self.total_frames,
            fire_detected_frames: self.fire_detected_frames,
            alerts_sent: self.alerts_sent,
            last_detection: self.last_detection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn counts_frames_and_positives() {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let pattern = [false, true, false, true, true, false, false];
        let mut stats = StatsAggregate::new();

        for (i, detected) in pattern.iter().enumerate() {
            stats.record_at(*detected, base + Duration::seconds(i as i64));
        }

        let snap = stats.snapshot();
        assert_eq!(snap.total_frames, 7);
        assert_eq!(snap.fire_detected_frames, 3);
        assert_eq!(snap.alerts_sent, 3);
        assert_eq!(snap.last_detection, Some(base + Duration::seconds(4)));
    }

    #[test]
    fn fresh_aggregate_is_zeroed() {
        let snap = StatsAggregate::new().snapshot();
        assert_eq!(snap, StatsSnapshot::default());
        assert!(snap.last_detection.is_none());
    }

    #[test]
    fn snapshot_is_detached_from_later_updates() {
        let mut stats = StatsAggregate::new();
        stats.record(true);
        let before = stats.snapshot();
        stats.record(false);

        assert_eq!(before.total_frames, 1);
        assert_eq!(stats.snapshot().total_frames, 2);
        assert!(stats.snapshot().fire_detected_frames <= stats.snapshot().total_frames);
    }
}
