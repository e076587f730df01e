//! Pure schedule predicate for scheduled workflows.
//!
//! The cadence lives outside this core: an external scheduler calls
//! `is_due` (via the engine) with its own notion of `now`. Nothing here
//! reads the wall clock.

use chrono::Timelike;

use loci_core::types::{Schedule, Timestamp};

/// Whether a scheduled workflow is due at `now`, given its last run.
///
/// - `Interval`: due when at least `minutes` have elapsed since the last
///   run (a never-run workflow is due immediately).
/// - `Daily`: due once the day's `hour:minute` has passed, at most once
///   per day.
pub fn is_due(schedule: &Schedule, last_run: Option<Timestamp>, now: Timestamp) -> bool {
    match schedule {
        Schedule::Interval { minutes } => match last_run {
            None => true,
            Some(last) => now.0 - last.0 >= *minutes as i64 * 60,
        },
        Schedule::Daily { hour, minute } => {
            let now_dt = now.to_datetime();
            let today_fire = now_dt
                .date_naive()
                .and_hms_opt(*hour as u32, *minute as u32, 0)
                .map(|naive| Timestamp(naive.and_utc().timestamp()));
            let Some(fire_at) = today_fire else {
                return false;
            };
            if now.0 < fire_at.0 {
                return false;
            }
            match last_run {
                None => true,
                Some(last) => last.0 < fire_at.0,
            }
        }
    }
}

/// Convenience: seconds until the next whole minute, used by external
/// schedulers that poll on a minute cadence.
pub fn seconds_to_next_minute(now: Timestamp) -> i64 {
    60 - now.to_datetime().second() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> Timestamp {
        Timestamp(
            Utc.with_ymd_and_hms(y, mo, d, h, mi, 0)
                .single()
                .unwrap()
                .timestamp(),
        )
    }

    #[test]
    fn test_interval_never_run_is_due() {
        let schedule = Schedule::Interval { minutes: 30 };
        assert!(is_due(&schedule, None, ts(2026, 3, 1, 12, 0)));
    }

    #[test]
    fn test_interval_due_exactly_at_elapsed() {
        let schedule = Schedule::Interval { minutes: 30 };
        let last = ts(2026, 3, 1, 12, 0);
        assert!(!is_due(&schedule, Some(last), ts(2026, 3, 1, 12, 29)));
        assert!(is_due(&schedule, Some(last), ts(2026, 3, 1, 12, 30)));
        assert!(is_due(&schedule, Some(last), ts(2026, 3, 1, 13, 0)));
    }

    #[test]
    fn test_daily_not_due_before_fire_time() {
        let schedule = Schedule::Daily { hour: 9, minute: 0 };
        assert!(!is_due(&schedule, None, ts(2026, 3, 1, 8, 59)));
        assert!(is_due(&schedule, None, ts(2026, 3, 1, 9, 0)));
    }

    #[test]
    fn test_daily_fires_once_per_day() {
        let schedule = Schedule::Daily { hour: 9, minute: 0 };
        let fired = ts(2026, 3, 1, 9, 1);
        // Already ran after today's fire time: not due again today.
        assert!(!is_due(&schedule, Some(fired), ts(2026, 3, 1, 15, 0)));
        // Next day it is due again.
        assert!(is_due(&schedule, Some(fired), ts(2026, 3, 2, 9, 0)));
    }

    #[test]
    fn test_daily_catches_up_after_missed_tick() {
        let schedule = Schedule::Daily { hour: 9, minute: 0 };
        let yesterday = ts(2026, 2, 28, 9, 0);
        // The scheduler was down at 09:00; an afternoon tick still fires.
        assert!(is_due(&schedule, Some(yesterday), ts(2026, 3, 1, 16, 30)));
    }

    #[test]
    fn test_seconds_to_next_minute() {
        let now = Timestamp(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 45)
                .single()
                .unwrap()
                .timestamp(),
        );
        assert_eq!(seconds_to_next_minute(now), 15);
    }
}
