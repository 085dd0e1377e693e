//! "Who is on duty now": evaluates duty-shift wall-clock windows against
//! the current process time. No scheduler maintains "current shift"
//! state — it's recomputed fresh on every dispatch.

use chrono::Timelike;

use crate::storage::model::DutyScheduleEntry;

/// Returns the user ids whose shift window contains `minute_of_day`
/// (minutes since midnight, process timezone). Windows may wrap past
/// midnight (`start > end`, e.g. a night shift 22:00-06:00).
#[must_use]
pub fn on_duty_users(schedule: &[DutyScheduleEntry], minute_of_day: u32) -> Vec<String> {
    schedule
        .iter()
        .filter(|entry| in_window(minute_of_day, entry.start_minute, entry.end_minute))
        .map(|entry| entry.user_id.clone())
        .collect()
}

/// Convenience wrapper for callers holding a `chrono::DateTime` in local
/// time rather than a raw minute-of-day value.
#[must_use]
pub fn minute_of_day<Tz: chrono::TimeZone>(now: chrono::DateTime<Tz>) -> u32 {
    now.hour() * 60 + now.minute()
}

fn in_window(minute: u32, start: u32, end: u32) -> bool {
    if start <= end {
        minute >= start && minute < end
    } else {
        minute >= start || minute < end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::model::DutyShift;

    fn entry(user: &str, shift: DutyShift, start: u32, end: u32) -> DutyScheduleEntry {
        DutyScheduleEntry { user_id: user.to_string(), shift, start_minute: start, end_minute: end }
    }

    #[test]
    fn day_shift_window() {
        let schedule = vec![entry("alice", DutyShift::Day, 8 * 60, 20 * 60)];
        assert_eq!(on_duty_users(&schedule, 9 * 60), vec!["alice".to_string()]);
        assert!(on_duty_users(&schedule, 21 * 60).is_empty());
    }

    #[test]
    fn night_shift_wraps_midnight() {
        let schedule = vec![entry("bob", DutyShift::Night, 22 * 60, 6 * 60)];
        assert_eq!(on_duty_users(&schedule, 23 * 60), vec!["bob".to_string()]);
        assert_eq!(on_duty_users(&schedule, 2 * 60), vec!["bob".to_string()]);
        assert!(on_duty_users(&schedule, 12 * 60).is_empty());
    }
}
