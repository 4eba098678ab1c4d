//! Occupancy schedule evaluation
//!
//! Occupancy is re-derived from scratch every tick: a day entry that is
//! missing, disabled or malformed simply means "unoccupied" for that tick.

use std::collections::BTreeMap;

use bas_types::Schedule;
use chrono::{Datelike, Timelike};

/// Errors raised while reading a schedule entry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("Malformed time of day: {0:?}")]
    MalformedTime(String),
}

/// Parse "H:M" into minutes since midnight.
///
/// Either field may be one or two digits and may carry surrounding
/// whitespace, so "8:5" is 08:05. Hours run 0-24 so "24:00" can close a
/// window at midnight.
pub fn parse_hhmm(value: &str) -> Result<u32, ScheduleError> {
    let malformed = || ScheduleError::MalformedTime(value.to_string());
    let field = |part: &str| -> Result<u32, ScheduleError> {
        let part = part.trim();
        if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        part.parse().map_err(|_| malformed())
    };

    let (hours, minutes) = value.split_once(':').ok_or_else(malformed)?;
    let hours = field(hours)?;
    let minutes = field(minutes)?;
    if hours > 24 || minutes > 59 {
        return Err(malformed());
    }

    Ok(hours * 60 + minutes)
}

/// Whether `schedule` marks the site occupied at `now`.
///
/// The window is start-inclusive, end-exclusive.
pub fn is_occupied<T: Datelike + Timelike>(schedule: &Schedule, now: &T) -> bool {
    let weekday = now.weekday().num_days_from_monday() as u8;
    let Some(day) = schedule.day(weekday) else {
        return false;
    };
    if !day.enabled {
        return false;
    }

    let window = parse_hhmm(&day.start).and_then(|start| Ok((start, parse_hhmm(&day.end)?)));
    match window {
        Ok((start, end)) => {
            let now_minutes = now.hour() * 60 + now.minute();
            start <= now_minutes && now_minutes < end
        }
        Err(e) => {
            tracing::debug!(schedule_id = %schedule.id, weekday, error = %e, "Ignoring schedule entry");
            false
        }
    }
}

/// Evaluate the occupancy schedule named `schedule_id`; a missing schedule
/// means unoccupied.
pub fn evaluate<T: Datelike + Timelike>(
    schedules: &BTreeMap<String, Schedule>,
    schedule_id: &str,
    now: &T,
) -> bool {
    schedules
        .get(schedule_id)
        .map(|schedule| is_occupied(schedule, now))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bas_types::DaySchedule;
    use chrono::NaiveDate;

    // 2024-03-04 is a Monday
    fn monday_at(hour: u32, minute: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn office() -> Schedule {
        Schedule::every_day("sch_default", "Standard Office", "08:00", "18:00")
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("08:00"), Ok(480));
        assert_eq!(parse_hhmm("8:30"), Ok(510));
        assert_eq!(parse_hhmm("24:00"), Ok(1440));

        assert_eq!(parse_hhmm("8:5"), Ok(485));
        assert_eq!(parse_hhmm(" 8:00"), Ok(480));
        assert_eq!(parse_hhmm("08: 30 "), Ok(510));

        for bad in ["", "0800", "8", "ab:cd", "+8:00", "25:00", "08:60", "08:00:00", ":30", "008:00"] {
            assert!(parse_hhmm(bad).is_err(), "{:?} should not parse", bad);
        }
    }

    #[test]
    fn test_window_is_start_inclusive_end_exclusive() {
        let schedule = office();

        assert!(!is_occupied(&schedule, &monday_at(7, 59)));
        assert!(is_occupied(&schedule, &monday_at(8, 0)));
        assert!(is_occupied(&schedule, &monday_at(17, 59)));
        assert!(!is_occupied(&schedule, &monday_at(18, 0)));
    }

    #[test]
    fn test_disabled_or_missing_day_is_unoccupied() {
        let disabled = Schedule::new("s", "Closed Monday")
            .with_day(0, DaySchedule::new(false, "00:00", "24:00"));
        assert!(!is_occupied(&disabled, &monday_at(12, 0)));

        let tuesday_only = Schedule::new("s", "Tuesday")
            .with_day(1, DaySchedule::new(true, "00:00", "24:00"));
        assert!(!is_occupied(&tuesday_only, &monday_at(12, 0)));
    }

    #[test]
    fn test_single_digit_minutes_open_the_window() {
        let schedule = Schedule::new("s", "Late Start")
            .with_day(0, DaySchedule::new(true, "8:5", "18:00"));

        assert!(!is_occupied(&schedule, &monday_at(8, 4)));
        assert!(is_occupied(&schedule, &monday_at(8, 5)));
    }

    #[test]
    fn test_malformed_time_is_unoccupied() {
        let schedule = Schedule::new("s", "Broken")
            .with_day(0, DaySchedule::new(true, "8am", "18:00"));
        assert!(!is_occupied(&schedule, &monday_at(12, 0)));

        let schedule = Schedule::new("s", "Broken")
            .with_day(0, DaySchedule::new(true, "08:00", "six"));
        assert!(!is_occupied(&schedule, &monday_at(12, 0)));
    }

    #[test]
    fn test_exhaustive_minutes_against_window() {
        let schedule = Schedule::new("s", "Lunch")
            .with_day(0, DaySchedule::new(true, "11:45", "13:15"));
        let (start, end) = (11 * 60 + 45, 13 * 60 + 15);

        for minute in 0..(24 * 60) {
            let now = monday_at(minute / 60, minute % 60);
            assert_eq!(
                is_occupied(&schedule, &now),
                start <= minute && minute < end,
                "minute {}",
                minute
            );
        }
    }

    #[test]
    fn test_evaluate_missing_schedule() {
        let mut schedules = BTreeMap::new();
        schedules.insert("sch_default".to_string(), office());

        assert!(evaluate(&schedules, "sch_default", &monday_at(9, 0)));
        assert!(!evaluate(&schedules, "sch_other", &monday_at(9, 0)));
    }
}
