//! Weekly occupancy schedules

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Occupied window for one weekday
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub enabled: bool,
    /// Start of the occupied window, "HH:MM" (inclusive)
    pub start: String,
    /// End of the occupied window, "HH:MM" (exclusive)
    pub end: String,
}

impl DaySchedule {
    pub fn new(enabled: bool, start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            enabled,
            start: start.into(),
            end: end.into(),
        }
    }
}

/// Weekly schedule keyed by weekday index (0 = Monday ... 6 = Sunday)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub days: BTreeMap<u8, DaySchedule>,
}

impl Schedule {
    /// Create a schedule with no days configured (never occupied)
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            days: BTreeMap::new(),
        }
    }

    /// Create a schedule with the same enabled window on all seven days
    pub fn every_day(
        id: impl Into<String>,
        name: impl Into<String>,
        start: &str,
        end: &str,
    ) -> Self {
        let days = (0..7)
            .map(|day| (day, DaySchedule::new(true, start, end)))
            .collect();
        Self {
            id: id.into(),
            name: name.into(),
            days,
        }
    }

    /// Set the window for a weekday index
    pub fn with_day(mut self, weekday: u8, day: DaySchedule) -> Self {
        self.days.insert(weekday, day);
        self
    }

    /// Entry for a weekday index, if configured
    pub fn day(&self, weekday: u8) -> Option<&DaySchedule> {
        self.days.get(&weekday)
    }
}
