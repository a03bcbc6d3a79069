//! Domain model: weekdays, time ranges, and course records.
//!
//! Everything here is plain data. [`Course`] is constructed once by the
//! course parser and never mutated afterwards; the calendar builder only
//! reads it.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A weekday, with an English and a French header spelling.
///
/// Schedule tables come out of a bilingual student portal, so each day
/// column may be labelled in either language. [`Day::from_name`] accepts
/// both, case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Day {
    /// All days, in weekday-index order (Monday first).
    pub const ALL: [Day; 7] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
        Day::Sunday,
    ];

    /// English header spelling, upper case.
    pub fn english(self) -> &'static str {
        match self {
            Day::Monday => "MONDAY",
            Day::Tuesday => "TUESDAY",
            Day::Wednesday => "WEDNESDAY",
            Day::Thursday => "THURSDAY",
            Day::Friday => "FRIDAY",
            Day::Saturday => "SATURDAY",
            Day::Sunday => "SUNDAY",
        }
    }

    /// French header spelling, upper case.
    pub fn french(self) -> &'static str {
        match self {
            Day::Monday => "LUNDI",
            Day::Tuesday => "MARDI",
            Day::Wednesday => "MERCREDI",
            Day::Thursday => "JEUDI",
            Day::Friday => "VENDREDI",
            Day::Saturday => "SAMEDI",
            Day::Sunday => "DIMANCHE",
        }
    }

    /// Match a header cell text against both spellings, case-insensitively.
    pub fn from_name(name: &str) -> Option<Day> {
        let upper = name.trim().to_uppercase();
        Day::ALL
            .iter()
            .copied()
            .find(|d| d.english() == upper || d.french() == upper)
    }

    /// Weekday index with Monday = 0 … Sunday = 6.
    pub fn weekday_index(self) -> u32 {
        match self {
            Day::Monday => 0,
            Day::Tuesday => 1,
            Day::Wednesday => 2,
            Day::Thursday => 3,
            Day::Friday => 4,
            Day::Saturday => 5,
            Day::Sunday => 6,
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.english())
    }
}

/// A `start..end` time slot within one day. Invariant: `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    /// Build a range, rejecting empty and inverted slots.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Option<TimeRange> {
        if start < end {
            Some(TimeRange { start, end })
        } else {
            None
        }
    }

    /// Parse a normalised `HH:MM-HH:MM` string.
    ///
    /// Only the canonical shape produced by time normalisation is accepted
    /// here; free-form cell text goes through
    /// [`crate::pipeline::extract::normalize_time_text`] first.
    pub fn parse(s: &str) -> Option<TimeRange> {
        let (start, end) = s.split_once('-')?;
        let start = NaiveTime::parse_from_str(start, "%H:%M").ok()?;
        let end = NaiveTime::parse_from_str(end, "%H:%M").ok()?;
        TimeRange::new(start, end)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

/// One parsed course occurrence: a weekly slot in the schedule grid.
///
/// Immutable once built; the calendar builder derives one recurring event
/// from each record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    /// Course title as printed in the cell, e.g. "Intro to CS".
    pub name: String,
    /// Course identifier, e.g. "CS101". May be empty when the cell omits it.
    pub course_id: String,
    /// Activity type from the bilingual vocabulary (Lecture, Lab, TD, …).
    pub activity_type: String,
    /// Section label, e.g. "Sec1".
    pub section: String,
    /// Building and room, e.g. "Bldg-A 101".
    pub location: String,
    /// Day column the cell belongs to.
    pub day: Day,
    /// The slot taken from the time column at the cell's row.
    pub time_range: TimeRange,
}
