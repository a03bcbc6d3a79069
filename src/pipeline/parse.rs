//! Course parsing: classified cell text → structured course records.
//!
//! An ordered set of pattern rules runs against each course cell, first
//! match wins:
//!
//! 1. **Labelled** — the portal's explicit wire format
//!    (`Name ID: … Activity: … Section: … Campus: … Room: …`); any subset
//!    of the labels may be present, but at least one must be, otherwise
//!    the rule abstains and the positional rule gets its turn.
//! 2. **Positional** — `Name COURSE-ID activity section location`, with
//!    the activity token matched against the bilingual controlled
//!    vocabulary.
//!
//! A cell matching neither rule is dropped with a warning — expected,
//! recoverable, and never an exception. Cells arrive here only with a
//! valid day and time slot already attached; the parser's last job is the
//! `(day, start)` collision check, where the first cell in reading order
//! wins and the collision is logged.

use crate::error::CellFailure;
use crate::geometry::CellKind;
use crate::pipeline::extract::CellRecord;
use crate::schedule::{Course, Day, TimeRange};
use chrono::NaiveTime;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Output of the parsing stage.
#[derive(Debug)]
pub struct ParseOutcome {
    /// Parsed records, in table reading order.
    pub courses: Vec<Course>,
    pub warnings: Vec<CellFailure>,
    /// Course cells that produced no record (unmatched, missing slot, or
    /// collided).
    pub dropped: usize,
}

static RE_LABELED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)^
          (?P<name>.+?)
          (?:\s+ID:\s*(?P<id>.+?))?
          (?:\s+Activity:\s*(?P<activity>.+?))?
          (?:\s+Section:\s*(?P<section>.+?))?
          (?:\s+Campus:\s*(?P<campus>.+?))?
          (?:\s+Room:\s*(?P<room>.+?))?
        $",
    )
    .expect("labelled course rule must compile")
});

/// Bilingual activity vocabulary for the positional rule.
const ACTIVITY_VOCABULARY: &str =
    "LECTURE|LAB|TUTORIAL|SEMINAR|EXAM|COURS|TP|TD|SEMINAIRE|EXAMEN";

static RE_POSITIONAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?ix)^
          (?P<name>.+?)\s+
          (?P<id>[A-Z]{{2,4}}\s?\d{{2,4}})\s+
          (?P<activity>{ACTIVITY_VOCABULARY})\s+
          (?P<section>\S+)\s+
          (?P<location>.+)
        $"
    ))
    .expect("positional course rule must compile")
});

/// Parse every course cell that carries a day and a valid time slot.
pub fn parse_courses(cells: &[CellRecord]) -> ParseOutcome {
    let mut courses: Vec<Course> = Vec::new();
    let mut warnings: Vec<CellFailure> = Vec::new();
    let mut dropped = 0usize;
    let mut occupied: HashSet<(Day, NaiveTime)> = HashSet::new();

    for record in cells {
        if record.cell.kind != CellKind::CourseCell {
            continue;
        }
        let Some(text) = record.cell.text.as_deref().filter(|t| !t.is_empty()) else {
            continue;
        };
        // Cells whose time never normalised were already warned about by
        // the extraction stage; they just don't become courses.
        let (Some(day), Some(time_range)) = (record.day, record.time) else {
            dropped += 1;
            continue;
        };

        let Some(course) = parse_cell_text(text, day, time_range) else {
            debug!("Cell {}: no course rule matched {text:?}", record.index);
            warnings.push(CellFailure::Unparseable {
                index: record.index,
                text: text.to_string(),
            });
            dropped += 1;
            continue;
        };

        if !occupied.insert((day, time_range.start)) {
            warn!(
                "Cell {}: slot {} {} already taken, keeping the earlier cell",
                record.index, day, time_range.start
            );
            warnings.push(CellFailure::DuplicateSlot {
                index: record.index,
                day: day.to_string(),
                start: time_range.start.format("%H:%M").to_string(),
            });
            dropped += 1;
            continue;
        }

        courses.push(course);
    }

    info!("Parsed {} course(s), dropped {dropped}", courses.len());
    ParseOutcome {
        courses,
        warnings,
        dropped,
    }
}

/// Apply the rule chain to one cell's text. First match wins.
fn parse_cell_text(text: &str, day: Day, time_range: TimeRange) -> Option<Course> {
    if let Some(course) = rule_labeled(text, day, time_range) {
        return Some(course);
    }
    rule_positional(text, day, time_range)
}

/// Rule 1: the explicit labelled wire format.
fn rule_labeled(text: &str, day: Day, time_range: TimeRange) -> Option<Course> {
    let caps = RE_LABELED.captures(text)?;
    let group = |name: &str| {
        caps.name(name)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default()
    };

    let id = group("id");
    let activity = group("activity");
    let section = group("section");
    let campus = group("campus");
    let room = group("room");

    // With every label absent the regex devours anything; that is not a
    // labelled cell, so the rule abstains.
    if id.is_empty() && activity.is_empty() && section.is_empty() && campus.is_empty()
        && room.is_empty()
    {
        return None;
    }

    let location = [campus, room]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    Some(Course {
        name: group("name"),
        course_id: id,
        activity_type: activity,
        section,
        location,
        day,
        time_range,
    })
}

/// Rule 2: positional form with a vocabulary-matched activity token.
fn rule_positional(text: &str, day: Day, time_range: TimeRange) -> Option<Course> {
    let caps = RE_POSITIONAL.captures(text)?;
    Some(Course {
        name: caps["name"].trim().to_string(),
        course_id: caps["id"].replace(' ', ""),
        activity_type: caps["activity"].to_string(),
        section: caps["section"].to_string(),
        location: caps["location"].trim().to_string(),
        day,
        time_range,
    })
}
