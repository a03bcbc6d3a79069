//! Calendar generation: course records → one RFC 5545 document.
//!
//! Generation is a pure function of `(courses, generation date, weeks,
//! timezone)`: the same inputs always produce byte-identical output. That
//! rules out wall-clock reads inside this module — the generation date is
//! an explicit parameter and `DTSTAMP` is derived from it, not from "now".
//!
//! The serialiser is written out by hand rather than through a calendar
//! crate: the byte-identical guarantee makes the exact output part of the
//! contract, so the assembly (field order, folding, escaping, CRLF) lives
//! here where tests can pin it.

use crate::config::ScheduleConfig;
use crate::error::ScheduleError;
use crate::schedule::{Course, Day};
use chrono::{Datelike, Duration, NaiveDate};
use tracing::info;

const PRODID: &str = "-//sched2ics//University Schedule//EN";
/// RFC 5545 §3.1: content lines should not exceed 75 octets.
const FOLD_WIDTH: usize = 75;

/// Build the full iCalendar payload for a parsed schedule.
///
/// One `VEVENT` per course, recurring weekly for `config.weeks`
/// occurrences, with local times qualified by the configured `TZID`. An
/// empty course list yields a valid, event-less document.
pub fn build_calendar(
    courses: &[Course],
    today: NaiveDate,
    config: &ScheduleConfig,
) -> Result<String, ScheduleError> {
    // The builder already rejects this, but config fields are public and
    // a zero COUNT would make every event vanish silently.
    if config.weeks == 0 {
        return Err(ScheduleError::CalendarConfig(
            "recurrence duration must be ≥ 1 week".into(),
        ));
    }

    let mut lines: Vec<String> = vec![
        "BEGIN:VCALENDAR".into(),
        "VERSION:2.0".into(),
        format!("PRODID:{PRODID}"),
        "CALSCALE:GREGORIAN".into(),
    ];

    for course in courses {
        push_event(&mut lines, course, today, config);
    }

    lines.push("END:VCALENDAR".into());

    info!(
        "Calendar built: {} event(s), {} week(s), {}",
        courses.len(),
        config.weeks,
        config.timezone
    );

    let mut out = String::new();
    for line in &lines {
        fold_into(&mut out, line);
    }
    Ok(out)
}

fn push_event(lines: &mut Vec<String>, course: &Course, today: NaiveDate, config: &ScheduleConfig) {
    let date = first_occurrence(today, course.day);
    let tz = config.timezone.name();
    let start = date.and_time(course.time_range.start);
    let end = date.and_time(course.time_range.end);

    lines.push("BEGIN:VEVENT".into());
    lines.push(format!("UID:{}", uid(course)));
    // Derived from the generation date so repeated runs stay identical.
    lines.push(format!("DTSTAMP:{}T000000Z", today.format("%Y%m%d")));
    lines.push(format!("DTSTART;TZID={tz}:{}", start.format("%Y%m%dT%H%M%S")));
    lines.push(format!("DTEND;TZID={tz}:{}", end.format("%Y%m%dT%H%M%S")));
    lines.push(format!("RRULE:FREQ=WEEKLY;COUNT={}", config.weeks));
    lines.push(format!("SUMMARY:{}", escape_text(&summary(course))));
    lines.push(format!("DESCRIPTION:{}", escape_text(&description(course))));
    if !course.location.is_empty() {
        lines.push(format!("LOCATION:{}", escape_text(&course.location)));
    }
    lines.push("END:VEVENT".into());
}

/// The first date on or after `today` falling on the course's weekday.
fn first_occurrence(today: NaiveDate, day: Day) -> NaiveDate {
    let current = today.weekday().num_days_from_monday();
    let ahead = (day.weekday_index() + 7 - current) % 7;
    today + Duration::days(ahead as i64)
}

/// Deterministic event identifier: course id, section, and the slot digits.
fn uid(course: &Course) -> String {
    format!(
        "{}-{}-{}{}@sched2ics",
        compact(&course.course_id),
        compact(&course.section),
        course.time_range.start.format("%H%M"),
        course.time_range.end.format("%H%M"),
    )
}

/// UID segments must not contain whitespace.
fn compact(s: &str) -> String {
    s.split_whitespace().collect()
}

fn summary(course: &Course) -> String {
    let details: Vec<&str> = [
        course.course_id.as_str(),
        course.activity_type.as_str(),
        course.section.as_str(),
    ]
    .into_iter()
    .filter(|s| !s.is_empty())
    .collect();

    if details.is_empty() {
        course.name.clone()
    } else {
        format!("{} ({})", course.name, details.join(", "))
    }
}

fn description(course: &Course) -> String {
    format!(
        "Course ID: {}\nActivity: {}\nSection: {}",
        course.course_id, course.activity_type, course.section
    )
}

/// RFC 5545 §3.3.11 TEXT escaping: backslash, semicolon, comma, newline.
fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}

/// Append one content line, folded at 75 octets with CRLF + space
/// continuations, never splitting inside a UTF-8 sequence.
fn fold_into(out: &mut String, line: &str) {
    let mut budget = FOLD_WIDTH;
    let mut used = 0usize;
    for c in line.chars() {
        let len = c.len_utf8();
        if used + len > budget {
            out.push_str("\r\n ");
            // Continuation lines lose one octet to the leading space.
            budget = FOLD_WIDTH - 1;
            used = 0;
        }
        out.push(c);
        used += len;
    }
    out.push_str("\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::TimeRange;

    fn course(name: &str, id: &str, day: Day, slot: &str) -> Course {
        Course {
            name: name.to_string(),
            course_id: id.to_string(),
            activity_type: "Lecture".to_string(),
            section: "Sec1".to_string(),
            location: "Bldg-A 101".to_string(),
            day,
            time_range: TimeRange::parse(slot).unwrap(),
        }
    }

    fn config() -> ScheduleConfig {
        ScheduleConfig::builder()
            .generation_date(NaiveDate::from_ymd_opt(2026, 8, 4).unwrap())
            .build()
            .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn first_occurrence_is_on_or_after_today() {
        // 2026-08-04 is a Tuesday.
        let today = date(2026, 8, 4);
        assert_eq!(first_occurrence(today, Day::Tuesday), today);
        assert_eq!(first_occurrence(today, Day::Wednesday), date(2026, 8, 5));
        // A Monday course wraps to the following week.
        assert_eq!(first_occurrence(today, Day::Monday), date(2026, 8, 10));
        assert_eq!(first_occurrence(today, Day::Sunday), date(2026, 8, 9));
    }

    #[test]
    fn event_carries_all_required_fields() {
        let ics = build_calendar(
            &[course("Intro to CS", "CS101", Day::Monday, "08:00-09:00")],
            date(2026, 8, 4),
            &config(),
        )
        .unwrap();

        assert!(ics.contains("BEGIN:VCALENDAR\r\n"));
        assert!(ics.contains("UID:CS101-Sec1-08000900@sched2ics\r\n"));
        assert!(ics.contains("DTSTART;TZID=Asia/Riyadh:20260810T080000\r\n"));
        assert!(ics.contains("DTEND;TZID=Asia/Riyadh:20260810T090000\r\n"));
        assert!(ics.contains("RRULE:FREQ=WEEKLY;COUNT=19\r\n"));
        assert!(ics.contains("SUMMARY:Intro to CS (CS101\\, Lecture\\, Sec1)\r\n"));
        assert!(ics.contains("LOCATION:Bldg-A 101\r\n"));
        assert!(ics.contains("DTSTAMP:20260804T000000Z\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
    }

    #[test]
    fn output_is_byte_identical_across_runs() {
        let courses = vec![
            course("Intro to CS", "CS101", Day::Monday, "08:00-09:00"),
            course("Databases", "CS305", Day::Thursday, "14:00-15:30"),
        ];
        let today = date(2026, 8, 4);
        let a = build_calendar(&courses, today, &config()).unwrap();
        let b = build_calendar(&courses, today, &config()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn every_line_ends_with_crlf() {
        let ics = build_calendar(
            &[course("Intro to CS", "CS101", Day::Monday, "08:00-09:00")],
            date(2026, 8, 4),
            &config(),
        )
        .unwrap();
        for line in ics.split_inclusive("\r\n") {
            assert!(line.ends_with("\r\n"), "unterminated line: {line:?}");
            // No bare LF or CR inside a content line.
            assert!(!line.trim_end_matches("\r\n").contains(['\r', '\n']));
        }
    }

    #[test]
    fn empty_course_list_yields_an_eventless_document() {
        let ics = build_calendar(&[], date(2026, 8, 4), &config()).unwrap();
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
        assert!(!ics.contains("BEGIN:VEVENT"));
    }

    #[test]
    fn description_newlines_are_escaped() {
        let ics = build_calendar(
            &[course("Algebra", "MATH101", Day::Friday, "10:00-11:00")],
            date(2026, 8, 4),
            &config(),
        )
        .unwrap();
        assert!(ics.contains("DESCRIPTION:Course ID: MATH101\\nActivity: Lecture\\nSection: Sec1"));
    }

    #[test]
    fn long_lines_fold_at_75_octets() {
        let mut long = course("Very", "CS999", Day::Monday, "08:00-09:00");
        long.name = "A".repeat(200);
        let ics = build_calendar(&[long], date(2026, 8, 4), &config()).unwrap();

        for line in ics.split("\r\n") {
            assert!(line.len() <= FOLD_WIDTH, "overlong line ({}): {line:?}", line.len());
        }
        // Unfolding restores the full summary.
        let unfolded = ics.replace("\r\n ", "");
        assert!(unfolded.contains(&format!("SUMMARY:{}", "A".repeat(200))));
    }

    #[test]
    fn folding_respects_utf8_boundaries() {
        let mut accented = course("Très", "FR101", Day::Monday, "08:00-09:00");
        accented.name = "é".repeat(120);
        let ics = build_calendar(&[accented], date(2026, 8, 4), &config()).unwrap();
        // Would have panicked on a broken char boundary; also verify the
        // round trip.
        let unfolded = ics.replace("\r\n ", "");
        assert!(unfolded.contains(&"é".repeat(120)));
    }

    #[test]
    fn zero_weeks_is_a_calendar_config_error() {
        let mut config = config();
        config.weeks = 0;
        let err = build_calendar(
            &[course("Intro to CS", "CS101", Day::Monday, "08:00-09:00")],
            date(2026, 8, 4),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, ScheduleError::CalendarConfig(_)));
    }

    #[test]
    fn timezone_alias_flows_into_tzid() {
        let config = ScheduleConfig::builder().timezone("ALG").build().unwrap();
        let ics = build_calendar(
            &[course("Analyse", "MATH305", Day::Monday, "08:00-09:00")],
            date(2026, 8, 4),
            &config,
        )
        .unwrap();
        assert!(ics.contains("DTSTART;TZID=Africa/Algiers:"));
    }

    #[test]
    fn missing_location_omits_the_property() {
        let mut nowhere = course("Seminar", "GEN001", Day::Monday, "08:00-09:00");
        nowhere.location = String::new();
        let ics = build_calendar(&[nowhere], date(2026, 8, 4), &config()).unwrap();
        assert!(!ics.contains("LOCATION:"));
    }
}
