//! End-to-end integration tests for sched2ics.
//!
//! Each test draws a synthetic schedule table (real grid lines, so the
//! morphology/contour stages do real work) and injects a mock OCR engine
//! via the config seam. The mock reads the crop's centre pixel: each cell
//! interior is painted with a distinct gray code that selects a canned
//! response, so the engine behaves consistently however the pipeline
//! chooses to crop.
//!
//! Run with:
//!   cargo test --test e2e

use chrono::NaiveDate;
use image::{DynamicImage, GrayImage, Luma};
use sched2ics::{
    parse_schedule, parse_to_file, CellFailure, Day, OcrEngine, OcrError, OcrWord,
    PipelineObserver, ScheduleConfig, ScheduleError, ScheduleOutput, ScheduleSource, StageEvent,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ── Synthetic table fixture ──────────────────────────────────────────────────

/// Gray codes painted into cell interiors; all above the binarisation
/// threshold so they read as background to the line detector.
const CODE_HEADER: u8 = 249;
const CODE_TIME_1: u8 = 248;
const CODE_COURSE_1: u8 = 247;
const CODE_TIME_2: u8 = 246;
const CODE_COURSE_2: u8 = 245;

/// Column borders: time column 40..240, day column 240..640.
const COLS: [u32; 3] = [40, 240, 640];

/// Draw a table with a header row plus `data_rows` 240-px data rows.
/// Returns the image and the y borders used.
fn table_image(data_rows: &[(u8, u8)]) -> GrayImage {
    let mut ys = vec![40u32, 160];
    for _ in data_rows {
        let next = ys.last().unwrap() + 240;
        ys.push(next);
    }
    let height = ys.last().unwrap() + 60;
    let mut img = GrayImage::from_pixel(700, height, Luma([255]));

    for &x in &COLS {
        for xx in x..x + 3 {
            for y in ys[0]..ys[ys.len() - 1] + 3 {
                img.put_pixel(xx, y, Luma([0]));
            }
        }
    }
    for &y in &ys {
        for yy in y..y + 3 {
            for x in COLS[0]..COLS[2] + 3 {
                img.put_pixel(x, yy, Luma([0]));
            }
        }
    }

    // Paint cell interiors with their codes. The header corner cell over
    // the time column stays blank, as in the real layout.
    paint(&mut img, COLS[1], ys[0], COLS[2], ys[1], CODE_HEADER);
    for (row, &(time_code, course_code)) in data_rows.iter().enumerate() {
        let (top, bottom) = (ys[row + 1], ys[row + 2]);
        paint(&mut img, COLS[0], top, COLS[1], bottom, time_code);
        paint(&mut img, COLS[1], top, COLS[2], bottom, course_code);
    }
    img
}

fn paint(img: &mut GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, code: u8) {
    for y in y0 + 8..y1 - 5 {
        for x in x0 + 8..x1 - 5 {
            img.put_pixel(x, y, Luma([code]));
        }
    }
}

fn png_bytes(img: &GrayImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

// ── Mock OCR engine ──────────────────────────────────────────────────────────

/// Centre-pixel-code OCR: `read_text` looks the crop's centre gray level up
/// in the canned map; `read_words` reports the configured header words,
/// filtered to the crop like a real engine would.
struct CodeOcr {
    map: HashMap<u8, Result<String, String>>,
    words: Vec<OcrWord>,
}

impl CodeOcr {
    fn with_monday_header() -> CodeOcr {
        let mut map: HashMap<u8, Result<String, String>> = HashMap::new();
        map.insert(CODE_HEADER, Ok("MONDAY".into()));
        map.insert(CODE_TIME_1, Ok("08:00-09:00".into()));
        map.insert(
            CODE_COURSE_1,
            Ok("Intro to CS CS101 Lecture Sec1 Bldg-A 101".into()),
        );
        // Glued separator, normalised by the extraction stage.
        map.insert(CODE_TIME_2, Ok("10:0011:00".into()));
        map.insert(
            CODE_COURSE_2,
            Ok("Databases CS305 Lab Sec2 Bldg-B 202".into()),
        );
        CodeOcr {
            map,
            // Positioned so the synthetic separator (keyword right edge +
            // padding) lands on the table's own right border.
            words: vec![OcrWord {
                text: "MONDAY".into(),
                x: 420,
                y: 70,
                width: 120,
                height: 40,
            }],
        }
    }
}

impl OcrEngine for CodeOcr {
    fn read_text(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let gray = image.to_luma8();
        let code = gray.get_pixel(gray.width() / 2, gray.height() / 2)[0];
        match self.map.get(&code) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(e)) => Err(OcrError::Engine(e.clone())),
            None => Ok(String::new()),
        }
    }

    fn read_words(&self, image: &DynamicImage) -> Result<Vec<OcrWord>, OcrError> {
        let (w, h) = (image.width(), image.height());
        Ok(self
            .words
            .iter()
            .filter(|word| word.x + word.width <= w && word.y + word.height <= h)
            .cloned()
            .collect())
    }
}

// ── Config helper ────────────────────────────────────────────────────────────

fn config(engine: CodeOcr) -> ScheduleConfig {
    ScheduleConfig::builder()
        .keywords(vec!["MONDAY".into(), "LUNDI".into()])
        // The synthetic page is small; keep the table-frame rectangle and
        // the page-exterior component out of the cell set.
        .max_box_area(150_000)
        .generation_date(NaiveDate::from_ymd_opt(2026, 8, 4).unwrap())
        .ocr(Arc::new(engine))
        .build()
        .unwrap()
}

fn one_row_source() -> ScheduleSource {
    ScheduleSource::Image(png_bytes(&table_image(&[(CODE_TIME_1, CODE_COURSE_1)])))
}

fn two_row_source() -> ScheduleSource {
    ScheduleSource::Image(png_bytes(&table_image(&[
        (CODE_TIME_1, CODE_COURSE_1),
        (CODE_TIME_2, CODE_COURSE_2),
    ])))
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn single_course_table_parses_exactly() {
    let config = config(CodeOcr::with_monday_header());
    let output = parse_schedule(one_row_source(), &config).await.unwrap();

    assert_eq!(output.courses.len(), 1, "warnings: {:?}", output.warnings);
    let course = &output.courses[0];
    assert_eq!(course.name, "Intro to CS");
    assert_eq!(course.course_id, "CS101");
    assert_eq!(course.activity_type, "Lecture");
    assert_eq!(course.section, "Sec1");
    assert_eq!(course.location, "Bldg-A 101");
    assert_eq!(course.day, Day::Monday);
    assert_eq!(course.time_range.to_string(), "08:00-09:00");

    assert!(output.warnings.is_empty());
    assert_eq!(output.stats.retained_boxes, 4);
    assert_eq!(output.stats.course_cells, 1);
    assert_eq!(output.stats.parsed_courses, 1);
    assert_eq!(output.stats.ocr_failures, 0);
}

#[tokio::test]
async fn two_rows_parse_in_reading_order_with_glued_time_normalised() {
    let config = config(CodeOcr::with_monday_header());
    let output = parse_schedule(two_row_source(), &config).await.unwrap();

    assert_eq!(output.courses.len(), 2, "warnings: {:?}", output.warnings);
    assert_eq!(output.courses[0].course_id, "CS101");
    assert_eq!(output.courses[1].course_id, "CS305");
    // "10:0011:00" came back glued from OCR; the separator is inferred.
    assert_eq!(output.courses[1].time_range.to_string(), "10:00-11:00");
}

#[tokio::test]
async fn calendar_carries_one_event_per_course() {
    let config = config(CodeOcr::with_monday_header());
    let output = parse_schedule(two_row_source(), &config).await.unwrap();

    assert_eq!(output.calendar.matches("BEGIN:VEVENT").count(), 2);
    // 2026-08-04 is a Tuesday; the first Monday on or after is the 10th.
    assert!(output
        .calendar
        .contains("DTSTART;TZID=Asia/Riyadh:20260810T080000"));
    assert!(output.calendar.contains("RRULE:FREQ=WEEKLY;COUNT=19"));
    assert!(output.calendar.contains("UID:CS101-Sec1-08000900@sched2ics"));
    assert!(output.calendar.contains("UID:CS305-Sec2-10001100@sched2ics"));
}

#[tokio::test]
async fn repeated_runs_produce_byte_identical_calendars() {
    let config = config(CodeOcr::with_monday_header());
    let a = parse_schedule(two_row_source(), &config).await.unwrap();
    let b = parse_schedule(two_row_source(), &config).await.unwrap();
    assert_eq!(a.calendar, b.calendar);
}

// ── Structural failures ──────────────────────────────────────────────────────

#[tokio::test]
async fn missing_keyword_is_unsupported_format_not_a_generic_failure() {
    let mut engine = CodeOcr::with_monday_header();
    engine.words.clear();
    let config = config(engine);

    let err = parse_schedule(one_row_source(), &config).await.unwrap_err();
    match err {
        ScheduleError::UnsupportedFormat { keywords } => {
            assert_eq!(keywords, vec!["MONDAY".to_string(), "LUNDI".to_string()]);
        }
        other => panic!("expected UnsupportedFormat, got {other:?}"),
    }
}

#[tokio::test]
async fn blank_page_with_keyword_is_an_extraction_error() {
    // The keyword is "found" but there is no grid at all.
    let engine = CodeOcr::with_monday_header();
    let config = config(engine);
    let blank = GrayImage::from_pixel(700, 500, Luma([255]));

    let err = parse_schedule(ScheduleSource::Image(png_bytes(&blank)), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Extraction { .. }));
}

// ── Per-cell failure isolation ───────────────────────────────────────────────

#[tokio::test]
async fn unparseable_cell_yields_an_explicit_empty_result() {
    let mut engine = CodeOcr::with_monday_header();
    engine
        .map
        .insert(CODE_COURSE_1, Ok("see the noticeboard".into()));
    let config = config(engine);

    let output = parse_schedule(one_row_source(), &config).await.unwrap();
    assert!(output.is_empty());
    assert!(!output.calendar.contains("BEGIN:VEVENT"));
    assert!(matches!(
        output.warnings.as_slice(),
        [CellFailure::Unparseable { .. }]
    ));
}

#[tokio::test]
async fn bad_time_text_drops_only_that_row() {
    let mut engine = CodeOcr::with_monday_header();
    engine.map.insert(CODE_TIME_2, Ok("morning-ish".into()));
    let config = config(engine);

    let output = parse_schedule(two_row_source(), &config).await.unwrap();
    assert_eq!(output.courses.len(), 1);
    assert_eq!(output.courses[0].course_id, "CS101");
    assert!(output
        .warnings
        .iter()
        .any(|w| matches!(w, CellFailure::InvalidTime { .. })));
}

#[tokio::test]
async fn one_cell_ocr_failure_never_aborts_the_batch() {
    let mut engine = CodeOcr::with_monday_header();
    engine
        .map
        .insert(CODE_COURSE_2, Err("engine crashed".into()));
    let config = config(engine);

    let output = parse_schedule(two_row_source(), &config).await.unwrap();
    assert_eq!(output.courses.len(), 1);
    assert_eq!(output.courses[0].course_id, "CS101");
    assert_eq!(output.stats.ocr_failures, 1);
    assert!(output
        .warnings
        .iter()
        .any(|w| matches!(w, CellFailure::Ocr { .. })));
}

// ── Observability ────────────────────────────────────────────────────────────

struct Recorder {
    stages: Mutex<Vec<(String, bool)>>,
}

impl PipelineObserver for Recorder {
    fn on_stage(&self, event: &StageEvent) {
        self.stages
            .lock()
            .unwrap()
            .push((event.stage.name().to_string(), event.succeeded()));
    }
}

#[tokio::test]
async fn observer_sees_all_six_stages_in_order() {
    let recorder = Arc::new(Recorder {
        stages: Mutex::new(Vec::new()),
    });
    let config = ScheduleConfig::builder()
        .keywords(vec!["MONDAY".into(), "LUNDI".into()])
        .max_box_area(150_000)
        .generation_date(NaiveDate::from_ymd_opt(2026, 8, 4).unwrap())
        .ocr(Arc::new(CodeOcr::with_monday_header()))
        .observer(Arc::clone(&recorder) as Arc<dyn PipelineObserver>)
        .build()
        .unwrap();

    parse_schedule(one_row_source(), &config).await.unwrap();

    let stages = recorder.stages.lock().unwrap().clone();
    let expected = ["merge", "structure", "boxes", "extract", "parse", "calendar"];
    assert_eq!(
        stages,
        expected
            .iter()
            .map(|s| (s.to_string(), true))
            .collect::<Vec<_>>()
    );
}

// ── Output handling ──────────────────────────────────────────────────────────

#[tokio::test]
async fn parse_to_file_writes_the_calendar_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("schedule.ics");
    let config = config(CodeOcr::with_monday_header());

    let output = parse_to_file(one_row_source(), &path, &config)
        .await
        .unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(written, output.calendar);
    assert!(!path.with_extension("ics.tmp").exists());
}

#[tokio::test]
async fn output_serialises_to_json_and_back() {
    let config = config(CodeOcr::with_monday_header());
    let output = parse_schedule(two_row_source(), &config).await.unwrap();

    let json = serde_json::to_string(&output).unwrap();
    let back: ScheduleOutput = serde_json::from_str(&json).unwrap();
    assert_eq!(back.courses, output.courses);
    assert_eq!(back.calendar, output.calendar);
}
