//! OCR orchestration: cells → classified text, day columns, and time slots.
//!
//! ## Concurrency model
//!
//! OCR calls are the pipeline's only parallel section. Cells are submitted
//! to a bounded pool (`config.ocr_workers`, each call inside
//! `spawn_blocking`), and results are reassembled **by box index**, never
//! by completion order — the output is always in input order no matter
//! which worker finishes first. A single cell's OCR failure is absorbed:
//! the cell is recorded as unknown with empty text and a warning, and the
//! batch continues.
//!
//! ## Classification
//!
//! The first reading-order row band is the header; its day names become
//! column anchors. The first non-header cell whose text opens with an
//! `HH:MM` group is the time-reference cell, and its horizontal span
//! defines the time column. Everything else with text is a course cell
//! assigned to the horizontally nearest day anchor; its slot is read by
//! OCRing the time-column strip at the cell's own row, so a course cell
//! never depends on the time label having been detected as a box.

use crate::config::ScheduleConfig;
use crate::error::CellFailure;
use crate::geometry::{first_row_indices, CellBox, CellKind};
use crate::ocr::{OcrEngine, OcrError};
use crate::schedule::{Day, TimeRange};
use futures::stream::{self, StreamExt};
use image::{imageops, DynamicImage, GrayImage};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// One cell after extraction: the classified box plus, for course cells,
/// the assigned day and normalised time slot.
#[derive(Debug, Clone)]
pub struct CellRecord {
    /// Reading-order index of the box.
    pub index: usize,
    pub cell: CellBox,
    pub day: Option<Day>,
    pub time: Option<TimeRange>,
}

/// Output of the extraction stage.
#[derive(Debug)]
pub struct ExtractionResult {
    /// All cells, in reading order.
    pub cells: Vec<CellRecord>,
    pub warnings: Vec<CellFailure>,
    pub ocr_failures: usize,
    pub course_cells: usize,
}

static RE_TIME_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}:\d{2}").unwrap());
static RE_TIME_CANONICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}:\d{2}-\d{2}:\d{2}$").unwrap());
static RE_TIME_GLUED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2}:\d{2})(\d{2}:\d{2})$").unwrap());
static RE_DASH_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"-{2,}").unwrap());

/// OCR, classify, and pair every cell of the table.
pub async fn extract_cells(
    image: &GrayImage,
    mut boxes: Vec<CellBox>,
    config: &ScheduleConfig,
    engine: &Arc<dyn OcrEngine>,
) -> ExtractionResult {
    let mut warnings: Vec<CellFailure> = Vec::new();
    let mut ocr_failures = 0usize;

    // ── Phase 1: OCR every cell concurrently ─────────────────────────────
    let jobs: Vec<(usize, DynamicImage)> = boxes
        .iter()
        .enumerate()
        .map(|(i, b)| (i, crop_cell(image, b)))
        .collect();
    for (index, result) in ocr_batch(engine, jobs, config.ocr_workers).await {
        match result {
            Ok(text) => boxes[index].text = Some(collapse_whitespace(&text)),
            Err(e) => {
                warn!("Cell {index}: OCR failed: {e}");
                warnings.push(CellFailure::Ocr {
                    index,
                    detail: e.to_string(),
                });
                ocr_failures += 1;
                boxes[index].text = Some(String::new());
            }
        }
    }

    // ── Phase 2: classify ────────────────────────────────────────────────
    let header: HashSet<usize> = first_row_indices(&boxes, config.row_band_tolerance)
        .into_iter()
        .collect();

    let mut day_anchors: Vec<(u32, Day)> = Vec::new();
    for &i in &header {
        boxes[i].kind = CellKind::Header;
        if let Some(day) = boxes[i].text.as_deref().and_then(Day::from_name) {
            day_anchors.push((boxes[i].center_x(), day));
        }
    }
    day_anchors.sort_by_key(|(x, _)| *x);
    debug!("{} day anchor(s) in the header row", day_anchors.len());

    // The first non-header cell that reads as a time fixes the time column.
    let time_column: Option<(u32, u32)> = boxes
        .iter()
        .enumerate()
        .find(|(i, b)| {
            !header.contains(i)
                && b.text
                    .as_deref()
                    .is_some_and(|t| RE_TIME_PREFIX.is_match(t))
        })
        .map(|(_, b)| (b.x, b.width));
    if time_column.is_none() {
        warn!("No time-reference cell found; course cells cannot be paired with slots");
    }

    for i in 0..boxes.len() {
        if header.contains(&i) {
            continue;
        }
        let overlaps_time = time_column
            .is_some_and(|(tx, tw)| boxes[i].x < tx + tw && tx < boxes[i].right());
        let text = boxes[i].text.as_deref().unwrap_or_default();
        if overlaps_time || RE_TIME_PREFIX.is_match(text) {
            boxes[i].kind = CellKind::TimeReference;
        } else if !text.is_empty() {
            boxes[i].kind = CellKind::CourseCell;
        }
        // Empty cells stay Unknown: a vacant grid slot is normal, not a
        // warning.
    }
    let course_cells = boxes
        .iter()
        .filter(|b| b.kind == CellKind::CourseCell)
        .count();

    // ── Phase 3: pair course cells with their row's time slot ────────────
    let time_jobs: Vec<(usize, DynamicImage)> = match time_column {
        Some((tx, tw)) => boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.kind == CellKind::CourseCell)
            .map(|(i, b)| (i, crop_region(image, tx, b.y, tw, b.height)))
            .collect(),
        None => Vec::new(),
    };

    let mut times: HashMap<usize, TimeRange> = HashMap::new();
    for (index, result) in ocr_batch(engine, time_jobs, config.ocr_workers).await {
        match result {
            Ok(raw) => {
                match normalize_time_text(&raw).as_deref().and_then(TimeRange::parse) {
                    Some(range) => {
                        times.insert(index, range);
                    }
                    None => {
                        warnings.push(CellFailure::InvalidTime {
                            index,
                            raw: collapse_whitespace(&raw),
                        });
                    }
                }
            }
            Err(e) => {
                warn!("Cell {index}: time-column OCR failed: {e}");
                warnings.push(CellFailure::Ocr {
                    index,
                    detail: e.to_string(),
                });
                ocr_failures += 1;
            }
        }
    }

    let cells = boxes
        .into_iter()
        .enumerate()
        .map(|(index, cell)| {
            let day = if cell.kind == CellKind::CourseCell {
                nearest_day(&day_anchors, cell.center_x())
            } else {
                None
            };
            CellRecord {
                index,
                day,
                time: times.get(&index).copied(),
                cell,
            }
        })
        .collect();

    ExtractionResult {
        cells,
        warnings,
        ocr_failures,
        course_cells,
    }
}

/// The day whose column anchor is horizontally nearest.
fn nearest_day(anchors: &[(u32, Day)], center_x: u32) -> Option<Day> {
    anchors
        .iter()
        .min_by_key(|(x, _)| x.abs_diff(center_x))
        .map(|(_, day)| *day)
}

/// Coerce raw time-cell text into canonical `HH:MM-HH:MM` shape.
///
/// Total and deterministic: whitespace is stripped, unicode dashes are
/// mapped to `-`, dash runs collapse to one, and a missing separator
/// between two glued `HH:MM` groups is inferred from the fixed digit
/// count. Anything else is `None` — the explicit invalid marker.
///
/// Validity of the hour/minute values themselves is the caller's job
/// (via [`TimeRange::parse`]).
pub fn normalize_time_text(raw: &str) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' => '-',
            c => c,
        })
        .collect();
    if compact.is_empty() {
        return None;
    }

    let collapsed = RE_DASH_RUN.replace_all(&compact, "-");
    if RE_TIME_CANONICAL.is_match(&collapsed) {
        return Some(collapsed.into_owned());
    }
    if let Some(caps) = RE_TIME_GLUED.captures(&collapsed) {
        return Some(format!("{}-{}", &caps[1], &caps[2]));
    }
    None
}

/// Run OCR jobs over the bounded worker pool and hand results back sorted
/// by job index.
async fn ocr_batch(
    engine: &Arc<dyn OcrEngine>,
    jobs: Vec<(usize, DynamicImage)>,
    workers: usize,
) -> Vec<(usize, Result<String, OcrError>)> {
    let mut results: Vec<(usize, Result<String, OcrError>)> =
        stream::iter(jobs.into_iter().map(|(index, crop)| {
            let engine = Arc::clone(engine);
            async move {
                let joined = tokio::task::spawn_blocking(move || engine.read_text(&crop)).await;
                let result = match joined {
                    Ok(r) => r,
                    Err(e) => Err(OcrError::Engine(format!("worker panicked: {e}"))),
                };
                (index, result)
            }
        }))
        .buffer_unordered(workers.max(1))
        .collect()
        .await;

    // Completion order is nondeterministic; callers always see input order.
    results.sort_by_key(|(index, _)| *index);
    results
}

/// Crop a cell with a 2-px width margin so border-clipped glyphs keep
/// their last stroke.
fn crop_cell(image: &GrayImage, cell: &CellBox) -> DynamicImage {
    crop_region(image, cell.x, cell.y, cell.width + 2, cell.height)
}

fn crop_region(image: &GrayImage, x: u32, y: u32, width: u32, height: u32) -> DynamicImage {
    let (img_w, img_h) = image.dimensions();
    let x = x.min(img_w.saturating_sub(1));
    let y = y.min(img_h.saturating_sub(1));
    let width = width.min(img_w - x).max(1);
    let height = height.min(img_h - y).max(1);
    DynamicImage::ImageLuma8(imageops::crop_imm(image, x, y, width, height).to_image())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
