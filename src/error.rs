//! Error types for the sched2ics library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ScheduleError`] — **Fatal**: the pipeline cannot establish its
//!   structure at all (anchor keyword absent, table boundaries undetectable,
//!   no usable cells, bad calendar configuration). Returned as
//!   `Err(ScheduleError)` from the top-level `parse_*` functions.
//!
//! * [`CellFailure`] — **Non-fatal**: a single table cell failed (OCR came
//!   back empty, the time text could not be normalised, no course pattern
//!   matched) while the rest of the table is fine. Collected into
//!   [`crate::output::ScheduleOutput::warnings`] so callers can inspect
//!   partial success instead of losing the whole schedule to one bad cell.
//!
//! The separation lets the calling collaborator decide its own tolerance:
//! fail the request on any warning, log and continue, or surface the
//! warnings next to the generated calendar.

use thiserror::Error;

/// All fatal errors returned by the sched2ics library.
///
/// Cell-level failures use [`CellFailure`] and are stored in
/// [`crate::output::ScheduleOutput`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ScheduleError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The supplied bytes could not be opened as a PDF document.
    #[error("Document cannot be opened as a PDF: {detail}")]
    InvalidDocument { detail: String },

    /// The supplied bytes could not be decoded as an image.
    #[error("Image cannot be decoded: {detail}")]
    InvalidImage { detail: String },

    /// The PDF has an unsupported number of pages.
    #[error("Unsupported page count: {pages} (schedules span 1 or 2 pages)")]
    PageCount { pages: usize },

    // ── Structural errors ─────────────────────────────────────────────────
    /// Neither spelling of the anchor keyword was found.
    ///
    /// This is the primary format-incompatibility signal: the document is
    /// not a schedule table this pipeline understands.
    #[error("Schedule format not supported: none of the header keywords {keywords:?} were found")]
    UnsupportedFormat { keywords: Vec<String> },

    /// Too few structural lines were detected to locate the table, and the
    /// source profile carries no fallback crop.
    #[error(
        "Table boundary detection failed on page {page}: {found} line(s) found, {required} required.\n\
         Configure fallback crops for this source profile or rescan at a higher resolution."
    )]
    BoundaryDetection {
        page: usize,
        found: usize,
        required: usize,
    },

    /// No cell survived size/area/aspect filtering.
    #[error("No table cells detected ({candidates} candidate contours, 0 survived filtering)")]
    Extraction { candidates: usize },

    // ── Calendar errors ───────────────────────────────────────────────────
    /// The configured timezone or recurrence duration is unusable.
    #[error("Invalid calendar configuration: {0}")]
    CalendarConfig(String),

    // ── Lifecycle errors ──────────────────────────────────────────────────
    /// The overall request deadline expired. No partial results are
    /// returned; in-flight OCR calls are abandoned best-effort.
    #[error("Request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not create or write the output calendar file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (panicked worker, join failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure scoped to a single table cell.
///
/// Stored in [`crate::output::ScheduleOutput::warnings`]; the pipeline
/// always continues past these.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum CellFailure {
    /// OCR failed for this cell; it was recorded as unknown with empty text.
    #[error("Cell {index}: OCR failed: {detail}")]
    Ocr { index: usize, detail: String },

    /// The time text paired with this cell could not be coerced into
    /// `HH:MM-HH:MM` shape.
    #[error("Cell {index}: unusable time text {raw:?}")]
    InvalidTime { index: usize, raw: String },

    /// No course pattern matched the cell text.
    #[error("Cell {index}: no course pattern matched {text:?}")]
    Unparseable { index: usize, text: String },

    /// A later course landed on an already-occupied `(day, start)` slot.
    ///
    /// The first course in reading order is kept. The right policy here is
    /// an open product question; keeping the earlier cell matches the order
    /// a reader sees the table in.
    #[error("Cell {index}: duplicate slot {day} {start}, keeping the earlier cell")]
    DuplicateSlot {
        index: usize,
        day: String,
        start: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_lists_keywords() {
        let e = ScheduleError::UnsupportedFormat {
            keywords: vec!["THURSDAY".into(), "JEUDI".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("THURSDAY"), "got: {msg}");
        assert!(msg.contains("JEUDI"), "got: {msg}");
    }

    #[test]
    fn boundary_detection_display() {
        let e = ScheduleError::BoundaryDetection {
            page: 1,
            found: 1,
            required: 3,
        };
        let msg = e.to_string();
        assert!(msg.contains("page 1"));
        assert!(msg.contains("1 line(s)"));
    }

    #[test]
    fn timeout_display() {
        let e = ScheduleError::Timeout { secs: 120 };
        assert!(e.to_string().contains("120s"));
    }

    #[test]
    fn cell_failure_roundtrips_through_json() {
        let w = CellFailure::InvalidTime {
            index: 7,
            raw: "8:OO-9:OO".into(),
        };
        let json = serde_json::to_string(&w).unwrap();
        let back: CellFailure = serde_json::from_str(&json).unwrap();
        assert!(back.to_string().contains("Cell 7"));
    }
}
