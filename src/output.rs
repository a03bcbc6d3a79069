//! Output types returned by the parsing entry points.

use crate::error::CellFailure;
use crate::schedule::Course;
use serde::{Deserialize, Serialize};

/// Result of a successful pipeline run.
///
/// "Successful" means the table structure was established; individual cell
/// failures are listed in [`warnings`](Self::warnings) and a run that
/// parsed zero courses is still returned (with an event-less calendar) so
/// callers can distinguish "empty schedule" from a hard failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleOutput {
    /// The serialised iCalendar document (RFC 5545, CRLF line endings).
    pub calendar: String,
    /// Parsed course records, in table reading order.
    pub courses: Vec<Course>,
    /// Non-fatal per-cell failures encountered along the way.
    pub warnings: Vec<CellFailure>,
    /// Per-stage counters and timings.
    pub stats: PipelineStats,
}

impl ScheduleOutput {
    /// A structurally valid schedule from which no course could be parsed.
    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }
}

/// Per-stage counters and wall-clock timings for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Boxes surviving filtering and IoU dedup.
    pub retained_boxes: usize,
    /// Boxes classified as course cells.
    pub course_cells: usize,
    /// Cells whose OCR call failed (recorded as unknown).
    pub ocr_failures: usize,
    /// Course records produced by the parser.
    pub parsed_courses: usize,
    /// Cells dropped by time normalisation or pattern matching.
    pub dropped_cells: usize,

    pub merge_ms: u64,
    pub structure_ms: u64,
    pub boxes_ms: u64,
    pub extract_ms: u64,
    pub parse_ms: u64,
    pub calendar_ms: u64,
    pub total_ms: u64,
}
