//! # sched2ics
//!
//! Convert university schedule PDFs and images into iCalendar files via OCR.
//!
//! ## Why this crate?
//!
//! Student portals print timetables as a rigid table grid — day columns,
//! a time column, a known header keyword — and then hand them out as PDFs
//! or photos with no structured data attached. Generic OCR gives back a
//! soup of words in no useful order. This crate instead recovers the
//! *table* first: it finds the grid lines, cuts the image into precisely
//! bounded cells, reads each cell, and only then parses text it already
//! knows the role of. The output is a set of structured course records and
//! a recurring-event `.ics` payload ready for any calendar app.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bytes (PDF | image)
//!  │
//!  ├─ 1. Merge      normalise 1–2 pages into one raster image (pdfium, spawn_blocking)
//!  ├─ 2. Structure  anchor the header keyword, draw the missing column separator
//!  ├─ 3. Boxes      morphology + contours → ordered, deduplicated cell rectangles
//!  ├─ 4. Extract    bounded concurrent OCR, classification, day/time pairing
//!  ├─ 5. Parse      pattern rules → Course records
//!  └─ 6. Calendar   recurring weekly events → RFC 5545 payload
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sched2ics::{parse_schedule, ScheduleConfig, ScheduleSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bytes = std::fs::read("schedule.pdf")?;
//!     let config = ScheduleConfig::builder()
//!         .timezone("KSA")
//!         .weeks(19)
//!         .build()?;
//!     let output = parse_schedule(ScheduleSource::Pdf(bytes), &config).await?;
//!     println!("{}", output.calendar);
//!     eprintln!("{} course(s), {} warning(s)",
//!         output.courses.len(),
//!         output.warnings.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature     | Default | Description |
//! |-------------|---------|-------------|
//! | `cli`       | on      | Enables the `sched2ics` binary (clap + anyhow + tracing-subscriber) |
//! | `tesseract` | on      | Bundled [`TesseractOcr`] engine (shells out to the `tesseract` binary) |
//!
//! With `tesseract` off the crate still builds; inject your own
//! [`OcrEngine`] via [`ScheduleConfigBuilder::ocr`]:
//! ```toml
//! sched2ics = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod geometry;
pub mod observer;
pub mod ocr;
pub mod output;
pub mod pipeline;
pub mod schedule;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{FallbackCrop, ScheduleConfig, ScheduleConfigBuilder, SourceProfile};
pub use convert::{parse_schedule, parse_schedule_sync, parse_to_file, ScheduleSource};
pub use error::{CellFailure, ScheduleError};
pub use geometry::{CellBox, CellKind};
pub use observer::{NoopObserver, Observer, PipelineObserver, Stage, StageEvent};
pub use ocr::{OcrEngine, OcrError, OcrWord};
#[cfg(feature = "tesseract")]
pub use ocr::TesseractOcr;
pub use output::{PipelineStats, ScheduleOutput};
pub use schedule::{Course, Day, TimeRange};
