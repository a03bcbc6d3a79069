//! Top-level conversion entry points and the stage driver.
//!
//! [`parse_schedule`] runs the six stages in order, times each one, and
//! notifies the configured observer as stages complete. The whole run sits
//! under one `tokio::time::timeout`: on expiry the caller gets a classified
//! [`ScheduleError::Timeout`] and never a partial result (in-flight OCR
//! calls finish on their blocking threads and are discarded).
//!
//! Cell-level problems never surface as errors here — they accumulate in
//! [`ScheduleOutput::warnings`] and the run carries on. A structurally
//! sound table that parses to zero courses still returns `Ok`, with an
//! event-less calendar, so callers can tell "empty schedule" from failure.

use crate::config::ScheduleConfig;
use crate::error::ScheduleError;
use crate::observer::{Stage, StageEvent};
use crate::ocr::OcrEngine;
use crate::output::{PipelineStats, ScheduleOutput};
use crate::pipeline::{boxes, calendar, extract, merge, parse, structure};
pub use crate::pipeline::merge::ScheduleSource;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Convert schedule document bytes into courses and an iCalendar payload.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `source` — size/type-validated document bytes plus their kind
/// * `config` — pipeline configuration; see [`ScheduleConfig::builder`]
///
/// # Returns
/// `Ok(ScheduleOutput)` whenever the table structure was established, even
/// if some cells failed (check `output.warnings`).
///
/// # Errors
/// `Err(ScheduleError)` only for fatal conditions: undecodable input, the
/// anchor keyword missing, undetectable boundaries, zero cells, bad
/// calendar configuration, or the request deadline expiring.
pub async fn parse_schedule(
    source: ScheduleSource,
    config: &ScheduleConfig,
) -> Result<ScheduleOutput, ScheduleError> {
    let secs = config.request_timeout_secs;
    match tokio::time::timeout(Duration::from_secs(secs), run_pipeline(source, config)).await {
        Ok(result) => result,
        Err(_) => Err(ScheduleError::Timeout { secs }),
    }
}

/// Synchronous wrapper around [`parse_schedule`].
///
/// Creates a temporary tokio runtime internally.
pub fn parse_schedule_sync(
    source: ScheduleSource,
    config: &ScheduleConfig,
) -> Result<ScheduleOutput, ScheduleError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ScheduleError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(parse_schedule(source, config))
}

/// Convert a schedule and write the .ics payload directly to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn parse_to_file(
    source: ScheduleSource,
    output_path: impl AsRef<Path>,
    config: &ScheduleConfig,
) -> Result<ScheduleOutput, ScheduleError> {
    let output = parse_schedule(source, config).await?;
    let path = output_path.as_ref();

    let write_err = |source: std::io::Error| ScheduleError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("ics.tmp");
    tokio::fs::write(&tmp_path, &output.calendar)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    Ok(output)
}

// ── Internal driver ──────────────────────────────────────────────────────

async fn run_pipeline(
    source: ScheduleSource,
    config: &ScheduleConfig,
) -> Result<ScheduleOutput, ScheduleError> {
    let total_start = Instant::now();
    let engine = resolve_engine(config)?;
    let mut stats = PipelineStats::default();

    // ── Step 1: Normalise pages into one raster image ────────────────────
    let started = Instant::now();
    let merged = merge::merge_pages(&source, config, &engine).await;
    stats.merge_ms = observe(config, Stage::Merge, started, merged.as_ref().err());
    let merged = merged?;

    // ── Step 2: Anchor the header keyword, sharpen the grid ──────────────
    let started = Instant::now();
    let detected = structure::detect_structure(merged.image, config, &engine).await;
    stats.structure_ms = observe(config, Stage::Structure, started, detected.as_ref().err());
    let (image, anchor) = detected?;
    info!("Structure anchored on '{}'", anchor.keyword);

    // ── Step 3: Extract ordered cell rectangles ──────────────────────────
    let started = Instant::now();
    let cells = boxes::extract_boxes(&image, merged.kind, config);
    stats.boxes_ms = observe(config, Stage::Boxes, started, cells.as_ref().err());
    let cells = cells?;
    stats.retained_boxes = cells.len();

    // ── Step 4: OCR and classify every cell ──────────────────────────────
    let started = Instant::now();
    let extraction = extract::extract_cells(&image, cells, config, &engine).await;
    stats.extract_ms = observe(config, Stage::Extract, started, None);
    stats.course_cells = extraction.course_cells;
    stats.ocr_failures = extraction.ocr_failures;
    let mut warnings = extraction.warnings;

    // ── Step 5: Parse course records ─────────────────────────────────────
    let started = Instant::now();
    let parsed = parse::parse_courses(&extraction.cells);
    stats.parse_ms = observe(config, Stage::Parse, started, None);
    stats.parsed_courses = parsed.courses.len();
    stats.dropped_cells = parsed.dropped;
    warnings.extend(parsed.warnings);

    // ── Step 6: Build the calendar ───────────────────────────────────────
    let today = config
        .generation_date
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let started = Instant::now();
    let ics = calendar::build_calendar(&parsed.courses, today, config);
    stats.calendar_ms = observe(config, Stage::Calendar, started, ics.as_ref().err());
    let ics = ics?;

    stats.total_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Schedule parsed: {} course(s), {} warning(s), {}ms total",
        parsed.courses.len(),
        warnings.len(),
        stats.total_ms
    );

    Ok(ScheduleOutput {
        calendar: ics,
        courses: parsed.courses,
        warnings,
        stats,
    })
}

/// Time one stage and notify the observer, fire-and-forget.
fn observe(
    config: &ScheduleConfig,
    stage: Stage,
    started: Instant,
    error: Option<&ScheduleError>,
) -> u64 {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if let Some(ref observer) = config.observer {
        observer.on_stage(&StageEvent {
            stage,
            elapsed_ms,
            error: error.map(|e| e.to_string()),
        });
    }
    elapsed_ms
}

/// Resolve the OCR engine: the injected one wins, else the bundled
/// Tesseract engine when the feature is on.
fn resolve_engine(config: &ScheduleConfig) -> Result<Arc<dyn OcrEngine>, ScheduleError> {
    if let Some(ref engine) = config.ocr {
        return Ok(Arc::clone(engine));
    }

    #[cfg(feature = "tesseract")]
    return Ok(Arc::new(crate::ocr::TesseractOcr::new()));

    #[cfg(not(feature = "tesseract"))]
    Err(ScheduleError::InvalidConfig(
        "No OCR engine configured: enable the `tesseract` feature or inject \
         one via ScheduleConfig::builder().ocr(...)"
            .into(),
    ))
}
