//! Observer trait for structured per-stage pipeline events.
//!
//! Inject an [`Arc<dyn PipelineObserver>`] via
//! [`crate::config::ScheduleConfigBuilder::observer`] to receive one event
//! per pipeline stage as it completes.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers
//! can forward events to a metrics sink, a log pipeline, or a request
//! tracer without the library knowing anything about how the host
//! application communicates. Delivery is fire-and-forget — pipeline
//! correctness never depends on an observer being present or well-behaved
//! (a panicking observer is the caller's bug, not the pipeline's).

use serde::Serialize;
use std::sync::Arc;

/// The pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    /// Page normalisation/merging into one raster image.
    Merge,
    /// Header-keyword anchoring and separator drawing.
    Structure,
    /// Cell rectangle extraction and deduplication.
    Boxes,
    /// Concurrent OCR and cell classification.
    Extract,
    /// Course record parsing.
    Parse,
    /// Calendar generation and serialisation.
    Calendar,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Merge => "merge",
            Stage::Structure => "structure",
            Stage::Boxes => "boxes",
            Stage::Extract => "extract",
            Stage::Parse => "parse",
            Stage::Calendar => "calendar",
        }
    }
}

/// One structured stage notification.
#[derive(Debug, Clone, Serialize)]
pub struct StageEvent {
    pub stage: Stage,
    pub elapsed_ms: u64,
    /// `None` on success; the error kind (`Display` of the classified
    /// error) on failure.
    pub error: Option<String>,
}

impl StageEvent {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Called by the pipeline as each stage finishes.
///
/// Implementations must be `Send + Sync`; events for a single request are
/// delivered sequentially, but two concurrent requests sharing an observer
/// will interleave. The single method has a default no-op body so callers
/// only write what they need.
pub trait PipelineObserver: Send + Sync {
    fn on_stage(&self, event: &StageEvent) {
        let _ = event;
    }
}

/// A no-op implementation for callers that don't need stage events.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::ScheduleConfig`].
pub type Observer = Arc<dyn PipelineObserver>;
