//! Configuration types for schedule parsing.
//!
//! All pipeline behaviour is controlled through [`ScheduleConfig`], built
//! via its [`ScheduleConfigBuilder`]. One immutable value is constructed per
//! process (or per request) and passed by reference into every stage — no
//! stage reads ambient global state, which makes two concurrent requests
//! trivially independent and lets tests pin every threshold.
//!
//! # Design choice: builder over constructor
//! The pipeline has over twenty tuning knobs (kernel sizes, area windows,
//! OCR pool size, …). The builder lets callers set only what they care
//! about and rely on documented defaults for the rest.

use crate::error::ScheduleError;
use crate::observer::PipelineObserver;
use crate::ocr::OcrEngine;
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Tag describing where the uploaded document came from.
///
/// Different portal/browser combinations print the schedule with slightly
/// different page geometry. The profile selects the *fallback* crop applied
/// when structural boundary detection fails on a two-page document; with no
/// fallback configured for the profile, detection failure is a hard
/// [`ScheduleError::BoundaryDetection`] rather than a guessed crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SourceProfile {
    /// Chrome print-to-PDF output (default).
    #[default]
    Chrome,
    /// Firefox print-to-PDF output.
    Firefox,
}

/// Explicit crop to fall back to when line detection finds too little
/// structure on a two-page document. Ratios are relative to the rendered
/// page size so they hold at any DPI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FallbackCrop {
    /// Fraction of page 1's width to keep (from the left edge).
    pub page1_width_ratio: f32,
    /// Fraction of page 2's height to skip (from the top edge).
    pub page2_offset_ratio: f32,
}

/// Configuration for a schedule-to-calendar conversion.
///
/// Built via [`ScheduleConfig::builder()`] or [`ScheduleConfig::default()`].
///
/// # Example
/// ```rust
/// use sched2ics::ScheduleConfig;
///
/// let config = ScheduleConfig::builder()
///     .dpi(300)
///     .ocr_workers(4)
///     .timezone("ALG")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ScheduleConfig {
    /// Rendering DPI used when rasterising PDF pages. Range: 72–600. Default: 300.
    ///
    /// 300 DPI keeps 8-pt schedule text legible to Tesseract. Lower values
    /// shrink the working images but start dropping thin grid lines, which
    /// starves boundary detection.
    pub dpi: u32,

    /// Anchor keyword spellings, one per supported language.
    /// Default: `["THURSDAY", "JEUDI"]`.
    ///
    /// The keyword orients the whole layout; a document containing neither
    /// spelling fails with [`ScheduleError::UnsupportedFormat`].
    pub keywords: Vec<String>,

    /// Pixels between the anchor keyword's right edge and the synthetic
    /// vertical separator drawn to close the last day column. Default: 100.
    pub keyword_padding: u32,

    /// Fraction of the image height OCR'd when looking for the anchor
    /// keyword or a duplicated header row. Default: 0.25.
    pub header_band_ratio: f32,

    /// Divisor of the image width used to size directional line kernels
    /// (`kernel_len = width / divisor`). Default: 80.
    pub line_kernel_divisor: u32,

    /// Minimum length in pixels for a detected segment to count as a
    /// structural vertical line. Default: 200.
    pub vertical_line_min_len: u32,

    /// Minimum number of vertical-line segments a cluster needs before it
    /// can define the page-1 crop boundary. Default: 3.
    pub min_line_count: usize,

    /// Maximum horizontal distance in pixels between segments of the same
    /// vertical-line cluster. Default: 10.
    pub line_cluster_tolerance: u32,

    /// Minimum cell width in pixels. Default: 50.
    pub min_box_width: u32,

    /// Minimum cell height in pixels. Default: 20.
    pub min_box_height: u32,

    /// Minimum cell area for document-rendered sources. Default: 20 000.
    ///
    /// Rendered pages have crisp grid lines, so anything smaller than a
    /// real cell is line debris. Photographed sources blur cell borders and
    /// need the looser [`Self::min_box_area_photographed`].
    pub min_box_area_rendered: u64,

    /// Minimum cell area for photographed/image sources. Default: 2 000.
    pub min_box_area_photographed: u64,

    /// Maximum cell area; larger rectangles are the table frame itself.
    /// Default: 800 000.
    pub max_box_area: u64,

    /// Cell aspect-ratio window (`width / height`). Defaults: 0.2 – 10.0.
    pub min_aspect_ratio: f32,
    pub max_aspect_ratio: f32,

    /// IoU above which two detected boxes count as the same cell. Default: 0.1.
    pub iou_threshold: f64,

    /// Vertical-center tolerance for grouping boxes into the same reading
    /// row. Default: 30.
    pub row_band_tolerance: u32,

    /// Bounded worker pool size for per-cell OCR calls. Default: 8.
    ///
    /// Tesseract is CPU-bound; each call runs on the blocking thread pool.
    /// Eight workers saturate a typical 4–8 core host without starving the
    /// async runtime.
    pub ocr_workers: usize,

    /// Number of weekly occurrences generated per course. Default: 19
    /// (one semester).
    pub weeks: u32,

    /// IANA timezone the schedule's local times belong to.
    /// Default: `Asia/Riyadh`.
    ///
    /// The builder also accepts campus aliases (`KSA`, `ALG`); see
    /// [`ScheduleConfigBuilder::timezone`].
    pub timezone: Tz,

    /// Calendar generation date ("today"). Default: `None`, meaning the
    /// current local date at call time.
    ///
    /// Calendar output is a pure function of its inputs; pinning this makes
    /// repeated runs byte-identical.
    pub generation_date: Option<NaiveDate>,

    /// Overall request deadline in seconds. Default: 120.
    ///
    /// Expiry aborts the whole pipeline with [`ScheduleError::Timeout`];
    /// partial results are never returned.
    pub request_timeout_secs: u64,

    /// Source profile of the uploaded document. Default: Chrome.
    pub profile: SourceProfile,

    /// Fallback crops per profile, used only when boundary detection fails.
    /// Default: empty — detection failure is then a classified error.
    pub fallback_crops: HashMap<SourceProfile, FallbackCrop>,

    /// OCR engine. `None` selects the bundled Tesseract engine (requires
    /// the `tesseract` feature); tests inject mock engines here.
    pub ocr: Option<Arc<dyn OcrEngine>>,

    /// Fire-and-forget observer for structured stage events.
    pub observer: Option<Arc<dyn PipelineObserver>>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            keywords: vec!["THURSDAY".to_string(), "JEUDI".to_string()],
            keyword_padding: 100,
            header_band_ratio: 0.25,
            line_kernel_divisor: 80,
            vertical_line_min_len: 200,
            min_line_count: 3,
            line_cluster_tolerance: 10,
            min_box_width: 50,
            min_box_height: 20,
            min_box_area_rendered: 20_000,
            min_box_area_photographed: 2_000,
            max_box_area: 800_000,
            min_aspect_ratio: 0.2,
            max_aspect_ratio: 10.0,
            iou_threshold: 0.1,
            row_band_tolerance: 30,
            ocr_workers: 8,
            weeks: 19,
            timezone: Tz::Asia__Riyadh,
            generation_date: None,
            request_timeout_secs: 120,
            profile: SourceProfile::default(),
            fallback_crops: HashMap::new(),
            ocr: None,
            observer: None,
        }
    }
}

impl fmt::Debug for ScheduleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleConfig")
            .field("dpi", &self.dpi)
            .field("keywords", &self.keywords)
            .field("keyword_padding", &self.keyword_padding)
            .field("min_line_count", &self.min_line_count)
            .field("iou_threshold", &self.iou_threshold)
            .field("row_band_tolerance", &self.row_band_tolerance)
            .field("ocr_workers", &self.ocr_workers)
            .field("weeks", &self.weeks)
            .field("timezone", &self.timezone)
            .field("generation_date", &self.generation_date)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("profile", &self.profile)
            .field("ocr", &self.ocr.as_ref().map(|_| "<dyn OcrEngine>"))
            .field("observer", &self.observer.as_ref().map(|_| "<dyn PipelineObserver>"))
            .finish()
    }
}

impl ScheduleConfig {
    /// Create a new builder for `ScheduleConfig`.
    pub fn builder() -> ScheduleConfigBuilder {
        ScheduleConfigBuilder {
            config: Self::default(),
            timezone_error: None,
        }
    }

    /// Area threshold for the given source kind.
    pub fn min_box_area_for(&self, rendered: bool) -> u64 {
        if rendered {
            self.min_box_area_rendered
        } else {
            self.min_box_area_photographed
        }
    }

    /// Fallback crop configured for the active profile, if any.
    pub fn fallback_crop(&self) -> Option<FallbackCrop> {
        self.fallback_crops.get(&self.profile).copied()
    }
}

/// Campus aliases accepted by [`ScheduleConfigBuilder::timezone`] next to
/// plain IANA identifiers.
const TIMEZONE_ALIASES: [(&str, Tz); 2] = [
    ("KSA", Tz::Asia__Riyadh),
    ("ALG", Tz::Africa__Algiers),
];

/// Builder for [`ScheduleConfig`].
#[derive(Debug)]
pub struct ScheduleConfigBuilder {
    config: ScheduleConfig,
    timezone_error: Option<String>,
}

impl ScheduleConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn keywords(mut self, keywords: Vec<String>) -> Self {
        self.config.keywords = keywords;
        self
    }

    pub fn keyword_padding(mut self, px: u32) -> Self {
        self.config.keyword_padding = px;
        self
    }

    pub fn header_band_ratio(mut self, ratio: f32) -> Self {
        self.config.header_band_ratio = ratio.clamp(0.05, 1.0);
        self
    }

    pub fn line_kernel_divisor(mut self, divisor: u32) -> Self {
        self.config.line_kernel_divisor = divisor.max(1);
        self
    }

    pub fn vertical_line_min_len(mut self, px: u32) -> Self {
        self.config.vertical_line_min_len = px.max(1);
        self
    }

    pub fn min_line_count(mut self, n: usize) -> Self {
        self.config.min_line_count = n.max(1);
        self
    }

    pub fn line_cluster_tolerance(mut self, px: u32) -> Self {
        self.config.line_cluster_tolerance = px;
        self
    }

    pub fn min_box_size(mut self, width: u32, height: u32) -> Self {
        self.config.min_box_width = width;
        self.config.min_box_height = height;
        self
    }

    pub fn min_box_area_rendered(mut self, area: u64) -> Self {
        self.config.min_box_area_rendered = area;
        self
    }

    pub fn min_box_area_photographed(mut self, area: u64) -> Self {
        self.config.min_box_area_photographed = area;
        self
    }

    pub fn max_box_area(mut self, area: u64) -> Self {
        self.config.max_box_area = area;
        self
    }

    pub fn aspect_ratio_window(mut self, min: f32, max: f32) -> Self {
        self.config.min_aspect_ratio = min;
        self.config.max_aspect_ratio = max;
        self
    }

    pub fn iou_threshold(mut self, threshold: f64) -> Self {
        self.config.iou_threshold = threshold;
        self
    }

    pub fn row_band_tolerance(mut self, px: u32) -> Self {
        self.config.row_band_tolerance = px;
        self
    }

    pub fn ocr_workers(mut self, n: usize) -> Self {
        self.config.ocr_workers = n.max(1);
        self
    }

    pub fn weeks(mut self, weeks: u32) -> Self {
        self.config.weeks = weeks;
        self
    }

    /// Set the schedule timezone from an IANA identifier or campus alias
    /// (`"KSA"`, `"ALG"`).
    ///
    /// An unknown identifier is reported from [`Self::build`], not here —
    /// the builder stays infallible per call, like every other setter.
    pub fn timezone(mut self, tz: impl AsRef<str>) -> Self {
        let raw = tz.as_ref().trim();
        let alias = TIMEZONE_ALIASES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(raw))
            .map(|(_, tz)| *tz);
        match alias.or_else(|| Tz::from_str(raw).ok()) {
            Some(tz) => self.config.timezone = tz,
            None => self.timezone_error = Some(raw.to_string()),
        }
        self
    }

    pub fn generation_date(mut self, date: NaiveDate) -> Self {
        self.config.generation_date = Some(date);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn profile(mut self, profile: SourceProfile) -> Self {
        self.config.profile = profile;
        self
    }

    pub fn fallback_crop(mut self, profile: SourceProfile, crop: FallbackCrop) -> Self {
        self.config.fallback_crops.insert(profile, crop);
        self
    }

    pub fn ocr(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.config.ocr = Some(engine);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ScheduleConfig, ScheduleError> {
        if let Some(tz) = self.timezone_error {
            return Err(ScheduleError::InvalidConfig(format!(
                "Unknown timezone '{tz}' (expected an IANA id or one of KSA, ALG)"
            )));
        }
        let c = &self.config;
        if c.keywords.is_empty() {
            return Err(ScheduleError::InvalidConfig(
                "At least one anchor keyword is required".into(),
            ));
        }
        if c.weeks == 0 {
            return Err(ScheduleError::InvalidConfig(
                "Recurrence duration must be ≥ 1 week".into(),
            ));
        }
        if !(0.0..=1.0).contains(&c.iou_threshold) {
            return Err(ScheduleError::InvalidConfig(format!(
                "IoU threshold must be within 0–1, got {}",
                c.iou_threshold
            )));
        }
        if c.min_aspect_ratio >= c.max_aspect_ratio {
            return Err(ScheduleError::InvalidConfig(format!(
                "Aspect ratio window is empty: {} ≥ {}",
                c.min_aspect_ratio, c.max_aspect_ratio
            )));
        }
        if c.min_box_area_rendered > c.max_box_area
            || c.min_box_area_photographed > c.max_box_area
        {
            return Err(ScheduleError::InvalidConfig(
                "Minimum box area exceeds maximum box area".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let config = ScheduleConfig::builder().build().unwrap();
        assert_eq!(config.dpi, 300);
        assert_eq!(config.ocr_workers, 8);
        assert_eq!(config.weeks, 19);
        assert_eq!(config.timezone, Tz::Asia__Riyadh);
        assert!(config.fallback_crop().is_none());
    }

    #[test]
    fn timezone_accepts_alias_and_iana_id() {
        let ksa = ScheduleConfig::builder().timezone("ksa").build().unwrap();
        assert_eq!(ksa.timezone, Tz::Asia__Riyadh);

        let alg = ScheduleConfig::builder().timezone("ALG").build().unwrap();
        assert_eq!(alg.timezone, Tz::Africa__Algiers);

        let paris = ScheduleConfig::builder()
            .timezone("Europe/Paris")
            .build()
            .unwrap();
        assert_eq!(paris.timezone, Tz::Europe__Paris);
    }

    #[test]
    fn unknown_timezone_is_rejected_at_build() {
        let err = ScheduleConfig::builder()
            .timezone("Mars/Olympus_Mons")
            .build()
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidConfig(_)));
        assert!(err.to_string().contains("Mars/Olympus_Mons"));
    }

    #[test]
    fn zero_weeks_is_rejected() {
        let err = ScheduleConfig::builder().weeks(0).build().unwrap_err();
        assert!(err.to_string().contains("week"));
    }

    #[test]
    fn worker_count_is_clamped_to_one() {
        let config = ScheduleConfig::builder().ocr_workers(0).build().unwrap();
        assert_eq!(config.ocr_workers, 1);
    }

    #[test]
    fn iou_threshold_out_of_range_is_rejected() {
        assert!(ScheduleConfig::builder().iou_threshold(1.5).build().is_err());
    }

    #[test]
    fn fallback_crop_is_per_profile() {
        let crop = FallbackCrop {
            page1_width_ratio: 0.8,
            page2_offset_ratio: 0.1,
        };
        let config = ScheduleConfig::builder()
            .profile(SourceProfile::Firefox)
            .fallback_crop(SourceProfile::Firefox, crop)
            .build()
            .unwrap();
        assert_eq!(config.fallback_crop(), Some(crop));

        let other = ScheduleConfig::builder()
            .fallback_crop(SourceProfile::Firefox, crop)
            .build()
            .unwrap();
        // Active profile is Chrome, which has no fallback configured.
        assert!(other.fallback_crop().is_none());
    }
}
