//! Page normalisation: raw document bytes → one raster image of the table.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves rasterisation onto the
//! blocking thread pool so the async workers never stall on CPU-heavy
//! rendering. The same applies to the page-2 header OCR call.
//!
//! ## Two-page schedules
//!
//! Portals print wide schedules across two pages: the rightmost day
//! columns overflow onto page 2, which repeats the header band. Merging is
//! therefore horizontal: page 1 is cropped at its rightmost vertical table
//! border (found by directional morphology + x-clustering), page 2 loses
//! its duplicated header band (found by keyword OCR + horizontal-line
//! scanning), and the crops are concatenated side by side with page 2 kept
//! at its own vertical offset so the rows stay aligned.
//!
//! Detection failure is a classified error unless the active source
//! profile configures an explicit fallback crop — a wrong silent crop
//! produces garbage courses, which is strictly worse than a clear refusal.

use crate::config::ScheduleConfig;
use crate::error::ScheduleError;
use crate::ocr::OcrEngine;
use crate::pipeline::lines;
use image::{imageops, DynamicImage, GrayImage, Luma};
use pdfium_render::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Size/type-validated document bytes, as handed over by the upload
/// collaborator. The core never sniffs file types itself.
#[derive(Debug, Clone)]
pub enum ScheduleSource {
    /// A PDF document (1 or 2 pages).
    Pdf(Vec<u8>),
    /// An already-rasterised schedule (photo or screenshot).
    Image(Vec<u8>),
}

/// How the working image was produced. Selects the box-area threshold:
/// photographed sources blur cell borders and need the looser one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Rendered,
    Photographed,
}

/// Output of the merge stage: the full table as one grayscale image.
#[derive(Debug)]
pub struct MergedImage {
    pub image: GrayImage,
    pub kind: SourceKind,
}

/// Normalise the source document into a single raster image.
pub async fn merge_pages(
    source: &ScheduleSource,
    config: &ScheduleConfig,
    engine: &Arc<dyn OcrEngine>,
) -> Result<MergedImage, ScheduleError> {
    match source {
        ScheduleSource::Image(bytes) => {
            let image = image::load_from_memory(bytes)
                .map_err(|e| ScheduleError::InvalidImage {
                    detail: e.to_string(),
                })?
                .to_luma8();
            info!("Loaded image source: {}x{} px", image.width(), image.height());
            Ok(MergedImage {
                image,
                kind: SourceKind::Photographed,
            })
        }
        ScheduleSource::Pdf(bytes) => {
            let bytes = bytes.clone();
            let dpi = config.dpi;
            let (mut pages, has_text) =
                tokio::task::spawn_blocking(move || rasterize_pdf_blocking(&bytes, dpi))
                    .await
                    .map_err(|e| ScheduleError::Internal(format!("Render task panicked: {e}")))??;

            // A PDF without extractable text is a scan wrapped in a PDF
            // shell; its blurred cell borders need the photographed
            // thresholds downstream.
            let kind = if has_text {
                SourceKind::Rendered
            } else {
                SourceKind::Photographed
            };
            debug!("Rasterised {} page(s), source kind: {kind:?}", pages.len());

            let image = match pages.len() {
                1 => pages.remove(0),
                2 => {
                    let page2 = pages.remove(1);
                    let page1 = pages.remove(0);
                    merge_two_pages(page1, page2, config, engine).await?
                }
                n => return Err(ScheduleError::PageCount { pages: n }),
            };
            Ok(MergedImage { image, kind })
        }
    }
}

/// Blocking implementation of PDF rasterisation.
///
/// Returns the rendered pages plus whether page 1 carries extractable text
/// (a digitally printed document rather than a scan).
fn rasterize_pdf_blocking(
    bytes: &[u8],
    dpi: u32,
) -> Result<(Vec<GrayImage>, bool), ScheduleError> {
    let pdfium = Pdfium::default();

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| ScheduleError::InvalidDocument {
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!("PDF loaded: {} page(s)", total);

    if total == 0 {
        return Err(ScheduleError::InvalidDocument {
            detail: "document has no pages".to_string(),
        });
    }
    if total > 2 {
        return Err(ScheduleError::PageCount { pages: total });
    }

    let mut images = Vec::with_capacity(total);
    let mut has_text = false;

    for idx in 0..total {
        let page = pages
            .get(idx as u16)
            .map_err(|e| ScheduleError::InvalidDocument {
                detail: format!("failed to load page {}: {e:?}", idx + 1),
            })?;

        if idx == 0 {
            has_text = page
                .text()
                .map(|t| !t.all().trim().is_empty())
                .unwrap_or(false);
        }

        // Points are 1/72 inch; scale the render so the page comes out at
        // the configured DPI.
        let target_width = (page.width().value / 72.0 * dpi as f32).round().max(1.0) as i32;
        let render_config = PdfRenderConfig::new().set_target_width(target_width);

        let bitmap =
            page.render_with_config(&render_config)
                .map_err(|e| ScheduleError::InvalidDocument {
                    detail: format!("rasterisation failed for page {}: {e:?}", idx + 1),
                })?;

        let image = bitmap.as_image().to_luma8();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    Ok((images, has_text))
}

/// Merge a two-page schedule into one image.
pub(crate) async fn merge_two_pages(
    page1: GrayImage,
    page2: GrayImage,
    config: &ScheduleConfig,
    engine: &Arc<dyn OcrEngine>,
) -> Result<GrayImage, ScheduleError> {
    let (crop_x, offset_y) = match page1_crop_boundary(&page1, config) {
        Ok(x) => (x, page2_header_offset(&page2, config, engine).await?),
        Err(e) => {
            let Some(fallback) = config.fallback_crop() else {
                return Err(e);
            };
            warn!(
                "Boundary detection failed ({e}); applying configured {:?} fallback crop",
                config.profile
            );
            (
                (page1.width() as f32 * fallback.page1_width_ratio).round() as u32,
                (page2.height() as f32 * fallback.page2_offset_ratio).round() as u32,
            )
        }
    };

    info!(
        "Merging pages: page-1 crop at x={crop_x}, page-2 header offset y={offset_y}"
    );
    Ok(concat_pages(&page1, crop_x, &page2, offset_y))
}

/// Locate the page-1 right crop boundary: the rightmost cluster of
/// vertical table-border segments.
fn page1_crop_boundary(page1: &GrayImage, config: &ScheduleConfig) -> Result<u32, ScheduleError> {
    let kernel = (page1.width() / config.line_kernel_divisor).max(3);
    let binary = lines::binarize_inverted(page1);
    let opened = lines::open_vertical(&binary, kernel);
    let segments = lines::vertical_segments(&opened, config.vertical_line_min_len);

    let clusters = lines::cluster_x(&segments, config.line_cluster_tolerance);

    // A stray rightmost segment must not define the crop; only a cluster
    // with enough strokes counts as the table border.
    let rightmost = clusters
        .iter()
        .rev()
        .find(|c| c.count >= config.min_line_count)
        .ok_or_else(|| ScheduleError::BoundaryDetection {
            page: 1,
            found: clusters.iter().map(|c| c.count).max().unwrap_or(0),
            required: config.min_line_count,
        })?;

    debug!(
        "Page 1: {} vertical segment(s) in {} cluster(s), rightmost at x={}..{}",
        segments.len(),
        clusters.len(),
        rightmost.min_x,
        rightmost.max_x
    );
    Ok((rightmost.max_x + 1).min(page1.width()))
}

/// Locate the row on page 2 below which real data begins.
///
/// The portal repeats the header band at the top of page 2. If the anchor
/// keyword shows up there, everything above the first horizontal line
/// below it is the duplicate and gets cropped away; with no keyword there
/// is no duplicate and nothing to remove.
async fn page2_header_offset(
    page2: &GrayImage,
    config: &ScheduleConfig,
    engine: &Arc<dyn OcrEngine>,
) -> Result<u32, ScheduleError> {
    let band_h = ((page2.height() as f32 * config.header_band_ratio) as u32)
        .clamp(1, page2.height());
    let band = imageops::crop_imm(page2, 0, 0, page2.width(), band_h).to_image();

    let engine = Arc::clone(engine);
    let words = tokio::task::spawn_blocking(move || {
        engine.read_words(&DynamicImage::ImageLuma8(band))
    })
    .await
    .map_err(|e| ScheduleError::Internal(format!("OCR task panicked: {e}")))?
    .map_err(|e| ScheduleError::Internal(format!("page-2 header OCR failed: {e}")))?;

    let keyword_bottom = words
        .iter()
        .filter(|w| {
            config
                .keywords
                .iter()
                .any(|k| k.eq_ignore_ascii_case(w.text.trim()))
        })
        .map(|w| w.y + w.height)
        .max();

    let Some(bottom) = keyword_bottom else {
        debug!("Page 2: no duplicated header found");
        return Ok(0);
    };

    let search_end = (bottom + 120).min(page2.height());
    let rows = lines::horizontal_line_rows(page2, bottom, search_end);
    let offset = match rows.first() {
        Some(&line_y) => line_y + 5,
        // No closing line under the keyword; crop just below the text.
        None => bottom + 10,
    };
    debug!("Page 2: duplicated header ends at y={offset}");
    Ok(offset.min(page2.height()))
}

/// Place the page-1 crop and the page-2 remainder side by side.
///
/// Page 2 keeps its own vertical offset so its rows stay aligned with
/// page 1's; the removed header band is left blank.
fn concat_pages(page1: &GrayImage, crop_x: u32, page2: &GrayImage, offset_y: u32) -> GrayImage {
    let crop_x = crop_x.min(page1.width());
    let offset_y = offset_y.min(page2.height());

    let width = crop_x + page2.width();
    let height = page1.height().max(page2.height());
    let mut merged = GrayImage::from_pixel(width.max(1), height.max(1), Luma([255]));

    let left = imageops::crop_imm(page1, 0, 0, crop_x, page1.height()).to_image();
    imageops::replace(&mut merged, &left, 0, 0);

    let right = imageops::crop_imm(
        page2,
        0,
        offset_y,
        page2.width(),
        page2.height() - offset_y,
    )
    .to_image();
    imageops::replace(&mut merged, &right, crop_x as i64, offset_y as i64);

    merged
}
