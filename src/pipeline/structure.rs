//! Structural anchoring: locate the header keyword and sharpen the grid.
//!
//! The anchor keyword (THURSDAY/JEUDI by default) is the one piece of text
//! whose position is known in advance: it labels the last day column of
//! the table. Finding it serves two purposes:
//!
//! 1. **Format validation** — a document without either spelling is not a
//!    schedule this pipeline understands and fails fast with
//!    [`ScheduleError::UnsupportedFormat`].
//! 2. **Grid repair** — the table's right border is often missing or too
//!    faint for contour detection, so the last day column never closes
//!    into a rectangle. A synthetic 1-px vertical separator just right of
//!    the keyword restores it. One thin line cannot meaningfully overwrite
//!    cell content.

use crate::config::ScheduleConfig;
use crate::error::ScheduleError;
use crate::ocr::OcrEngine;
use crate::pipeline::lines;
use image::{imageops, DynamicImage, GrayImage, Luma};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use std::sync::Arc;
use tracing::{debug, info};

/// Where the anchor keyword was found, in full-image coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// The spelling that matched.
    pub keyword: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Anchor {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// Locate the anchor keyword and draw the synthetic column separator.
///
/// Returns the augmented image together with the anchor. The separator
/// runs from the first horizontal line below the keyword (the header's
/// bottom border; the keyword top if no line is found) down to the bottom
/// of the image.
pub async fn detect_structure(
    image: GrayImage,
    config: &ScheduleConfig,
    engine: &Arc<dyn OcrEngine>,
) -> Result<(GrayImage, Anchor), ScheduleError> {
    let (width, height) = image.dimensions();
    let band_h = ((height as f32 * config.header_band_ratio) as u32).clamp(1, height);
    let band = imageops::crop_imm(&image, 0, 0, width, band_h).to_image();

    let engine_task = Arc::clone(engine);
    let words = tokio::task::spawn_blocking(move || {
        engine_task.read_words(&DynamicImage::ImageLuma8(band))
    })
    .await
    .map_err(|e| ScheduleError::Internal(format!("OCR task panicked: {e}")))?
    .map_err(|e| ScheduleError::Internal(format!("header OCR failed: {e}")))?;

    let anchor = words
        .iter()
        .find_map(|w| {
            let text = w.text.trim();
            config
                .keywords
                .iter()
                .find(|k| k.eq_ignore_ascii_case(text))
                .map(|k| Anchor {
                    keyword: k.clone(),
                    x: w.x,
                    y: w.y,
                    width: w.width,
                    height: w.height,
                })
        })
        .ok_or_else(|| ScheduleError::UnsupportedFormat {
            keywords: config.keywords.clone(),
        })?;

    info!(
        "Anchor keyword '{}' found at ({}, {})",
        anchor.keyword, anchor.x, anchor.y
    );

    // The first horizontal line below the keyword is the header row's
    // bottom border; starting the separator there keeps it out of any
    // text above the table.
    let search_end = (anchor.bottom() + 120).min(height);
    let separator_top = lines::horizontal_line_rows(&image, anchor.bottom(), search_end)
        .first()
        .copied()
        .unwrap_or(anchor.y);

    let separator_x = (anchor.right() + config.keyword_padding).min(width.saturating_sub(1));
    debug!("Drawing separator at x={separator_x} from y={separator_top}");

    let mut augmented = image;
    draw_filled_rect_mut(
        &mut augmented,
        Rect::at(separator_x as i32, separator_top as i32)
            .of_size(1, height - separator_top),
        Luma([0u8]),
    );

    Ok((augmented, anchor))
}
