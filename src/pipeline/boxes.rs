//! Cell extraction: the augmented table image → ordered cell rectangles.
//!
//! The grid is isolated with directional morphology (long vertical and
//! horizontal runs survive, text does not), thickened to close hairline
//! gaps, then inverted so each cell interior becomes its own connected
//! component. Outer contours of those components give the candidate
//! rectangles; size/area/aspect filters drop line debris and the table
//! frame itself, IoU dedup collapses double detections, and the survivors
//! are sorted into reading order.

use crate::config::ScheduleConfig;
use crate::error::ScheduleError;
use crate::geometry::{dedup_overlapping, sort_reading_order, CellBox};
use crate::pipeline::lines;
use crate::pipeline::merge::SourceKind;
use image::GrayImage;
use imageproc::contours::find_contours;
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use tracing::{debug, info};

/// Extract, filter, deduplicate, and order the table's cells.
///
/// Returns boxes carrying no text yet, in reading order. Zero survivors is
/// [`ScheduleError::Extraction`] — without cells the table has no usable
/// structure and nothing downstream can recover.
pub fn extract_boxes(
    image: &GrayImage,
    kind: SourceKind,
    config: &ScheduleConfig,
) -> Result<Vec<CellBox>, ScheduleError> {
    let (width, height) = image.dimensions();
    let kernel = (width / config.line_kernel_divisor).max(3);

    let binary = lines::binarize_inverted(image);
    let vertical = lines::open_vertical(&binary, kernel);
    let horizontal = lines::open_horizontal(&binary, kernel);
    let grid = lines::union(&vertical, &horizontal);

    // Thicken the lattice so hairline gaps at intersections cannot leak
    // two cells into one component, then flip to make cell interiors the
    // foreground.
    let grid = dilate(&grid, Norm::LInf, 2);
    let cells = lines::invert(&grid);

    let contours = find_contours::<i32>(&cells);
    let candidates = contours.len();
    debug!("{candidates} candidate contours");

    let min_area = config.min_box_area_for(kind == SourceKind::Rendered);

    let mut boxes: Vec<CellBox> = contours
        .iter()
        .filter_map(|contour| bounding_box(contour.points.iter().map(|p| (p.x, p.y))))
        .filter(|b| b.right() <= width && b.bottom() <= height)
        .filter(|b| {
            let aspect = b.width as f32 / b.height as f32;
            b.width >= config.min_box_width
                && b.height >= config.min_box_height
                && b.area() >= min_area
                && b.area() <= config.max_box_area
                && aspect >= config.min_aspect_ratio
                && aspect <= config.max_aspect_ratio
        })
        .collect();

    boxes = dedup_overlapping(boxes, config.iou_threshold);
    sort_reading_order(&mut boxes, config.row_band_tolerance);

    info!(
        "Extracted {} cell(s) from {candidates} candidate contour(s)",
        boxes.len()
    );

    if boxes.is_empty() {
        return Err(ScheduleError::Extraction { candidates });
    }
    Ok(boxes)
}

/// Axis-aligned bounding box of a point set.
fn bounding_box(points: impl Iterator<Item = (i32, i32)>) -> Option<CellBox> {
    let mut min_x = i32::MAX;
    let mut min_y = i32::MAX;
    let mut max_x = i32::MIN;
    let mut max_y = i32::MIN;
    let mut any = false;
    for (x, y) in points {
        any = true;
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    if !any || min_x < 0 || min_y < 0 {
        return None;
    }
    Some(CellBox::new(
        min_x as u32,
        min_y as u32,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    ))
}
