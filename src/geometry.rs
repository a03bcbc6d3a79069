//! Cell rectangles: IoU deduplication and reading-order sorting.
//!
//! Contour detection over a morphologically cleaned grid image produces the
//! same physical cell more than once (outer and inner border of a thick
//! line, nested contours). Downstream stages need each cell exactly once
//! and in the order a reader scans the table, so this module owns the two
//! operations every candidate rectangle passes through: overlap-based
//! dedup and row-banded sorting.
//!
//! Both operations are deterministic functions of the box *set* — the
//! outcome never depends on the order contours were discovered in.

use serde::{Deserialize, Serialize};

/// Classification assigned to a cell once its text is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CellKind {
    /// Day-name cell in the header row.
    Header,
    /// Cell inside the time column (the row's `HH:MM-HH:MM` label).
    TimeReference,
    /// A course cell: the only kind that reaches the course parser.
    CourseCell,
    /// Not yet classified, empty, or unreadable.
    #[default]
    Unknown,
}

/// A detected table cell: a rectangle in image pixel space plus the OCR
/// text and classification attached by later stages.
///
/// The rectangle always lies fully within its source image; the extractor
/// filters anything else out before this type escapes that stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Raw OCR text, filled in by the extraction orchestrator.
    pub text: Option<String>,
    pub kind: CellKind,
}

impl CellBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> CellBox {
        CellBox {
            x,
            y,
            width,
            height,
            text: None,
            kind: CellKind::Unknown,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn center_x(&self) -> u32 {
        self.x + self.width / 2
    }

    pub fn center_y(&self) -> u32 {
        self.y + self.height / 2
    }

    /// Intersection-over-union with another rectangle, in `[0, 1]`.
    pub fn iou(&self, other: &CellBox) -> f64 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if left >= right || top >= bottom {
            return 0.0;
        }

        let intersection = (right - left) as u64 * (bottom - top) as u64;
        let union = self.area() + other.area() - intersection;
        intersection as f64 / union as f64
    }

    /// Whether two boxes sit in the same visual row: their vertical centers
    /// fall within `tolerance` pixels of each other.
    pub fn same_row(&self, other: &CellBox, tolerance: u32) -> bool {
        self.center_y().abs_diff(other.center_y()) <= tolerance
    }
}

/// Drop overlapping duplicates so that no surviving pair exceeds
/// `iou_threshold`.
///
/// For each violating pair the smaller-area box is discarded; equal areas
/// fall back to reading-order precedence (smaller row, then smaller
/// column). Candidates are first brought into that canonical order, so the
/// survivors are a pure function of the input *set* — shuffling the input
/// cannot change the result.
pub fn dedup_overlapping(boxes: Vec<CellBox>, iou_threshold: f64) -> Vec<CellBox> {
    let mut ordered = boxes;
    ordered.sort_by(|a, b| {
        b.area()
            .cmp(&a.area())
            .then(a.y.cmp(&b.y))
            .then(a.x.cmp(&b.x))
    });

    let mut kept: Vec<CellBox> = Vec::with_capacity(ordered.len());
    for candidate in ordered {
        let duplicate = kept.iter().any(|k| k.iou(&candidate) > iou_threshold);
        if !duplicate {
            kept.push(candidate);
        }
    }
    kept
}

/// Sort boxes into reading order: top-to-bottom by row band, then
/// left-to-right within a band.
///
/// Boxes whose vertical centers lie within `row_band_tolerance` of the
/// band's first member count as the same row, which keeps slightly ragged
/// scans from interleaving two rows.
pub fn sort_reading_order(boxes: &mut Vec<CellBox>, row_band_tolerance: u32) {
    boxes.sort_by(|a, b| a.center_y().cmp(&b.center_y()).then(a.x.cmp(&b.x)));

    // Assign a band index by scanning the center-sorted list; a new band
    // starts when the center drifts past the tolerance from the band start.
    let mut bands: Vec<(usize, CellBox)> = Vec::with_capacity(boxes.len());
    let mut band = 0usize;
    let mut band_anchor: Option<u32> = None;
    for b in boxes.drain(..) {
        let cy = b.center_y();
        match band_anchor {
            Some(anchor) if cy.abs_diff(anchor) <= row_band_tolerance => {}
            Some(_) => {
                band += 1;
                band_anchor = Some(cy);
            }
            None => band_anchor = Some(cy),
        }
        bands.push((band, b));
    }

    bands.sort_by(|(band_a, a), (band_b, b)| band_a.cmp(band_b).then(a.x.cmp(&b.x)));
    boxes.extend(bands.into_iter().map(|(_, b)| b));
}

/// Band index of the first (topmost) row, paired with a predicate for
/// membership — used by the orchestrator to pick out the header row.
pub fn first_row_indices(boxes: &[CellBox], row_band_tolerance: u32) -> Vec<usize> {
    let Some(first) = boxes.first() else {
        return Vec::new();
    };
    boxes
        .iter()
        .enumerate()
        .filter(|(_, b)| b.same_row(first, row_band_tolerance))
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(x: u32, y: u32, w: u32, h: u32) -> CellBox {
        CellBox::new(x, y, w, h)
    }

    #[test]
    fn iou_disjoint_is_zero() {
        assert_eq!(boxed(0, 0, 10, 10).iou(&boxed(20, 20, 10, 10)), 0.0);
    }

    #[test]
    fn iou_identical_is_one() {
        let b = boxed(5, 5, 40, 20);
        assert!((b.iou(&b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn iou_half_overlap() {
        // 10x10 boxes overlapping in a 5x10 strip: 50 / (100+100-50) = 1/3
        let a = boxed(0, 0, 10, 10);
        let b = boxed(5, 0, 10, 10);
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn dedup_keeps_larger_of_overlapping_pair() {
        let small = boxed(2, 2, 50, 50);
        let large = boxed(0, 0, 60, 60);
        let kept = dedup_overlapping(vec![small.clone(), large.clone()], 0.1);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].area(), large.area());
    }

    #[test]
    fn dedup_result_is_order_independent() {
        let a = boxed(0, 0, 60, 60);
        let b = boxed(2, 2, 50, 50);
        let c = boxed(200, 0, 60, 60);
        let d = boxed(202, 2, 50, 50);

        let forward = dedup_overlapping(vec![a.clone(), b.clone(), c.clone(), d.clone()], 0.1);
        let reversed = dedup_overlapping(vec![d, c, b, a], 0.1);
        assert_eq!(forward, reversed);
        assert_eq!(forward.len(), 2);
    }

    #[test]
    fn dedup_guarantees_pairwise_iou_bound() {
        let candidates = vec![
            boxed(0, 0, 100, 40),
            boxed(5, 2, 100, 40),
            boxed(10, 4, 100, 40),
            boxed(300, 0, 100, 40),
            boxed(0, 200, 100, 40),
            boxed(2, 198, 100, 40),
        ];
        let kept = dedup_overlapping(candidates, 0.1);
        for i in 0..kept.len() {
            for j in (i + 1)..kept.len() {
                assert!(
                    kept[i].iou(&kept[j]) <= 0.1,
                    "boxes {i} and {j} violate the IoU bound"
                );
            }
        }
    }

    #[test]
    fn dedup_equal_area_tie_keeps_reading_order_first() {
        // Same area, heavy overlap: the one with smaller row wins.
        let upper = boxed(0, 0, 50, 50);
        let lower = boxed(0, 4, 50, 50);
        let kept = dedup_overlapping(vec![lower.clone(), upper.clone()], 0.1);
        assert_eq!(kept, vec![upper]);
    }

    #[test]
    fn reading_order_bands_ragged_rows() {
        // Two rows; the second cell of row one sits 8px lower than the first.
        let mut boxes = vec![
            boxed(300, 108, 80, 40), // row 1, col 2 (ragged)
            boxed(100, 400, 80, 40), // row 2, col 1
            boxed(100, 100, 80, 40), // row 1, col 1
            boxed(500, 100, 80, 40), // row 1, col 3
        ];
        sort_reading_order(&mut boxes, 30);
        let xs: Vec<u32> = boxes.iter().map(|b| b.x).collect();
        let ys: Vec<u32> = boxes.iter().map(|b| b.y).collect();
        assert_eq!(xs, vec![100, 300, 500, 100]);
        assert_eq!(ys, vec![100, 108, 100, 400]);
    }

    #[test]
    fn reading_order_is_monotone_in_row_then_column() {
        let mut boxes = vec![
            boxed(400, 210, 60, 30),
            boxed(100, 200, 60, 30),
            boxed(250, 205, 60, 30),
            boxed(100, 20, 60, 30),
            boxed(400, 25, 60, 30),
            boxed(250, 18, 60, 30),
        ];
        sort_reading_order(&mut boxes, 25);
        for pair in boxes.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let same_band = a.same_row(b, 25);
            assert!(
                a.center_y() <= b.center_y() + 25,
                "row order violated: {a:?} before {b:?}"
            );
            if same_band {
                assert!(a.x <= b.x, "column order violated: {a:?} before {b:?}");
            }
        }
    }

    #[test]
    fn first_row_picks_the_top_band_only() {
        let mut boxes = vec![
            boxed(100, 20, 60, 30),
            boxed(250, 18, 60, 30),
            boxed(100, 200, 60, 30),
        ];
        sort_reading_order(&mut boxes, 25);
        let header = first_row_indices(&boxes, 25);
        assert_eq!(header, vec![0, 1]);
    }
}
