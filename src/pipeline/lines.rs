//! Structural line detection primitives shared by the merge and box stages.
//!
//! Everything here operates on binary `GrayImage`s where foreground (ink)
//! is 255 and background is 0. Grid lines are emphasised with directional
//! morphology: an opening with a 1×k kernel keeps only runs at least `k`
//! pixels long in the kernel's direction, wiping out text strokes while
//! preserving table borders. imageproc's binary morphology is isotropic
//! (`Norm`-ball kernels), so the directional erode/dilate pair is written
//! out as row/column run filters.

use image::{GrayImage, Luma};
use imageproc::contours::find_contours;
use imageproc::contrast::{threshold, ThresholdType};

const FG: u8 = 255;
const BG: u8 = 0;

/// Binarise with ink as foreground: pixels ≤ 128 (dark) become 255.
pub fn binarize_inverted(image: &GrayImage) -> GrayImage {
    threshold(image, 128, ThresholdType::BinaryInverted)
}

/// Morphological opening with a vertical 1×`len` kernel: keeps only
/// vertical runs at least `len` pixels tall.
pub fn open_vertical(binary: &GrayImage, len: u32) -> GrayImage {
    dilate_columns(&erode_columns(binary, len), len)
}

/// Morphological opening with a horizontal `len`×1 kernel: keeps only
/// horizontal runs at least `len` pixels wide.
pub fn open_horizontal(binary: &GrayImage, len: u32) -> GrayImage {
    dilate_rows(&erode_rows(binary, len), len)
}

/// Pixel-wise union of two binary images.
pub fn union(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let mut out = a.clone();
    for (po, pb) in out.pixels_mut().zip(b.pixels()) {
        if pb[0] != BG {
            *po = Luma([FG]);
        }
    }
    out
}

/// Invert a binary image.
pub fn invert(image: &GrayImage) -> GrayImage {
    let mut out = image.clone();
    for p in out.pixels_mut() {
        p[0] = if p[0] == BG { FG } else { BG };
    }
    out
}

fn erode_rows(image: &GrayImage, len: u32) -> GrayImage {
    directional_filter(image, len, true, true)
}

fn dilate_rows(image: &GrayImage, len: u32) -> GrayImage {
    directional_filter(image, len, true, false)
}

fn erode_columns(image: &GrayImage, len: u32) -> GrayImage {
    directional_filter(image, len, false, true)
}

fn dilate_columns(image: &GrayImage, len: u32) -> GrayImage {
    directional_filter(image, len, false, false)
}

/// Sliding-window erosion/dilation along rows or columns.
///
/// Erosion keeps a pixel only when the whole window is foreground;
/// dilation sets it when any window pixel is. Prefix sums keep this
/// linear in the image size regardless of kernel length.
fn directional_filter(image: &GrayImage, len: u32, rows: bool, erode: bool) -> GrayImage {
    let (width, height) = image.dimensions();
    let len = len.max(1);
    let mut out = GrayImage::from_pixel(width, height, Luma([BG]));

    let (outer, inner) = if rows { (height, width) } else { (width, height) };
    let half_before = (len - 1) / 2;
    let half_after = len / 2;

    let mut prefix: Vec<u32> = Vec::with_capacity(inner as usize + 1);
    for o in 0..outer {
        prefix.clear();
        prefix.push(0);
        for i in 0..inner {
            let (x, y) = if rows { (i, o) } else { (o, i) };
            let fg = (image.get_pixel(x, y)[0] != BG) as u32;
            prefix.push(prefix[i as usize] + fg);
        }
        for i in 0..inner {
            let lo = i.saturating_sub(half_before);
            let hi = (i + half_after + 1).min(inner);
            let window = hi - lo;
            let count = prefix[hi as usize] - prefix[lo as usize];
            let on = if erode { count == window } else { count > 0 };
            if on {
                let (x, y) = if rows { (i, o) } else { (o, i) };
                out.put_pixel(x, y, Luma([FG]));
            }
        }
    }
    out
}

/// A detected vertical line segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Horizontal center of the segment.
    pub x: u32,
    pub y_start: u32,
    pub y_end: u32,
}

impl Segment {
    pub fn len(&self) -> u32 {
        self.y_end - self.y_start
    }
}

/// Extract vertical line segments from an opened binary image: connected
/// components at least `min_len` tall, reported at their x-center.
pub fn vertical_segments(opened: &GrayImage, min_len: u32) -> Vec<Segment> {
    let mut segments: Vec<Segment> = find_contours::<i32>(opened)
        .iter()
        .filter_map(|contour| {
            let xs = contour.points.iter().map(|p| p.x);
            let ys = contour.points.iter().map(|p| p.y);
            let (min_x, max_x) = min_max(xs)?;
            let (min_y, max_y) = min_max(ys)?;
            let height = (max_y - min_y + 1) as u32;
            if height < min_len {
                return None;
            }
            Some(Segment {
                x: ((min_x + max_x) / 2).max(0) as u32,
                y_start: min_y.max(0) as u32,
                y_end: (max_y.max(0) as u32) + 1,
            })
        })
        .collect();
    segments.sort_by_key(|s| (s.x, s.y_start));
    segments
}

fn min_max(iter: impl Iterator<Item = i32>) -> Option<(i32, i32)> {
    let mut min = None;
    let mut max = None;
    for v in iter {
        min = Some(min.map_or(v, |m: i32| m.min(v)));
        max = Some(max.map_or(v, |m: i32| m.max(v)));
    }
    Some((min?, max?))
}

/// A group of vertical segments whose x-centers lie within the cluster
/// tolerance of one another (a table border, possibly drawn or broken into
/// several strokes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub min_x: u32,
    pub max_x: u32,
    pub count: usize,
}

/// Cluster segment x-centers. Input order does not matter; segments are
/// grouped left to right and a new cluster starts when the gap to the
/// previous center exceeds `tolerance`.
pub fn cluster_x(segments: &[Segment], tolerance: u32) -> Vec<Cluster> {
    let mut xs: Vec<u32> = segments.iter().map(|s| s.x).collect();
    xs.sort_unstable();

    let mut clusters: Vec<Cluster> = Vec::new();
    for x in xs {
        match clusters.last_mut() {
            Some(c) if x - c.max_x <= tolerance => {
                c.max_x = x;
                c.count += 1;
            }
            _ => clusters.push(Cluster {
                min_x: x,
                max_x: x,
                count: 1,
            }),
        }
    }
    clusters
}

/// Fraction of a row's pixels that must be dark for the row to count as
/// part of a horizontal line.
const LINE_FILL_RATIO: f64 = 0.3;
/// Grayscale level below which a pixel counts as dark for line scanning.
const DARK_LEVEL: u8 = 200;

/// Find horizontal lines in `[y_start, y_end)` of a *grayscale* image by
/// row density: rows where at least 30% of pixels are dark, grouped into
/// runs, reported at the run's middle row.
pub fn horizontal_line_rows(image: &GrayImage, y_start: u32, y_end: u32) -> Vec<u32> {
    let (width, height) = image.dimensions();
    let y_end = y_end.min(height);
    if y_start >= y_end || width == 0 {
        return Vec::new();
    }

    let required = (width as f64 * LINE_FILL_RATIO) as u32;
    let dark_count = |y: u32| -> u32 {
        (0..width)
            .filter(|&x| image.get_pixel(x, y)[0] < DARK_LEVEL)
            .count() as u32
    };

    let mut rows = Vec::new();
    let mut y = y_start;
    while y < y_end {
        if dark_count(y) >= required {
            let run_start = y;
            // Runs tolerate a softer interior, as anti-aliased line edges
            // thin out toward the run boundary.
            while y < y_end && dark_count(y) >= required / 2 {
                y += 1;
            }
            rows.push((run_start + y) / 2);
        } else {
            y += 1;
        }
    }
    rows
}
