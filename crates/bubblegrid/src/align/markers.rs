//! Fiducial marker localization.
//!
//! Each printed corner square is searched for inside a window around its
//! nominal position under the page-to-image scale. A coarse darkness scan
//! finds the best square-sized region, a centroid pass refines it to
//! sub-pixel precision. The window size bounds the tolerated page offset;
//! rotation up to a few degrees and scale drift of a few percent keep the
//! square inside the window at typical scan sizes.

use image::GrayImage;

use crate::config::ScanConfig;
use crate::layout::SheetLayout;

/// Detection outcome for one expected marker.
#[derive(Debug, Clone)]
pub struct MarkerDetection {
    /// Index of the marker in the layout's marker list.
    pub index: usize,
    /// Marker center in layout points.
    pub layout_center: [f64; 2],
    /// Detected center in image pixels (sub-pixel).
    pub image_center: [f64; 2],
    /// Darkness contrast against local paper background, in [0, 1].
    pub confidence: f32,
}

impl MarkerDetection {
    /// Whether this detection clears the configured confidence floor.
    pub fn is_found(&self, config: &ScanConfig) -> bool {
        self.confidence >= config.marker_confidence_floor
    }
}

#[inline]
fn intensity(img: &GrayImage, x: u32, y: u32) -> f32 {
    img.get_pixel(x, y)[0] as f32 / 255.0
}

/// Mean intensity over an axis-aligned box, subsampled on a coarse grid.
fn box_mean(img: &GrayImage, x0: f32, y0: f32, x1: f32, y1: f32, step: f32) -> Option<f32> {
    let (w, h) = img.dimensions();
    let x0 = x0.max(0.0);
    let y0 = y0.max(0.0);
    let x1 = x1.min(w as f32 - 1.0);
    let y1 = y1.min(h as f32 - 1.0);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let mut sum = 0.0f64;
    let mut n = 0u32;
    let mut y = y0;
    while y <= y1 {
        let mut x = x0;
        while x <= x1 {
            sum += intensity(img, x as u32, y as u32) as f64;
            n += 1;
            x += step;
        }
        y += step;
    }
    (n > 0).then(|| (sum / n as f64) as f32)
}

/// Locate every expected marker. Order matches `layout.markers`; callers
/// filter on [`MarkerDetection::is_found`].
pub fn detect_markers(
    img: &GrayImage,
    layout: &SheetLayout,
    config: &ScanConfig,
) -> Vec<MarkerDetection> {
    let (img_w, img_h) = img.dimensions();
    let sx = img_w as f32 / layout.page_width;
    let sy = img_h as f32 / layout.page_height;
    let half_win = config.marker_search_frac * img_w.max(img_h) as f32;

    layout
        .markers
        .iter()
        .enumerate()
        .map(|(index, marker)| {
            // Nominal position under pure scaling, including the flip from
            // layout y-up to raster y-down.
            let nx = marker.center[0] * sx;
            let ny = (layout.page_height - marker.center[1]) * sy;
            let size_px = marker.size * 0.5 * (sx + sy);

            let (center, confidence) =
                locate_square(img, [nx, ny], size_px, half_win);
            MarkerDetection {
                index,
                layout_center: [marker.center[0] as f64, marker.center[1] as f64],
                image_center: center,
                confidence,
            }
        })
        .collect()
}

/// Coarse-to-fine search for a dark square of side `size_px` within
/// `half_win` pixels of `nominal`. Returns (center, confidence).
fn locate_square(
    img: &GrayImage,
    nominal: [f32; 2],
    size_px: f32,
    half_win: f32,
) -> ([f64; 2], f32) {
    let coarse_step = (size_px / 4.0).max(2.0);
    let sample_step = (size_px / 12.0).max(1.0);
    let half = size_px / 2.0;

    let mut scores: Vec<f32> = Vec::new();
    let mut best_score = f32::INFINITY;
    let mut best_center = nominal;

    let mut cy = nominal[1] - half_win;
    while cy <= nominal[1] + half_win {
        let mut cx = nominal[0] - half_win;
        while cx <= nominal[0] + half_win {
            if let Some(mean) =
                box_mean(img, cx - half, cy - half, cx + half, cy + half, sample_step)
            {
                scores.push(mean);
                if mean < best_score {
                    best_score = mean;
                    best_center = [cx, cy];
                }
            }
            cx += coarse_step;
        }
        cy += coarse_step;
    }

    if scores.is_empty() {
        return ([nominal[0] as f64, nominal[1] as f64], 0.0);
    }

    // Most windows are paper; the median score is a robust background
    // estimate even with printed content nearby.
    scores.sort_by(|a, b| a.total_cmp(b));
    let background = scores[scores.len() / 2];
    let confidence = if background > 1e-3 {
        ((background - best_score) / background).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let refined = centroid_refine(img, best_center, size_px, (best_score + background) / 2.0);
    (refined, confidence)
}

/// Centroid of pixels darker than `ink_threshold` near `center`.
fn centroid_refine(
    img: &GrayImage,
    center: [f32; 2],
    size_px: f32,
    ink_threshold: f32,
) -> [f64; 2] {
    let (w, h) = img.dimensions();
    let reach = size_px * 0.75;
    let x0 = (center[0] - reach).max(0.0) as u32;
    let y0 = (center[1] - reach).max(0.0) as u32;
    let x1 = ((center[0] + reach) as u32).min(w.saturating_sub(1));
    let y1 = ((center[1] + reach) as u32).min(h.saturating_sub(1));

    let mut sum_x = 0.0f64;
    let mut sum_y = 0.0f64;
    let mut n = 0u64;
    for y in y0..=y1 {
        for x in x0..=x1 {
            if intensity(img, x, y) < ink_threshold {
                sum_x += x as f64;
                sum_y += y as f64;
                n += 1;
            }
        }
    }
    if n == 0 {
        return [center[0] as f64, center[1] as f64];
    }
    [sum_x / n as f64, sum_y / n as f64]
}
