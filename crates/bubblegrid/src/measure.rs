//! Per-bubble fill measurement.
//!
//! Each bubble's layout region is mapped through the sheet transform and
//! sampled on a sub-pixel grid. The ink decision is local: a sample counts
//! as marked when it is darker than a threshold derived from the paper
//! background in an annulus around the bubble, which absorbs lighting
//! variance across the page.

use image::GrayImage;

use crate::align::ScanTransform;
use crate::config::ScanConfig;

/// Background annulus radii, as multiples of the bubble radius. The inner
/// bound clears the printed outline; the outer bound stays inside the gap
/// to neighboring bubbles.
const BACKGROUND_ANNULUS: (f32, f32) = (1.5, 2.2);

/// Fill measurement for one bubble in one scanned image.
///
/// Created per bubble per image and discarded after classification.
#[derive(Debug, Clone, Copy)]
pub struct BubbleMeasurement {
    /// Fraction of sampled pixels classified as ink, in [0, 1].
    pub fill_ratio: f32,
    /// Number of interior samples taken.
    pub samples: u32,
    /// False when the mapped region fell (partly) outside the image and
    /// the measurement is unreliable.
    pub in_image: bool,
}

impl BubbleMeasurement {
    fn out_of_image() -> Self {
        Self {
            fill_ratio: 0.0,
            samples: 0,
            in_image: false,
        }
    }
}

/// Sample a grayscale image at sub-pixel position using bilinear
/// interpolation. Returns intensity in [0, 1] or `None` out of bounds.
#[inline]
pub(crate) fn bilinear_sample_checked(img: &GrayImage, x: f32, y: f32) -> Option<f32> {
    let (w, h) = img.dimensions();
    if w < 2 || h < 2 || x < 0.0 || y < 0.0 {
        return None;
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    if x0 >= w - 1 || y0 >= h - 1 {
        return None;
    }

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let p00 = img.get_pixel(x0, y0)[0] as f32;
    let p10 = img.get_pixel(x0 + 1, y0)[0] as f32;
    let p01 = img.get_pixel(x0, y0 + 1)[0] as f32;
    let p11 = img.get_pixel(x0 + 1, y0 + 1)[0] as f32;

    let top = p00 * (1.0 - fx) + p10 * fx;
    let bottom = p01 * (1.0 - fx) + p11 * fx;
    Some((top * (1.0 - fy) + bottom * fy) / 255.0)
}

/// Measure the fill ratio of one bubble region.
///
/// `center` and `radius` are in layout points; the transform maps them into
/// image pixels. Runs independently per bubble: read-only image and
/// transform, no shared mutable state.
pub fn measure_bubble(
    img: &GrayImage,
    transform: &ScanTransform,
    center: [f32; 2],
    radius: f32,
    config: &ScanConfig,
) -> BubbleMeasurement {
    let c = transform.project(center[0] as f64, center[1] as f64);
    let r_px = radius as f64 * transform.mean_scale();
    let (cx, cy) = (c[0] as f32, c[1] as f32);
    let r = r_px as f32;

    let r_inner = r * (1.0 - config.sample_border_frac);
    let r_bg_lo = r * BACKGROUND_ANNULUS.0;
    let r_bg_hi = r * BACKGROUND_ANNULUS.1;
    let step = config.sample_step_px.max(0.25);

    // One grid pass collects interior samples and background annulus
    // samples together.
    let mut interior: Vec<f32> = Vec::new();
    let mut background: Vec<f32> = Vec::new();
    let mut clipped = false;

    let mut dy = -r_bg_hi;
    while dy <= r_bg_hi {
        let mut dx = -r_bg_hi;
        while dx <= r_bg_hi {
            let dist = (dx * dx + dy * dy).sqrt();
            if dist <= r_inner {
                match bilinear_sample_checked(img, cx + dx, cy + dy) {
                    Some(v) => interior.push(v),
                    None => clipped = true,
                }
            } else if dist >= r_bg_lo && dist <= r_bg_hi {
                if let Some(v) = bilinear_sample_checked(img, cx + dx, cy + dy) {
                    background.push(v);
                }
            }
            dx += step;
        }
        dy += step;
    }

    if clipped || interior.is_empty() || background.is_empty() {
        return BubbleMeasurement::out_of_image();
    }

    // Median background resists ink bleeding in from neighboring bubbles
    // and printed labels inside the annulus.
    background.sort_by(|a, b| a.total_cmp(b));
    let bg = background[background.len() / 2];
    let ink_threshold = bg * config.local_contrast_ratio;

    let marked = interior.iter().filter(|&&v| v < ink_threshold).count();
    BubbleMeasurement {
        fill_ratio: marked as f32 / interior.len() as f32,
        samples: interior.len() as u32,
        in_image: true,
    }
}
