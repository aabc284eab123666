//! Diagnostic overlay rendering.
//!
//! Draws every bubble's classification outcome on top of the scan so
//! alignment and threshold problems are visible at a glance. Purely a
//! debugging aid; nothing downstream consumes it.

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::align::{align, AlignmentError, ScanTransform};
use crate::classify::{classify_digit, classify_question, DigitReading};
use crate::config::ScanConfig;
use crate::layout::SheetLayout;
use crate::measure::{measure_bubble, BubbleMeasurement};

const SELECTED: Rgb<u8> = Rgb([46, 180, 74]);
const FLAGGED: Rgb<u8> = Rgb([219, 58, 52]);
const UNMARKED: Rgb<u8> = Rgb([150, 150, 150]);
const MARKER_BOX: Rgb<u8> = Rgb([66, 90, 219]);

/// Align the scan and render the annotated overlay.
pub fn render_overlay(
    img: &GrayImage,
    layout: &SheetLayout,
    config: &ScanConfig,
) -> Result<RgbImage, AlignmentError> {
    let transform = align(img, layout, config)?;
    Ok(render_with_transform(img, layout, &transform, config))
}

/// Render the overlay against an already-fitted transform.
pub fn render_with_transform(
    img: &GrayImage,
    layout: &SheetLayout,
    transform: &ScanTransform,
    config: &ScanConfig,
) -> RgbImage {
    let mut canvas = RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let v = img.get_pixel(x, y)[0];
        Rgb([v, v, v])
    });

    for marker in &layout.markers {
        let c = transform.project(marker.center[0] as f64, marker.center[1] as f64);
        let half = (marker.size as f64 * transform.mean_scale() / 2.0) as i32;
        let rect = Rect::at(c[0] as i32 - half, c[1] as i32 - half)
            .of_size((2 * half).max(2) as u32, (2 * half).max(2) as u32);
        draw_hollow_rect_mut(&mut canvas, rect, MARKER_BOX);
    }

    for question in &layout.questions {
        let measurements: Vec<(char, BubbleMeasurement)> = question
            .bubbles
            .iter()
            .map(|b| (b.option, measure_bubble(img, transform, b.center, b.radius, config)))
            .collect();
        let selected = classify_question(&measurements, config);
        let multi_mark = selected.len() > 1;

        for (bubble, (_, m)) in question.bubbles.iter().zip(&measurements) {
            let color = if selected.contains(&bubble.option) {
                if multi_mark { FLAGGED } else { SELECTED }
            } else {
                UNMARKED
            };
            draw_bubble(&mut canvas, transform, bubble.center, bubble.radius, m, color);
        }
    }

    for column in &layout.id_columns {
        let measurements: Vec<(u8, BubbleMeasurement)> = column
            .bubbles
            .iter()
            .map(|b| (b.value, measure_bubble(img, transform, b.center, b.radius, config)))
            .collect();
        let reading = classify_digit(&measurements, config);

        for (bubble, (_, m)) in column.bubbles.iter().zip(&measurements) {
            let color = match reading {
                DigitReading::Digit(v) if v == bubble.value => SELECTED,
                DigitReading::Ambiguous { second_fill, .. }
                    if m.fill_ratio >= second_fill - f32::EPSILON && m.fill_ratio > 0.0 =>
                {
                    FLAGGED
                }
                _ => UNMARKED,
            };
            draw_bubble(&mut canvas, transform, bubble.center, bubble.radius, m, color);
        }
    }

    canvas
}

/// Outline a bubble; ring thickness encodes the measured fill ratio.
fn draw_bubble(
    canvas: &mut RgbImage,
    transform: &ScanTransform,
    center: [f32; 2],
    radius: f32,
    measurement: &BubbleMeasurement,
    color: Rgb<u8>,
) {
    let c = transform.project(center[0] as f64, center[1] as f64);
    let r = (radius as f64 * transform.mean_scale()).round() as i32;
    let center_px = (c[0] as i32, c[1] as i32);

    let rings = 1 + (measurement.fill_ratio * 3.0).round() as i32;
    for k in 0..rings {
        if r - k > 1 {
            draw_hollow_circle_mut(canvas, center_px, r - k, color);
        }
    }
}
