//! Shared test utilities: programmatic layouts and synthetic scan rendering.
//!
//! The JSON builder follows the sheet generator's A4 geometry (corner
//! squares at half-margin offsets, vertical ID columns, one question
//! column) so layout parsing is exercised against realistic input. The
//! renderer draws a sheet under an arbitrary scale/rotation/offset so
//! alignment is exercised against imperfect scans.

use image::{GrayImage, Luma};
use serde_json::json;

use crate::layout::SheetLayout;

const PAGE_W: f32 = 595.0;
const PAGE_H: f32 = 842.0;
const MARGIN: f32 = 36.0;
const MARKER_SIZE: f32 = 34.0;
const BUBBLE_RADIUS: f32 = 5.67;
const ID_TOP_Y: f32 = 700.0;
const ID_COLUMN_STEP: f32 = 28.3;
const ID_VERTICAL_STEP: f32 = 19.85;
const QUESTION_ROW_STEP: f32 = 22.7;
const OPTION_STEP: f32 = 22.7;
const CONTENT_LEFT: f32 = 100.0;
const FIRST_BUBBLE_X: f32 = 139.7;

/// Layout JSON in the generator's schema, single question column.
pub(crate) fn test_layout_json(questions: usize, id_len: usize) -> String {
    let offset = MARGIN / 2.0;
    let far_x = PAGE_W - offset - MARKER_SIZE;
    let far_y = PAGE_H - offset - MARKER_SIZE;
    let markers = json!([
        {"type": "square", "x": offset, "y": offset, "size": MARKER_SIZE},
        {"type": "square", "x": far_x, "y": offset, "size": MARKER_SIZE},
        {"type": "square", "x": offset, "y": far_y, "size": MARKER_SIZE},
        {"type": "square", "x": far_x, "y": far_y, "size": MARKER_SIZE},
    ]);

    let id_columns: Vec<_> = (0..id_len)
        .map(|slot| {
            let cx = CONTENT_LEFT + slot as f32 * ID_COLUMN_STEP;
            let bubbles: Vec<_> = (0..10)
                .map(|v| {
                    json!({
                        "value": v.to_string(),
                        "x": cx,
                        "y": ID_TOP_Y - v as f32 * ID_VERTICAL_STEP,
                        "radius": BUBBLE_RADIUS,
                    })
                })
                .collect();
            json!({
                "digit_index": slot + 1,
                "label_position": {"x": cx - BUBBLE_RADIUS, "y": ID_TOP_Y + 10.0},
                "bubbles": bubbles,
            })
        })
        .collect();

    let question_area_top = ID_TOP_Y - 9.0 * ID_VERTICAL_STEP - 45.0;
    let question_rows: Vec<_> = (0..questions)
        .map(|i| {
            let y = question_area_top - i as f32 * QUESTION_ROW_STEP;
            let bubbles: Vec<_> = ["A", "B", "C", "D", "E"]
                .iter()
                .enumerate()
                .map(|(k, opt)| {
                    json!({
                        "option": opt,
                        "x": FIRST_BUBBLE_X + k as f32 * OPTION_STEP,
                        "y": y,
                        "radius": BUBBLE_RADIUS,
                    })
                })
                .collect();
            json!({
                "number": i + 1,
                "label_position": {"x": CONTENT_LEFT, "y": y},
                "bubbles": bubbles,
            })
        })
        .collect();

    json!({
        "paper_size": "A4",
        "dimensions": {"width": PAGE_W, "height": PAGE_H},
        "questions": question_rows,
        "student_id": id_columns,
        "alignment_markers": markers,
        "metadata": {
            "num_questions": questions,
            "id_length": id_len,
            "student_id_orientation": "vertical",
            "bubble_radius": BUBBLE_RADIUS,
        },
    })
    .to_string()
}

pub(crate) fn test_layout(questions: usize, id_len: usize) -> SheetLayout {
    SheetLayout::from_json_str(&test_layout_json(questions, id_len)).expect("test layout is valid")
}

/// What is penciled in on a synthetic sheet.
#[derive(Debug, Clone, Default)]
pub(crate) struct SheetMarks {
    /// (question number, selected options).
    pub answers: Vec<(u32, Vec<char>)>,
    /// ID digits by slot order; shorter than the slot count leaves the
    /// trailing slots blank.
    pub id_digits: String,
    /// Extra filled digit bubbles: (1-based slot, digit value).
    pub extra_id: Vec<(u32, u8)>,
}

impl SheetMarks {
    pub(crate) fn answer(mut self, question: u32, options: &[char]) -> Self {
        self.answers.push((question, options.to_vec()));
        self
    }

    pub(crate) fn student_id(mut self, digits: &str) -> Self {
        self.id_digits = digits.to_string();
        self
    }

    pub(crate) fn extra_id_mark(mut self, slot: u32, value: u8) -> Self {
        self.extra_id.push((slot, value));
        self
    }

    fn question_marked(&self, question: u32, option: char) -> bool {
        self.answers
            .iter()
            .any(|(q, opts)| *q == question && opts.contains(&option))
    }

    fn digit_marked(&self, slot_index: u32, value: u8) -> bool {
        let from_id = self
            .id_digits
            .chars()
            .nth(slot_index as usize - 1)
            .and_then(|c| c.to_digit(10))
            .is_some_and(|d| d == value as u32);
        from_id
            || self
                .extra_id
                .iter()
                .any(|(s, v)| *s == slot_index && *v == value)
    }
}

/// Geometry and photometry of the synthetic scan.
#[derive(Debug, Clone)]
pub(crate) struct RenderSpec {
    /// Pixels per layout point.
    pub scale: f32,
    /// Page rotation inside the image, degrees, about the image center.
    pub rotation_deg: f32,
    /// Translation applied after rotation, pixels.
    pub offset_px: [f32; 2],
    pub paper_intensity: u8,
    pub ink_intensity: u8,
    pub outline_intensity: u8,
    /// Marker indices left undrawn (simulates torn/occluded corners).
    pub hidden_markers: Vec<usize>,
}

impl Default for RenderSpec {
    fn default() -> Self {
        Self {
            scale: 2.0,
            rotation_deg: 0.0,
            offset_px: [0.0, 0.0],
            paper_intensity: 255,
            ink_intensity: 0,
            outline_intensity: 80,
            hidden_markers: Vec::new(),
        }
    }
}

impl RenderSpec {
    pub(crate) fn with_hidden_markers(&self, hidden: &[usize]) -> Self {
        Self {
            hidden_markers: hidden.to_vec(),
            ..self.clone()
        }
    }

    pub(crate) fn image_width(&self, layout: &SheetLayout) -> u32 {
        (layout.page_width * self.scale).ceil() as u32
    }

    pub(crate) fn image_height(&self, layout: &SheetLayout) -> u32 {
        (layout.page_height * self.scale).ceil() as u32
    }

    /// Map a layout point into image pixel coordinates.
    pub(crate) fn project(&self, layout: &SheetLayout, p: [f64; 2]) -> [f64; 2] {
        let cx = self.image_width(layout) as f64 / 2.0;
        let cy = self.image_height(layout) as f64 / 2.0;
        let s = self.scale as f64;
        let (sin, cos) = (self.rotation_deg as f64).to_radians().sin_cos();

        let x0 = p[0] * s - cx;
        let y0 = (layout.page_height as f64 - p[1]) * s - cy;
        [
            cx + cos * x0 - sin * y0 + self.offset_px[0] as f64,
            cy + sin * x0 + cos * y0 + self.offset_px[1] as f64,
        ]
    }

    /// Inverse of [`RenderSpec::project`].
    fn unproject(&self, layout: &SheetLayout, p: [f64; 2]) -> [f64; 2] {
        let cx = self.image_width(layout) as f64 / 2.0;
        let cy = self.image_height(layout) as f64 / 2.0;
        let s = self.scale as f64;
        let (sin, cos) = (self.rotation_deg as f64).to_radians().sin_cos();

        let xr = p[0] - self.offset_px[0] as f64 - cx;
        let yr = p[1] - self.offset_px[1] as f64 - cy;
        let x0 = cos * xr + sin * yr + cx;
        let y0 = -sin * xr + cos * yr + cy;
        [x0 / s, layout.page_height as f64 - y0 / s]
    }
}

/// Render a synthetic scanned sheet.
pub(crate) fn render_sheet(layout: &SheetLayout, marks: &SheetMarks, spec: &RenderSpec) -> GrayImage {
    let w = spec.image_width(layout);
    let h = spec.image_height(layout);
    let mut img = GrayImage::from_pixel(w, h, Luma([spec.paper_intensity]));

    // Markers: filled squares in layout space.
    for (i, marker) in layout.markers.iter().enumerate() {
        if spec.hidden_markers.contains(&i) {
            continue;
        }
        let half = (marker.size / 2.0) as f64;
        stamp(&mut img, layout, spec, marker.center, marker.size * 0.75, |lx, ly| {
            let inside = (lx - marker.center[0] as f64).abs() <= half
                && (ly - marker.center[1] as f64).abs() <= half;
            inside.then_some(spec.ink_intensity)
        });
    }

    // Question bubbles: printed outline, plus a filled disk when marked.
    for q in &layout.questions {
        for b in &q.bubbles {
            let filled = marks.question_marked(q.number, b.option);
            stamp_bubble(&mut img, layout, spec, b.center, b.radius, filled);
        }
    }
    for col in &layout.id_columns {
        for b in &col.bubbles {
            let filled = marks.digit_marked(col.digit_index, b.value);
            stamp_bubble(&mut img, layout, spec, b.center, b.radius, filled);
        }
    }

    img
}

fn stamp_bubble(
    img: &mut GrayImage,
    layout: &SheetLayout,
    spec: &RenderSpec,
    center: [f32; 2],
    radius: f32,
    filled: bool,
) {
    let r = radius as f64;
    stamp(img, layout, spec, center, radius * 1.2, |lx, ly| {
        let dx = lx - center[0] as f64;
        let dy = ly - center[1] as f64;
        let d = (dx * dx + dy * dy).sqrt();
        if filled && d <= r * 0.95 {
            Some(spec.ink_intensity)
        } else if (d - r).abs() <= 0.5 {
            Some(spec.outline_intensity)
        } else {
            None
        }
    });
}

/// Paint all pixels within `reach` layout points of `center` for which
/// `color` returns an intensity.
fn stamp(
    img: &mut GrayImage,
    layout: &SheetLayout,
    spec: &RenderSpec,
    center: [f32; 2],
    reach: f32,
    color: impl Fn(f64, f64) -> Option<u8>,
) {
    let c = spec.project(layout, [center[0] as f64, center[1] as f64]);
    let reach_px = (reach * spec.scale).ceil() as i64 + 2;
    let (w, h) = img.dimensions();

    let x0 = (c[0] as i64 - reach_px).max(0) as u32;
    let y0 = (c[1] as i64 - reach_px).max(0) as u32;
    let x1 = ((c[0] as i64 + reach_px).max(0) as u32).min(w.saturating_sub(1));
    let y1 = ((c[1] as i64 + reach_px).max(0) as u32).min(h.saturating_sub(1));

    for y in y0..=y1 {
        for x in x0..=x1 {
            let l = spec.unproject(layout, [x as f64 + 0.5, y as f64 + 0.5]);
            if let Some(v) = color(l[0], l[1]) {
                img.put_pixel(x, y, Luma([v]));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_unproject_roundtrip() {
        let layout = test_layout(3, 4);
        let spec = RenderSpec {
            rotation_deg: 2.0,
            offset_px: [5.0, -3.0],
            ..RenderSpec::default()
        };
        let p = [123.4, 567.8];
        let q = spec.project(&layout, p);
        let back = spec.unproject(&layout, q);
        assert!((back[0] - p[0]).abs() < 1e-9);
        assert!((back[1] - p[1]).abs() < 1e-9);
    }

    #[test]
    fn rendered_marker_is_dark_at_projected_center() {
        let layout = test_layout(3, 4);
        let spec = RenderSpec::default();
        let img = render_sheet(&layout, &SheetMarks::default(), &spec);

        let c = spec.project(&layout, [
            layout.markers[0].center[0] as f64,
            layout.markers[0].center[1] as f64,
        ]);
        let v = img.get_pixel(c[0] as u32, c[1] as u32)[0];
        assert_eq!(v, 0);
    }
}
