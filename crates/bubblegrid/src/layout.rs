//! Runtime sheet layout specification.
//!
//! Layout JSON is produced by the bubble-sheet generator alongside the
//! printable PDF. Coordinates are PDF points with the origin at the
//! bottom-left corner of the page (y grows upward); alignment marker
//! `x`/`y` is the square's lower-left corner.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

/// Valid answer option labels, in printed order.
pub const OPTION_LABELS: [char; 5] = ['a', 'b', 'c', 'd', 'e'];

const ID_LENGTH_RANGE: (usize, usize) = (4, 10);
const MIN_MARKERS: usize = 3;

/// Layout loading / validation errors. Fatal: a malformed layout would
/// corrupt every sheet scanned against it.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("failed to read layout file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse layout JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid layout: {0}")]
    Invalid(String),
}

/// Student-ID digit arrangement on the printed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdOrientation {
    /// One column per digit, values 0-9 stacked top to bottom.
    Vertical,
    /// One row per digit, values 0-9 left to right.
    Horizontal,
}

/// A printed fiducial square with known layout coordinates.
#[derive(Debug, Clone)]
pub struct FiducialMarker {
    /// Center of the square in layout points.
    pub center: [f32; 2],
    /// Side length in layout points.
    pub size: f32,
}

/// One answer bubble of a question.
#[derive(Debug, Clone)]
pub struct OptionBubble {
    /// Lowercase option label (a-e).
    pub option: char,
    /// Bubble center in layout points.
    pub center: [f32; 2],
    /// Bubble radius in layout points.
    pub radius: f32,
}

/// One question row: an ordered sibling group of option bubbles.
#[derive(Debug, Clone)]
pub struct QuestionLayout {
    /// 1-based printed question number.
    pub number: u32,
    /// Canonical question identifier used in reports and answer keys ("Q1").
    pub question_id: String,
    pub bubbles: Vec<OptionBubble>,
}

/// One digit bubble of a student-ID slot.
#[derive(Debug, Clone)]
pub struct DigitBubble {
    /// Digit value 0-9.
    pub value: u8,
    pub center: [f32; 2],
    pub radius: f32,
}

/// One student-ID digit slot: a sibling group of ten digit bubbles.
#[derive(Debug, Clone)]
pub struct DigitColumn {
    /// 1-based slot position within the student ID.
    pub digit_index: u32,
    pub bubbles: Vec<DigitBubble>,
}

/// Immutable sheet layout consumed by the scanning pipeline.
#[derive(Debug, Clone)]
pub struct SheetLayout {
    pub paper_size: String,
    /// Page width in layout points.
    pub page_width: f32,
    /// Page height in layout points.
    pub page_height: f32,
    pub orientation: IdOrientation,
    pub markers: Vec<FiducialMarker>,
    pub questions: Vec<QuestionLayout>,
    pub id_columns: Vec<DigitColumn>,

    /// Fast lookup: question id -> index into `questions`.
    id_to_idx: HashMap<String, usize>,
}

// ── Raw JSON schema ──────────────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
struct LayoutSpec {
    paper_size: String,
    dimensions: DimensionsSpec,
    questions: Vec<QuestionSpec>,
    student_id: Vec<DigitColumnSpec>,
    alignment_markers: Vec<MarkerSpec>,
    metadata: MetadataSpec,
}

#[derive(Debug, serde::Deserialize)]
struct DimensionsSpec {
    width: f32,
    height: f32,
}

#[derive(Debug, serde::Deserialize)]
struct QuestionSpec {
    number: u32,
    bubbles: Vec<OptionBubbleSpec>,
}

#[derive(Debug, serde::Deserialize)]
struct OptionBubbleSpec {
    option: String,
    x: f32,
    y: f32,
    radius: f32,
}

#[derive(Debug, serde::Deserialize)]
struct DigitColumnSpec {
    digit_index: u32,
    bubbles: Vec<DigitBubbleSpec>,
}

#[derive(Debug, serde::Deserialize)]
struct DigitBubbleSpec {
    value: String,
    x: f32,
    y: f32,
    radius: f32,
}

#[derive(Debug, serde::Deserialize)]
struct MarkerSpec {
    #[serde(rename = "type")]
    kind: String,
    x: f32,
    y: f32,
    size: f32,
}

#[derive(Debug, serde::Deserialize)]
struct MetadataSpec {
    student_id_orientation: IdOrientation,
}

// ── Construction ─────────────────────────────────────────────────────────

impl SheetLayout {
    /// Load and validate a layout from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, LayoutError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Load and validate a layout from a JSON string.
    pub fn from_json_str(data: &str) -> Result<Self, LayoutError> {
        let spec: LayoutSpec = serde_json::from_str(data)?;
        Self::from_layout_spec(spec)
    }

    fn from_layout_spec(spec: LayoutSpec) -> Result<Self, LayoutError> {
        let invalid = |msg: String| LayoutError::Invalid(msg);

        if !(spec.dimensions.width.is_finite() && spec.dimensions.width > 0.0)
            || !(spec.dimensions.height.is_finite() && spec.dimensions.height > 0.0)
        {
            return Err(invalid("page dimensions must be finite and > 0".into()));
        }

        let markers: Vec<FiducialMarker> = spec
            .alignment_markers
            .iter()
            .map(|m| {
                if m.kind != "square" {
                    return Err(invalid(format!("unsupported marker type '{}'", m.kind)));
                }
                if !(m.size.is_finite() && m.size > 0.0) {
                    return Err(invalid("marker size must be finite and > 0".into()));
                }
                Ok(FiducialMarker {
                    center: [m.x + m.size / 2.0, m.y + m.size / 2.0],
                    size: m.size,
                })
            })
            .collect::<Result<_, _>>()?;
        if markers.len() < MIN_MARKERS {
            return Err(invalid(format!(
                "need at least {} alignment markers, layout has {}",
                MIN_MARKERS,
                markers.len()
            )));
        }

        if spec.questions.is_empty() {
            return Err(invalid("layout has no questions".into()));
        }
        let mut questions: Vec<QuestionLayout> = Vec::with_capacity(spec.questions.len());
        for q in &spec.questions {
            if questions.iter().any(|existing| existing.number == q.number) {
                return Err(invalid(format!("duplicate question number {}", q.number)));
            }
            let bubbles = parse_question_bubbles(q)?;
            check_sibling_overlap(
                &format!("question {}", q.number),
                bubbles.iter().map(|b| (b.center, b.radius)),
            )?;
            questions.push(QuestionLayout {
                number: q.number,
                question_id: format!("Q{}", q.number),
                bubbles,
            });
        }

        let n_digits = spec.student_id.len();
        if !(ID_LENGTH_RANGE.0..=ID_LENGTH_RANGE.1).contains(&n_digits) {
            return Err(invalid(format!(
                "student ID must have {}-{} digit slots, layout has {}",
                ID_LENGTH_RANGE.0, ID_LENGTH_RANGE.1, n_digits
            )));
        }
        let mut id_columns = Vec::with_capacity(n_digits);
        for col in &spec.student_id {
            let bubbles = parse_digit_bubbles(col)?;
            check_sibling_overlap(
                &format!("ID slot {}", col.digit_index),
                bubbles.iter().map(|b| (b.center, b.radius)),
            )?;
            id_columns.push(DigitColumn {
                digit_index: col.digit_index,
                bubbles,
            });
        }

        let id_to_idx = questions
            .iter()
            .enumerate()
            .map(|(i, q)| (q.question_id.clone(), i))
            .collect();

        Ok(Self {
            paper_size: spec.paper_size,
            page_width: spec.dimensions.width,
            page_height: spec.dimensions.height,
            orientation: spec.metadata.student_id_orientation,
            markers,
            questions,
            id_columns,
            id_to_idx,
        })
    }

    /// Look up a question layout by canonical id ("Q1").
    pub fn question(&self, question_id: &str) -> Option<&QuestionLayout> {
        self.id_to_idx.get(question_id).map(|&i| &self.questions[i])
    }

    /// Total number of bubbles on the sheet (questions + ID digits).
    pub fn n_bubbles(&self) -> usize {
        let q: usize = self.questions.iter().map(|q| q.bubbles.len()).sum();
        let d: usize = self.id_columns.iter().map(|c| c.bubbles.len()).sum();
        q + d
    }
}

fn parse_question_bubbles(q: &QuestionSpec) -> Result<Vec<OptionBubble>, LayoutError> {
    if q.bubbles.is_empty() {
        return Err(LayoutError::Invalid(format!(
            "question {} has no bubbles",
            q.number
        )));
    }
    let mut seen = Vec::new();
    let mut out = Vec::with_capacity(q.bubbles.len());
    for b in &q.bubbles {
        let option = parse_option_label(&b.option).ok_or_else(|| {
            LayoutError::Invalid(format!(
                "question {}: invalid option label '{}'",
                q.number, b.option
            ))
        })?;
        if seen.contains(&option) {
            return Err(LayoutError::Invalid(format!(
                "question {}: duplicate option '{}'",
                q.number, option
            )));
        }
        seen.push(option);
        check_circle(&format!("question {} option {}", q.number, option), b.x, b.y, b.radius)?;
        out.push(OptionBubble {
            option,
            center: [b.x, b.y],
            radius: b.radius,
        });
    }
    Ok(out)
}

fn parse_digit_bubbles(col: &DigitColumnSpec) -> Result<Vec<DigitBubble>, LayoutError> {
    if col.bubbles.len() != 10 {
        return Err(LayoutError::Invalid(format!(
            "ID slot {} must have exactly 10 bubbles, found {}",
            col.digit_index,
            col.bubbles.len()
        )));
    }
    let mut out = Vec::with_capacity(10);
    for b in &col.bubbles {
        let value: u8 = b.value.trim().parse().map_err(|_| {
            LayoutError::Invalid(format!(
                "ID slot {}: invalid digit value '{}'",
                col.digit_index, b.value
            ))
        })?;
        if value > 9 {
            return Err(LayoutError::Invalid(format!(
                "ID slot {}: digit value {} out of range",
                col.digit_index, value
            )));
        }
        check_circle(
            &format!("ID slot {} digit {}", col.digit_index, value),
            b.x,
            b.y,
            b.radius,
        )?;
        out.push(DigitBubble {
            value,
            center: [b.x, b.y],
            radius: b.radius,
        });
    }
    Ok(out)
}

fn parse_option_label(raw: &str) -> Option<char> {
    let t = raw.trim();
    if t.chars().count() != 1 {
        return None;
    }
    let c = t.chars().next()?.to_ascii_lowercase();
    OPTION_LABELS.contains(&c).then_some(c)
}

fn check_circle(context: &str, x: f32, y: f32, radius: f32) -> Result<(), LayoutError> {
    if !(x.is_finite() && y.is_finite() && radius.is_finite() && radius > 0.0) {
        return Err(LayoutError::Invalid(format!(
            "{context}: bubble coordinates must be finite with radius > 0"
        )));
    }
    Ok(())
}

/// Bubble regions within one sibling group must never overlap.
fn check_sibling_overlap(
    context: &str,
    circles: impl Iterator<Item = ([f32; 2], f32)>,
) -> Result<(), LayoutError> {
    let all: Vec<_> = circles.collect();
    for i in 0..all.len() {
        for j in (i + 1)..all.len() {
            let (ca, ra) = all[i];
            let (cb, rb) = all[j];
            let dx = ca[0] - cb[0];
            let dy = ca[1] - cb[1];
            let dist = (dx * dx + dy * dy).sqrt();
            if dist < ra + rb {
                return Err(LayoutError::Invalid(format!(
                    "{context}: bubbles overlap (centers {dist:.2}pt apart)"
                )));
            }
        }
    }
    Ok(())
}
