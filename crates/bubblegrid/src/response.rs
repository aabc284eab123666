//! Structured per-sheet extraction result.

use std::fmt;

/// Extracted student identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudentId {
    /// All ID slots resolved (empty string when the section was left blank).
    Read(String),
    /// One or more ID slots were blank or ambiguous; details are in the
    /// sheet warnings.
    Unreadable,
}

impl StudentId {
    pub fn is_readable(&self) -> bool {
        matches!(self, StudentId::Read(_))
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StudentId::Read(digits) => f.write_str(digits),
            StudentId::Unreadable => f.write_str("unreadable"),
        }
    }
}

/// Selected options for one question, in layout order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionAnswer {
    pub question_id: String,
    /// Empty = no answer; more than one = multi-mark, preserved as-is.
    pub selected: Vec<char>,
}

/// Non-fatal diagnostics accumulated while processing one sheet.
///
/// Warnings ride along with the response instead of aborting it; callers
/// persist them next to the extracted data.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanWarning {
    /// An expected fiducial marker was not found with enough confidence.
    MarkerNotFound { index: usize, confidence: f32 },
    /// Transform fitted but mean residual exceeds the configured tolerance.
    AlignmentDegraded {
        mean_residual_px: f64,
        tolerance_px: f64,
    },
    /// Digit slot where the two best fills are too close to call.
    AmbiguousDigit {
        digit_index: u32,
        best_fill: f32,
        second_fill: f32,
    },
    /// More than one bubble marked on a question (kept, flagged for review).
    MultiMark { question_id: String, count: usize },
    /// Bubble region fell partly or fully outside the scanned image.
    BubbleOutOfImage { context: String },
}

impl fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanWarning::MarkerNotFound { index, confidence } => write!(
                f,
                "marker {index} not found (confidence {confidence:.2})"
            ),
            ScanWarning::AlignmentDegraded {
                mean_residual_px,
                tolerance_px,
            } => write!(
                f,
                "alignment degraded: mean residual {mean_residual_px:.2}px exceeds {tolerance_px:.2}px"
            ),
            ScanWarning::AmbiguousDigit {
                digit_index,
                best_fill,
                second_fill,
            } => write!(
                f,
                "ID slot {digit_index} ambiguous (fills {best_fill:.2} vs {second_fill:.2})"
            ),
            ScanWarning::MultiMark { question_id, count } => {
                write!(f, "{question_id}: {count} bubbles marked")
            }
            ScanWarning::BubbleOutOfImage { context } => {
                write!(f, "{context}: bubble outside scanned image")
            }
        }
    }
}

/// Everything extracted from one scanned sheet.
///
/// Produced once per image, immutable afterwards. Warnings carry forward
/// alignment diagnostics plus per-bubble ambiguity flags.
#[derive(Debug, Clone)]
pub struct SheetResponse {
    /// Identifier of the source image (file stem).
    pub source: String,
    pub student_id: StudentId,
    pub answers: Vec<QuestionAnswer>,
    pub warnings: Vec<ScanWarning>,
}

impl SheetResponse {
    /// Selected options for a question, if the sheet had it.
    pub fn selected(&self, question_id: &str) -> Option<&[char]> {
        self.answers
            .iter()
            .find(|a| a.question_id == question_id)
            .map(|a| a.selected.as_slice())
    }

    /// Student id used in result rows: parsed digits when readable,
    /// otherwise a source-derived placeholder that keeps rows distinct
    /// and diagnosable.
    pub fn result_student_id(&self) -> String {
        match &self.student_id {
            StudentId::Read(digits) => digits.clone(),
            StudentId::Unreadable => format!("unreadable:{}", self.source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_id_keeps_rows_distinct() {
        let resp = SheetResponse {
            source: "scan_007".into(),
            student_id: StudentId::Unreadable,
            answers: vec![],
            warnings: vec![],
        };
        assert_eq!(resp.result_student_id(), "unreadable:scan_007");
    }

    #[test]
    fn warning_display_is_actionable() {
        let w = ScanWarning::AlignmentDegraded {
            mean_residual_px: 4.5,
            tolerance_px: 3.0,
        };
        let text = w.to_string();
        assert!(text.contains("4.50px"));
        assert!(text.contains("3.00px"));
    }
}
