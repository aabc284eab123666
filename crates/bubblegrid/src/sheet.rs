//! Single-sheet pipeline: align, measure, classify, assemble.

use image::GrayImage;

use crate::align::{align, AlignmentError};
use crate::classify::{classify_digit, classify_question, DigitReading};
use crate::config::ScanConfig;
use crate::layout::SheetLayout;
use crate::measure::{measure_bubble, BubbleMeasurement};
use crate::response::{QuestionAnswer, ScanWarning, SheetResponse, StudentId};

/// Process one scanned image into a structured response.
///
/// A failed alignment short-circuits this sheet only; everything else is
/// recorded as warnings on the response. `source` identifies the image in
/// reports and warnings (typically the file stem).
pub fn process_sheet(
    img: &GrayImage,
    layout: &SheetLayout,
    config: &ScanConfig,
    source: &str,
) -> Result<SheetResponse, AlignmentError> {
    let transform = align(img, layout, config)?;
    let mut warnings = transform.warnings.clone();

    // Questions: measure each sibling group, classify, flag anomalies.
    let mut answers = Vec::with_capacity(layout.questions.len());
    for question in &layout.questions {
        let measurements: Vec<(char, BubbleMeasurement)> = question
            .bubbles
            .iter()
            .map(|b| {
                let m = measure_bubble(img, &transform, b.center, b.radius, config);
                if !m.in_image {
                    warnings.push(ScanWarning::BubbleOutOfImage {
                        context: format!("{} option {}", question.question_id, b.option),
                    });
                }
                (b.option, m)
            })
            .collect();

        let selected = classify_question(&measurements, config);
        if selected.len() > 1 {
            // Printed sheets are single-select; a multi-mark is preserved
            // for scoring but flagged for instructor review.
            warnings.push(ScanWarning::MultiMark {
                question_id: question.question_id.clone(),
                count: selected.len(),
            });
        }
        answers.push(QuestionAnswer {
            question_id: question.question_id.clone(),
            selected,
        });
    }

    // Student ID: one digit per slot; a blank or ambiguous slot makes the
    // whole ID unreadable rather than guessing.
    let mut digits = String::with_capacity(layout.id_columns.len());
    let mut id_readable = true;
    let mut id_all_blank = true;
    for column in &layout.id_columns {
        let measurements: Vec<(u8, BubbleMeasurement)> = column
            .bubbles
            .iter()
            .map(|b| {
                let m = measure_bubble(img, &transform, b.center, b.radius, config);
                if !m.in_image {
                    warnings.push(ScanWarning::BubbleOutOfImage {
                        context: format!("ID slot {} digit {}", column.digit_index, b.value),
                    });
                }
                (b.value, m)
            })
            .collect();

        match classify_digit(&measurements, config) {
            DigitReading::Digit(value) => {
                id_all_blank = false;
                digits.push(char::from(b'0' + value));
            }
            DigitReading::Blank => id_readable = false,
            DigitReading::Ambiguous {
                best_fill,
                second_fill,
            } => {
                id_all_blank = false;
                id_readable = false;
                warnings.push(ScanWarning::AmbiguousDigit {
                    digit_index: column.digit_index,
                    best_fill,
                    second_fill,
                });
            }
        }
    }

    let student_id = if id_all_blank {
        // The student left the whole ID section empty; that is a readable
        // (if useless) answer, not a scan defect.
        StudentId::Read(String::new())
    } else if id_readable {
        StudentId::Read(digits)
    } else {
        StudentId::Unreadable
    };

    tracing::debug!(
        source,
        student_id = %student_id,
        n_warnings = warnings.len(),
        "sheet processed"
    );

    Ok(SheetResponse {
        source: source.to_string(),
        student_id,
        answers,
        warnings,
    })
}
