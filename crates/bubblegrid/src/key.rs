//! Answer key loading and validation.
//!
//! The key is CSV with `Question,Correct_Answer,Points` columns. A corrupt
//! key would silently corrupt every score, so validation is strict and
//! up-front: any malformation aborts the whole scoring run before a single
//! score is computed.

use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;

use thiserror::Error;

use crate::layout::OPTION_LABELS;

/// Fatal answer-key errors.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to read answer key: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse answer key CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("answer key missing columns: {0}")]
    MissingColumns(String),
    #[error("answer-key row {row}: missing Question value")]
    MissingQuestion { row: usize },
    #[error("question '{question_id}': no valid correct answers in '{raw}'")]
    InvalidAnswer { question_id: String, raw: String },
    #[error("question '{question_id}': points must be a positive number, got '{raw}'")]
    InvalidPoints { question_id: String, raw: String },
    #[error("duplicate question '{question_id}' in answer key")]
    DuplicateQuestion { question_id: String },
    #[error("answer key has no questions")]
    Empty,
}

/// Correct options and point value for one question.
#[derive(Debug, Clone)]
pub struct QuestionSpec {
    /// Canonical (uppercased) question id, e.g. "Q1".
    pub question_id: String,
    /// Non-empty set of lowercase option labels.
    pub correct_options: BTreeSet<char>,
    /// Positive point value.
    pub points: f64,
}

impl QuestionSpec {
    /// Multi-select questions have more than one correct option.
    pub fn is_multiple(&self) -> bool {
        self.correct_options.len() > 1
    }

    pub fn num_correct(&self) -> usize {
        self.correct_options.len()
    }

    /// Display form of the correct set: "b" or "[b,c,d]".
    pub fn answer_display(&self) -> String {
        if self.is_multiple() {
            let joined: Vec<String> =
                self.correct_options.iter().map(|c| c.to_string()).collect();
            format!("[{}]", joined.join(","))
        } else {
            self.correct_options.iter().collect()
        }
    }
}

/// Validated, read-only answer key.
#[derive(Debug, Clone)]
pub struct AnswerKey {
    specs: Vec<QuestionSpec>,
    by_id: HashMap<String, usize>,
    total_points: f64,
}

impl AnswerKey {
    /// Load and validate a key from a CSV file.
    pub fn from_csv_path(path: &Path) -> Result<Self, KeyError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_csv_reader(data.as_bytes())
    }

    /// Load and validate a key from CSV bytes.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, KeyError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let col = |name: &str| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
        };
        let (q_col, a_col, p_col) = match (col("Question"), col("Correct_Answer"), col("Points")) {
            (Some(q), Some(a), Some(p)) => (q, a, p),
            (q, a, p) => {
                let missing: Vec<&str> = [
                    (q, "Question"),
                    (a, "Correct_Answer"),
                    (p, "Points"),
                ]
                .iter()
                .filter(|(found, _)| found.is_none())
                .map(|(_, name)| *name)
                .collect();
                return Err(KeyError::MissingColumns(missing.join(", ")));
            }
        };

        let mut specs: Vec<QuestionSpec> = Vec::new();
        let mut by_id = HashMap::new();
        let mut total_points = 0.0;

        for (i, record) in csv_reader.records().enumerate() {
            let record = record?;
            let row = i + 2; // 1-based, counting the header line

            let raw_question = record.get(q_col).unwrap_or("").trim();
            if raw_question.is_empty() {
                return Err(KeyError::MissingQuestion { row });
            }
            let question_id = normalize_question_id(raw_question);

            let raw_answer = record.get(a_col).unwrap_or("").trim();
            let correct_options = parse_option_set(raw_answer).ok_or_else(|| {
                KeyError::InvalidAnswer {
                    question_id: question_id.clone(),
                    raw: raw_answer.to_string(),
                }
            })?;

            let raw_points = record.get(p_col).unwrap_or("").trim();
            let points: f64 = raw_points.parse().map_err(|_| KeyError::InvalidPoints {
                question_id: question_id.clone(),
                raw: raw_points.to_string(),
            })?;
            if !points.is_finite() || points <= 0.0 {
                return Err(KeyError::InvalidPoints {
                    question_id,
                    raw: raw_points.to_string(),
                });
            }

            if by_id.contains_key(&question_id) {
                return Err(KeyError::DuplicateQuestion { question_id });
            }
            by_id.insert(question_id.clone(), specs.len());
            total_points += points;
            specs.push(QuestionSpec {
                question_id,
                correct_options,
                points,
            });
        }

        if specs.is_empty() {
            return Err(KeyError::Empty);
        }
        Ok(Self {
            specs,
            by_id,
            total_points,
        })
    }

    /// Look up one question's spec by canonical or raw id.
    pub fn get(&self, question_id: &str) -> Option<&QuestionSpec> {
        self.by_id
            .get(&normalize_question_id(question_id))
            .map(|&i| &self.specs[i])
    }

    /// Specs in key order.
    pub fn iter(&self) -> impl Iterator<Item = &QuestionSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Sum of point values over all questions.
    pub fn total_points(&self) -> f64 {
        self.total_points
    }
}

/// Uppercase and trim a question id ("q1" -> "Q1").
pub fn normalize_question_id(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Parse an answer cell into a set of lowercase option labels.
///
/// Accepts "b", "b,c,d" and the bracketed "[b,c,d]" display form; returns
/// `None` when empty or containing anything outside a-e.
pub fn parse_option_set(raw: &str) -> Option<BTreeSet<char>> {
    let mut text = raw.trim();
    if text.starts_with('[') && text.ends_with(']') {
        text = &text[1..text.len() - 1];
    }
    let mut out = BTreeSet::new();
    for token in text.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if token.chars().count() != 1 {
            return None;
        }
        let c = token.chars().next()?.to_ascii_lowercase();
        if !OPTION_LABELS.contains(&c) {
            return None;
        }
        out.insert(c);
    }
    (!out.is_empty()).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_CSV: &str = "Question,Correct_Answer,Points\n\
                           Q1,b,2.0\n\
                           Q2,\"b,c,d\",4.00\n\
                           q3,a,1.5\n";

    #[test]
    fn loads_single_and_multi_select() {
        let key = AnswerKey::from_csv_reader(KEY_CSV.as_bytes()).unwrap();
        assert_eq!(key.len(), 3);
        assert!((key.total_points() - 7.5).abs() < 1e-9);

        let q1 = key.get("Q1").unwrap();
        assert!(!q1.is_multiple());
        assert_eq!(q1.answer_display(), "b");

        let q2 = key.get("Q2").unwrap();
        assert!(q2.is_multiple());
        assert_eq!(q2.num_correct(), 3);
        assert_eq!(q2.answer_display(), "[b,c,d]");

        // Lowercase ids are normalized.
        assert!(key.get("q3").is_some());
        assert_eq!(key.get("Q3").unwrap().points, 1.5);
    }

    #[test]
    fn missing_header_is_fatal() {
        let err = AnswerKey::from_csv_reader("Question,Points\nQ1,2\n".as_bytes()).unwrap_err();
        match err {
            KeyError::MissingColumns(cols) => assert_eq!(cols, "Correct_Answer"),
            other => panic!("expected MissingColumns, got {other}"),
        }
    }

    #[test]
    fn non_positive_points_is_fatal() {
        let csv = "Question,Correct_Answer,Points\nQ1,b,0\n";
        let err = AnswerKey::from_csv_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, KeyError::InvalidPoints { .. }));

        let csv = "Question,Correct_Answer,Points\nQ1,b,-1.5\n";
        assert!(matches!(
            AnswerKey::from_csv_reader(csv.as_bytes()).unwrap_err(),
            KeyError::InvalidPoints { .. }
        ));
    }

    #[test]
    fn invalid_option_set_is_fatal() {
        let csv = "Question,Correct_Answer,Points\nQ1,z,1\n";
        assert!(matches!(
            AnswerKey::from_csv_reader(csv.as_bytes()).unwrap_err(),
            KeyError::InvalidAnswer { .. }
        ));

        let csv = "Question,Correct_Answer,Points\nQ1,,1\n";
        assert!(matches!(
            AnswerKey::from_csv_reader(csv.as_bytes()).unwrap_err(),
            KeyError::InvalidAnswer { .. }
        ));
    }

    #[test]
    fn duplicate_question_is_fatal() {
        let csv = "Question,Correct_Answer,Points\nQ1,a,1\nq1,b,1\n";
        assert!(matches!(
            AnswerKey::from_csv_reader(csv.as_bytes()).unwrap_err(),
            KeyError::DuplicateQuestion { .. }
        ));
    }

    #[test]
    fn empty_key_is_fatal() {
        let csv = "Question,Correct_Answer,Points\n";
        assert!(matches!(
            AnswerKey::from_csv_reader(csv.as_bytes()).unwrap_err(),
            KeyError::Empty
        ));
    }

    #[test]
    fn option_set_accepts_bracketed_display_form() {
        let set = parse_option_set("[b,c]").unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&'b') && set.contains(&'c'));
        assert!(parse_option_set("B, C").is_some());
        assert!(parse_option_set("bc").is_none());
    }
}
