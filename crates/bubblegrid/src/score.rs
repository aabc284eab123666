//! Scoring: responses + answer key to per-student and per-question scores.
//!
//! Stateless batch transform. Single-select questions award all or nothing
//! on exact set match; multi-select questions use proportional partial
//! credit, `(hits - extras) * points / num_correct`, clipped at zero.
//! Per-question aggregate statistics require the whole batch, so they are
//! computed after every row is scored.

use std::collections::BTreeSet;
use std::fmt;

use crate::key::{normalize_question_id, AnswerKey, QuestionSpec};
use crate::response::SheetResponse;

/// One (student, question, selection) record: the normalized form scanned
/// sheets are flattened into and the scoring engine consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRow {
    pub student_id: String,
    pub question_id: String,
    pub selected: BTreeSet<char>,
}

/// One scored (student, question) record.
#[derive(Debug, Clone)]
pub struct GradedRow {
    pub student_id: String,
    pub question_id: String,
    pub selected: BTreeSet<char>,
    /// Awarded score, rounded to 2 decimals.
    pub score: f64,
}

/// Per-student batch totals.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentTotal {
    pub student_id: String,
    pub total_score: f64,
    /// `total_score / total_possible * 100`, rounded to 2 decimals.
    pub percent: f64,
}

/// Per-question aggregate over the whole batch.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionStat {
    pub question_id: String,
    pub mean_score: f64,
    /// `mean_score / points * 100`, rounded to 2 decimals.
    pub percent_correct: f64,
}

/// Non-fatal scoring diagnostics; reported, never dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreWarning {
    /// Response references a question the key does not define; the row is
    /// skipped, the rest of the student's rows still score.
    SchemaMismatch {
        student_id: String,
        question_id: String,
    },
}

impl fmt::Display for ScoreWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreWarning::SchemaMismatch {
                student_id,
                question_id,
            } => write!(
                f,
                "{student_id}: question '{question_id}' not in answer key; row skipped"
            ),
        }
    }
}

/// Complete scoring output for one batch.
#[derive(Debug, Clone)]
pub struct ScoreReport {
    /// Scored rows, sorted by (student, question).
    pub rows: Vec<GradedRow>,
    /// Per-student totals, sorted by student id.
    pub totals: Vec<StudentTotal>,
    /// Per-question statistics, in key order.
    pub stats: Vec<QuestionStat>,
    pub warnings: Vec<ScoreWarning>,
    pub total_possible: f64,
}

impl ScoreReport {
    pub fn total_for(&self, student_id: &str) -> Option<&StudentTotal> {
        self.totals.iter().find(|t| t.student_id == student_id)
    }

    pub fn stat_for(&self, question_id: &str) -> Option<&QuestionStat> {
        self.stats.iter().find(|s| s.question_id == question_id)
    }
}

/// Round to 2 decimals, half away from zero (the epsilon nudge keeps
/// values like 2.675 from landing on the wrong side of the binary
/// representation).
pub fn round2(x: f64) -> f64 {
    ((x + 1e-12) * 100.0).round() / 100.0
}

/// Score one response against one question spec. Pure; always in
/// `[0, spec.points]` and rounded to 2 decimals.
pub fn score_question(spec: &QuestionSpec, selected: &BTreeSet<char>) -> f64 {
    if !spec.is_multiple() {
        // Exact match only: a multi-mark or miss on a single-select
        // question never earns partial credit.
        return if *selected == spec.correct_options {
            round2(spec.points)
        } else {
            0.0
        };
    }

    let hits = selected.intersection(&spec.correct_options).count() as f64;
    let extras = selected.difference(&spec.correct_options).count() as f64;
    let per_option = spec.points / spec.num_correct() as f64;
    let raw = (hits - extras) * per_option;
    round2(raw.max(0.0))
}

/// Flatten scanned sheets into scoring rows.
pub fn rows_from_responses(responses: &[SheetResponse]) -> Vec<ResponseRow> {
    responses
        .iter()
        .flat_map(|resp| {
            let student_id = resp.result_student_id();
            resp.answers.iter().map(move |a| ResponseRow {
                student_id: student_id.clone(),
                question_id: a.question_id.clone(),
                selected: a.selected.iter().copied().collect(),
            })
        })
        .collect()
}

/// Score a whole batch.
///
/// Rows referencing unknown questions are skipped with a warning; the rest
/// of the batch proceeds. The key is assumed validated (see
/// [`AnswerKey`]): key-level malformation aborts before this point.
pub fn score_rows(rows: &[ResponseRow], key: &AnswerKey) -> ScoreReport {
    let total_possible = key.total_points();
    let mut warnings = Vec::new();
    let mut graded: Vec<GradedRow> = Vec::with_capacity(rows.len());

    for row in rows {
        let question_id = normalize_question_id(&row.question_id);
        let Some(spec) = key.get(&question_id) else {
            tracing::warn!(
                student_id = %row.student_id,
                question_id = %row.question_id,
                "question not in answer key; skipping row"
            );
            warnings.push(ScoreWarning::SchemaMismatch {
                student_id: row.student_id.clone(),
                question_id: row.question_id.clone(),
            });
            continue;
        };
        graded.push(GradedRow {
            student_id: row.student_id.clone(),
            question_id,
            selected: row.selected.clone(),
            score: score_question(spec, &row.selected),
        });
    }

    graded.sort_by(|a, b| {
        (a.student_id.as_str(), a.question_id.as_str())
            .cmp(&(b.student_id.as_str(), b.question_id.as_str()))
    });

    // Per-student totals.
    let mut totals: Vec<StudentTotal> = Vec::new();
    for row in &graded {
        match totals.iter_mut().find(|t| t.student_id == row.student_id) {
            Some(t) => t.total_score += row.score,
            None => totals.push(StudentTotal {
                student_id: row.student_id.clone(),
                total_score: row.score,
                percent: 0.0,
            }),
        }
    }
    for t in &mut totals {
        t.total_score = round2(t.total_score);
        t.percent = if total_possible > 0.0 {
            round2(t.total_score / total_possible * 100.0)
        } else {
            0.0
        };
    }
    totals.sort_by(|a, b| a.student_id.cmp(&b.student_id));

    // Per-question statistics, in key order; they need the full batch.
    let stats = key
        .iter()
        .map(|spec| {
            let scores: Vec<f64> = graded
                .iter()
                .filter(|r| r.question_id == spec.question_id)
                .map(|r| r.score)
                .collect();
            let mean = if scores.is_empty() {
                0.0
            } else {
                scores.iter().sum::<f64>() / scores.len() as f64
            };
            QuestionStat {
                question_id: spec.question_id.clone(),
                mean_score: round2(mean),
                percent_correct: round2(mean / spec.points * 100.0),
            }
        })
        .collect();

    ScoreReport {
        rows: graded,
        totals,
        stats,
        warnings,
        total_possible,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_key(rows: &str) -> AnswerKey {
        let csv = format!("Question,Correct_Answer,Points\n{rows}");
        AnswerKey::from_csv_reader(csv.as_bytes()).unwrap()
    }

    fn set(options: &str) -> BTreeSet<char> {
        options.chars().collect()
    }

    fn row(student: &str, question: &str, selected: &str) -> ResponseRow {
        ResponseRow {
            student_id: student.into(),
            question_id: question.into(),
            selected: set(selected),
        }
    }

    #[test]
    fn single_select_is_all_or_nothing() {
        let key = make_key("Q1,b,2.5\n");
        let spec = key.get("Q1").unwrap();
        assert_eq!(score_question(spec, &set("b")), 2.5);
        assert_eq!(score_question(spec, &set("a")), 0.0);
        assert_eq!(score_question(spec, &set("")), 0.0);
        // Multi-mark on a single-select question: no partial credit.
        assert_eq!(score_question(spec, &set("ab")), 0.0);
        assert_eq!(score_question(spec, &set("abcde")), 0.0);
    }

    #[test]
    fn multi_select_partial_credit_matches_reference_scenario() {
        // Key Q1,"b,c,d",4.00: C=3, P/C = 4/3.
        let key = make_key("Q1,\"b,c,d\",4.00\n");
        let spec = key.get("Q1").unwrap();

        // {b,c}: 2 hits, 0 extras -> 2 * 4/3 = 2.67.
        assert_eq!(score_question(spec, &set("bc")), 2.67);
        // {b,c,e}: 2 hits, 1 extra -> 1 * 4/3 = 1.33.
        assert_eq!(score_question(spec, &set("bce")), 1.33);
        // {a,e}: 0 hits, 2 extras -> negative raw, clipped to 0.
        assert_eq!(score_question(spec, &set("ae")), 0.0);
        // Exact: full points.
        assert_eq!(score_question(spec, &set("bcd")), 4.0);
    }

    #[test]
    fn multi_select_score_stays_in_range_and_monotone() {
        let key = make_key("Q1,\"a,b,c\",3.0\n");
        let spec = key.get("Q1").unwrap();

        // Non-decreasing in hits for fixed extras.
        let with_hits: Vec<f64> = ["", "a", "ab", "abc"]
            .iter()
            .map(|s| score_question(spec, &set(s)))
            .collect();
        assert!(with_hits.windows(2).all(|w| w[0] <= w[1]));

        // Non-increasing in extras for fixed hits.
        let with_extras: Vec<f64> = ["ab", "abd", "abde"]
            .iter()
            .map(|s| score_question(spec, &set(s)))
            .collect();
        assert!(with_extras.windows(2).all(|w| w[0] >= w[1]));

        for s in ["", "a", "ab", "abc", "abd", "abde", "de", "abcde"] {
            let score = score_question(spec, &set(s));
            assert!((0.0..=3.0).contains(&score), "{s} scored {score}");
        }
    }

    #[test]
    fn select_all_boundary() {
        // C=2 of N=5: raw = (2 - 3) * P/2 < 0 -> 0.
        let key = make_key("Q1,\"a,b\",4.0\n");
        let spec = key.get("Q1").unwrap();
        assert_eq!(score_question(spec, &set("abcde")), 0.0);

        // C=4 of N=5: raw = (4 - 1) * P/4 = 3.
        let key = make_key("Q1,\"a,b,c,d\",4.0\n");
        let spec = key.get("Q1").unwrap();
        assert_eq!(score_question(spec, &set("abcde")), 3.0);
    }

    #[test]
    fn batch_totals_and_percent() {
        let key = make_key("Q1,b,2.0\nQ2,\"b,c,d\",4.00\n");
        let rows = vec![
            row("1001", "Q1", "b"),
            row("1001", "Q2", "bc"),
            row("1002", "Q1", "a"),
            row("1002", "Q2", "bcd"),
        ];
        let report = score_rows(&rows, &key);
        assert!(report.warnings.is_empty());
        assert_eq!(report.total_possible, 6.0);

        let t1 = report.total_for("1001").unwrap();
        assert_eq!(t1.total_score, 4.67);
        assert_eq!(t1.percent, round2(4.67 / 6.0 * 100.0));

        let t2 = report.total_for("1002").unwrap();
        assert_eq!(t2.total_score, 4.0);
        assert_eq!(t2.percent, 66.67);
    }

    #[test]
    fn perfect_sheet_scores_hundred_percent() {
        let key = make_key("Q1,b,2.0\nQ2,\"b,c,d\",4.00\nQ3,e,1.0\n");
        let rows = vec![
            row("42", "Q1", "b"),
            row("42", "Q2", "bcd"),
            row("42", "Q3", "e"),
        ];
        let report = score_rows(&rows, &key);
        let t = report.total_for("42").unwrap();
        assert_eq!(t.total_score, 7.0);
        assert_eq!(t.percent, 100.0);
    }

    #[test]
    fn aggregate_stats_match_reference() {
        // Key {a,b} for 4 points: {a,b} earns 4.00, {c,d} earns 0.00 and
        // {a} earns 2.00 -> mean 2.00, percent_correct 50.00.
        let key = make_key("Q1,\"a,b\",4.00\n");
        let rows = vec![
            row("1", "Q1", "ab"),
            row("2", "Q1", "cd"),
            row("3", "Q1", "a"),
        ];
        let report = score_rows(&rows, &key);
        let stat = report.stat_for("Q1").unwrap();
        assert_eq!(stat.mean_score, 2.0);
        assert_eq!(stat.percent_correct, 50.0);
    }

    #[test]
    fn fractional_scores_average_on_rounded_values() {
        let key = make_key("Q1,\"b,c,d\",4.00\n");
        let rows = vec![
            row("1", "Q1", "bcd"), // 4.00
            row("2", "Q1", "ae"),  // 0.00
            row("3", "Q1", "bc"),  // 2.67
        ];
        let report = score_rows(&rows, &key);
        let stat = report.stat_for("Q1").unwrap();
        assert_eq!(stat.mean_score, round2((4.0 + 0.0 + 2.67) / 3.0));
    }

    #[test]
    fn scoring_is_idempotent() {
        let key = make_key("Q1,b,2.0\nQ2,\"a,c\",3.0\n");
        let rows = vec![
            row("7", "Q1", "b"),
            row("7", "Q2", "ac"),
            row("8", "Q1", "e"),
            row("8", "Q2", "abc"),
        ];
        let first = score_rows(&rows, &key);
        let second = score_rows(&rows, &key);
        for (a, b) in first.rows.iter().zip(&second.rows) {
            assert_eq!(a.score, b.score);
        }
        for (a, b) in first.totals.iter().zip(&second.totals) {
            assert_eq!(a, b);
        }
        for (a, b) in first.stats.iter().zip(&second.stats) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn unknown_question_is_skipped_with_warning() {
        let key = make_key("Q1,b,2.0\n");
        let rows = vec![row("9", "Q1", "b"), row("9", "Q99", "a")];
        let report = score_rows(&rows, &key);
        assert_eq!(report.rows.len(), 1);
        assert_eq!(
            report.warnings,
            vec![ScoreWarning::SchemaMismatch {
                student_id: "9".into(),
                question_id: "Q99".into(),
            }]
        );
        // The student's remaining questions still scored.
        assert_eq!(report.total_for("9").unwrap().total_score, 2.0);
    }

    #[test]
    fn question_ids_are_case_normalized() {
        let key = make_key("Q1,b,2.0\n");
        let rows = vec![row("5", "q1", "b")];
        let report = score_rows(&rows, &key);
        assert!(report.warnings.is_empty());
        assert_eq!(report.rows[0].question_id, "Q1");
        assert_eq!(report.rows[0].score, 2.0);
    }
}
