//! Per-question miss analysis over a scored-or-raw results table.
//!
//! Downstream of scoring: answers the instructor question "which questions
//! did the class miss, and how badly". Multi-select questions track
//! partial-credit distributions separately so a hard question with many
//! near-misses reads differently from one nobody attempted.

use std::collections::BTreeMap;

use crate::key::{normalize_question_id, AnswerKey};
use crate::score::ResponseRow;

/// Analysis thresholds.
#[derive(Debug, Clone)]
pub struct MissConfig {
    /// Percent of students at or above which a question is flagged
    /// high-miss.
    pub miss_threshold: f64,
    /// Minimum ratio of correct options selected (0, 1] for a
    /// multi-select response to count as correct.
    pub partial_threshold: f64,
}

impl Default for MissConfig {
    fn default() -> Self {
        Self {
            miss_threshold: 50.0,
            partial_threshold: 1.0,
        }
    }
}

/// Miss statistics for one question.
#[derive(Debug, Clone)]
pub struct QuestionMiss {
    pub question_id: String,
    pub percent_missed: f64,
    pub missed: usize,
    pub total_students: usize,
    /// Correct answer in display form ("b" or "[b,c,d]").
    pub answer_display: String,
    /// Summary of partial selections, e.g. "2 students selected 2/3 correct".
    pub partial_notes: String,
}

/// Full miss report for a batch.
#[derive(Debug, Clone)]
pub struct MissReport {
    /// One row per key question, in key order.
    pub rows: Vec<QuestionMiss>,
    /// Questions at or above the miss threshold: (question id, percent).
    pub high_miss: Vec<(String, f64)>,
    /// Per-response anomalies (invalid selections, multi-marks, wrong
    /// options), one line each.
    pub log: Vec<String>,
}

/// Analyze miss rates per question.
///
/// Every distinct student in `rows` counts toward every question; a
/// student with no row for a question missed it (they left it blank).
pub fn analyze_misses(rows: &[ResponseRow], key: &AnswerKey, config: &MissConfig) -> MissReport {
    // Distinct students in first-appearance order.
    let mut students: Vec<&str> = Vec::new();
    for row in rows {
        if !students.contains(&row.student_id.as_str()) {
            students.push(&row.student_id);
        }
    }
    let total_students = students.len();

    let mut report_rows = Vec::with_capacity(key.len());
    let mut high_miss = Vec::new();
    let mut log = Vec::new();

    for spec in key.iter() {
        let total_correct = spec.num_correct();
        let mut missed = 0usize;
        let mut partial_counts: BTreeMap<usize, usize> = BTreeMap::new();

        for student in &students {
            let selected = rows
                .iter()
                .find(|r| {
                    r.student_id == *student
                        && normalize_question_id(&r.question_id) == spec.question_id
                })
                .map(|r| r.selected.clone())
                .unwrap_or_default();

            if selected.is_empty() {
                missed += 1;
                continue;
            }

            if !spec.is_multiple() {
                if selected == spec.correct_options {
                    continue;
                }
                if selected.len() > 1 {
                    log.push(format!(
                        "{} / {student}: multiple marks for single-choice question",
                        spec.question_id
                    ));
                }
                missed += 1;
                continue;
            }

            let extras: Vec<char> = selected
                .difference(&spec.correct_options)
                .copied()
                .collect();
            let hits = selected.intersection(&spec.correct_options).count();
            if !extras.is_empty() {
                let listed: Vec<String> = extras.iter().map(|c| c.to_string()).collect();
                log.push(format!(
                    "{} / {student}: selected incorrect option(s) {}",
                    spec.question_id,
                    listed.join(", ")
                ));
                missed += 1;
                continue;
            }
            if hits == 0 {
                missed += 1;
                continue;
            }

            if hits < total_correct {
                *partial_counts.entry(hits).or_insert(0) += 1;
            }
            let ratio = hits as f64 / total_correct as f64;
            if ratio + 1e-9 < config.partial_threshold {
                missed += 1;
            }
        }

        let percent_missed = if total_students > 0 {
            missed as f64 / total_students as f64 * 100.0
        } else {
            0.0
        };
        if percent_missed >= config.miss_threshold && total_students > 0 {
            high_miss.push((spec.question_id.clone(), percent_missed));
        }
        report_rows.push(QuestionMiss {
            question_id: spec.question_id.clone(),
            percent_missed,
            missed,
            total_students,
            answer_display: spec.answer_display(),
            partial_notes: format_partial_notes(total_correct, &partial_counts),
        });
    }

    MissReport {
        rows: report_rows,
        high_miss,
        log,
    }
}

fn format_partial_notes(total_correct: usize, partial_counts: &BTreeMap<usize, usize>) -> String {
    if total_correct <= 1 || partial_counts.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = partial_counts
        .iter()
        .rev()
        .map(|(hits, count)| {
            let label = if *count == 1 { "student" } else { "students" };
            format!("{count} {label} selected {hits}/{total_correct} correct")
        })
        .collect();
    parts.join(", ")
}
