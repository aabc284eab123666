//! CSV boundary: results, graded report, question stats, miss report.
//!
//! Column contracts match the spreadsheet tooling downstream: results CSV
//! is `student_id,question_id,selected_answers` (one row per student and
//! question, selections comma-joined); graded output adds per-question
//! score plus repeated student totals.

use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::path::Path;

use thiserror::Error;

use crate::misses::MissReport;
use crate::response::SheetResponse;
use crate::score::{ResponseRow, ScoreReport};

/// Report serialization / deserialization errors.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("results CSV missing columns: {0}")]
    MissingColumns(String),
    #[error("results CSV has no data rows")]
    Empty,
}

fn join_selected(selected: impl Iterator<Item = char>) -> String {
    let letters: Vec<String> = selected.map(|c| c.to_string()).collect();
    letters.join(",")
}

/// Write scanner results: one row per (student, question).
pub fn write_results_csv(path: &Path, responses: &[SheetResponse]) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["student_id", "question_id", "selected_answers"])?;
    for resp in responses {
        let student_id = resp.result_student_id();
        for answer in &resp.answers {
            writer.write_record([
                student_id.as_str(),
                answer.question_id.as_str(),
                &join_selected(answer.selected.iter().copied()),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Read a results CSV back into scoring rows. Headers are matched
/// case-insensitively; selection cells tolerate spaces and semicolons.
pub fn read_results_csv(path: &Path) -> Result<Vec<ResponseRow>, ReportError> {
    let data = std::fs::read_to_string(path)?;
    read_results_reader(data.as_bytes())
}

/// Reader-based variant of [`read_results_csv`].
pub fn read_results_reader<R: Read>(reader: R) -> Result<Vec<ResponseRow>, ReportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let col = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let (s_col, q_col, a_col) = match (
        col("student_id"),
        col("question_id"),
        col("selected_answers"),
    ) {
        (Some(s), Some(q), Some(a)) => (s, q, a),
        (s, q, a) => {
            let missing: Vec<&str> = [
                (s, "student_id"),
                (q, "question_id"),
                (a, "selected_answers"),
            ]
            .iter()
            .filter(|(found, _)| found.is_none())
            .map(|(_, name)| *name)
            .collect();
            return Err(ReportError::MissingColumns(missing.join(", ")));
        }
    };

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        rows.push(ResponseRow {
            student_id: record.get(s_col).unwrap_or("").trim().to_string(),
            question_id: record.get(q_col).unwrap_or("").trim().to_string(),
            selected: tokenize_selection(record.get(a_col).unwrap_or("")),
        });
    }
    if rows.is_empty() {
        return Err(ReportError::Empty);
    }
    Ok(rows)
}

/// Parse a selection cell ("b", "b,c", "B; C", "[b,c]") into a label set.
pub fn tokenize_selection(raw: &str) -> BTreeSet<char> {
    let mut text = raw.trim();
    if text.starts_with('[') && text.ends_with(']') {
        text = &text[1..text.len() - 1];
    }
    text.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter_map(|token| {
            let token = token.trim();
            let mut chars = token.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphabetic() => Some(c.to_ascii_lowercase()),
                _ => None,
            }
        })
        .collect()
}

/// Write the graded report: per-question rows with repeated student totals,
/// sorted by (student, question).
pub fn write_graded_csv(path: &Path, report: &ScoreReport) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "student_id",
        "question_id",
        "selected_answers",
        "score_per_question",
        "total_score",
        "percent_grade",
    ])?;
    for row in &report.rows {
        let total = report.total_for(&row.student_id);
        let (total_score, percent) = total.map(|t| (t.total_score, t.percent)).unwrap_or((0.0, 0.0));
        writer.write_record([
            row.student_id.as_str(),
            row.question_id.as_str(),
            &join_selected(row.selected.iter().copied()),
            &format!("{:.2}", row.score),
            &format!("{total_score:.2}"),
            &format!("{percent:.2}"),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write per-question aggregate statistics.
pub fn write_question_stats_csv(path: &Path, report: &ScoreReport) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["question_id", "mean_score", "percent_correct"])?;
    for stat in &report.stats {
        writer.write_record([
            stat.question_id.as_str(),
            &format!("{:.2}", stat.mean_score),
            &format!("{:.2}", stat.percent_correct),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the per-question miss report.
pub fn write_miss_report_csv(path: &Path, report: &MissReport) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "Question",
        "Percent_Missed",
        "Missed_Count",
        "Total_Students",
        "Correct_Answer",
        "Partial_Credit_Notes",
    ])?;
    for row in &report.rows {
        writer.write_record([
            row.question_id.as_str(),
            &format!("{:.2}", row.percent_missed),
            &row.missed.to_string(),
            &row.total_students.to_string(),
            row.answer_display.as_str(),
            row.partial_notes.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Append-free warning log: one line per entry. Nothing is written when
/// there are no entries.
pub fn write_warning_log<S: AsRef<str>>(path: &Path, entries: &[S]) -> Result<(), ReportError> {
    if entries.is_empty() {
        return Ok(());
    }
    let mut file = std::fs::File::create(path)?;
    for entry in entries {
        writeln!(file, "{}", entry.as_ref())?;
    }
    Ok(())
}

/// Collect the warning-log lines for a set of responses.
pub fn warning_log_lines(responses: &[SheetResponse]) -> Vec<String> {
    responses
        .iter()
        .flat_map(|resp| {
            resp.warnings
                .iter()
                .map(move |w| format!("{}: {}", resp.source, w))
        })
        .collect()
}
