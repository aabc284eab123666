//! bubblegrid — bubble-sheet recognition and scoring.
//!
//! Turns scanned, hand-marked answer sheets into structured, scored
//! results. The pipeline stages are:
//!
//! 1. **Layout** – typed, immutable bubble geometry loaded from the
//!    generator's JSON.
//! 2. **Align** – fiducial square localization + least-squares affine fit
//!    mapping layout coordinates to image pixels.
//! 3. **Measure** – per-bubble fill ratio under a locally-derived ink
//!    threshold.
//! 4. **Classify** – absolute/relative thresholding into selections and
//!    ID digits; ambiguity is surfaced, never guessed away.
//! 5. **Score** – answer-key driven grading with Canvas-style partial
//!    credit, per-student totals and per-question statistics.
//!
//! Sheets are processed independently (see [`batch`]); the only
//! synchronization point is the aggregate-statistics step in [`score`].
//! Warnings accumulate on each result instead of aborting batches.
//!
//! # Example
//!
//! ```no_run
//! use bubblegrid::{AnswerKey, ScanConfig, SheetLayout};
//! use std::path::Path;
//!
//! let layout = SheetLayout::from_json_file(Path::new("test_layout.json")).unwrap();
//! let config = ScanConfig::default();
//! let paths = bubblegrid::collect_images(Path::new("scans/")).unwrap();
//! let outcome = bubblegrid::process_batch(&paths, &layout, &config);
//!
//! let key = AnswerKey::from_csv_path(Path::new("answer_key.csv")).unwrap();
//! let rows = bubblegrid::rows_from_responses(&outcome.responses);
//! let report = bubblegrid::score_rows(&rows, &key);
//! println!("{} students scored", report.totals.len());
//! ```

pub mod align;
pub mod batch;
pub mod classify;
pub mod config;
pub mod key;
pub mod layout;
pub mod measure;
pub mod misses;
pub mod overlay;
pub mod report;
pub mod response;
pub mod score;
pub mod sheet;

#[cfg(test)]
pub(crate) mod test_utils;

pub use align::{align, AlignmentError, ScanTransform};
pub use batch::{collect_images, process_batch, BatchError, BatchOutcome, SkippedSheet};
pub use classify::{classify_digit, classify_question, is_marked, DigitReading};
pub use config::ScanConfig;
pub use key::{AnswerKey, KeyError, QuestionSpec};
pub use layout::{IdOrientation, LayoutError, SheetLayout};
pub use measure::{measure_bubble, BubbleMeasurement};
pub use misses::{analyze_misses, MissConfig, MissReport};
pub use overlay::render_overlay;
pub use report::{
    read_results_csv, write_graded_csv, write_miss_report_csv, write_question_stats_csv,
    write_results_csv, write_warning_log, ReportError,
};
pub use response::{QuestionAnswer, ScanWarning, SheetResponse, StudentId};
pub use score::{
    rows_from_responses, score_question, score_rows, GradedRow, QuestionStat, ResponseRow,
    ScoreReport, ScoreWarning, StudentTotal,
};
pub use sheet::process_sheet;
