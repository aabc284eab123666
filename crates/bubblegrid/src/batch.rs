//! Batch processing: a folder (or single file) of scans to responses.
//!
//! Sheets are independent: each worker owns its image buffer and produces
//! one response, so the batch fans out with rayon. A sheet that fails to
//! load or align becomes a skipped record; the batch never aborts.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::layout::SheetLayout;
use crate::response::SheetResponse;
use crate::sheet::process_sheet;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "tif", "tiff"];

/// Batch-level input errors.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("scan input not found: {0}")]
    NotFound(PathBuf),
    #[error("no image files under {0}")]
    NoImages(PathBuf),
}

/// A sheet that produced no response, with the reason.
#[derive(Debug, Clone)]
pub struct SkippedSheet {
    /// Identifier of the source image (file stem).
    pub source: String,
    pub path: PathBuf,
    pub reason: String,
}

/// Everything a batch run produces.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Successful responses, ordered by source path.
    pub responses: Vec<SheetResponse>,
    /// Sheets skipped on load or alignment failure, ordered by source path.
    pub skipped: Vec<SkippedSheet>,
}

impl BatchOutcome {
    /// Count of sheets that carried at least one warning.
    pub fn n_flagged(&self) -> usize {
        self.responses
            .iter()
            .filter(|r| !r.warnings.is_empty())
            .count()
    }
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Collect scan inputs: a single image file, or every image under a
/// directory (recursive), sorted for deterministic processing order.
pub fn collect_images(input: &Path) -> Result<Vec<PathBuf>, BatchError> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(BatchError::NotFound(input.to_path_buf()));
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_image_path(path))
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(BatchError::NoImages(input.to_path_buf()));
    }
    Ok(paths)
}

fn source_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Process every image in parallel against one layout and configuration.
pub fn process_batch(
    paths: &[PathBuf],
    layout: &SheetLayout,
    config: &ScanConfig,
) -> BatchOutcome {
    let results: Vec<Result<SheetResponse, SkippedSheet>> = paths
        .par_iter()
        .map(|path| {
            let source = source_name(path);
            let img = image::open(path)
                .map(|i| i.to_luma8())
                .map_err(|e| SkippedSheet {
                    source: source.clone(),
                    path: path.clone(),
                    reason: format!("failed to load image: {e}"),
                })?;
            process_sheet(&img, layout, config, &source).map_err(|e| {
                tracing::warn!(source = %source, error = %e, "sheet skipped");
                SkippedSheet {
                    source: source.clone(),
                    path: path.clone(),
                    reason: e.to_string(),
                }
            })
        })
        .collect();

    let mut responses = Vec::new();
    let mut skipped = Vec::new();
    for result in results {
        match result {
            Ok(resp) => responses.push(resp),
            Err(skip) => skipped.push(skip),
        }
    }

    tracing::info!(
        n_ok = responses.len(),
        n_skipped = skipped.len(),
        "batch processed"
    );
    BatchOutcome { responses, skipped }
}
