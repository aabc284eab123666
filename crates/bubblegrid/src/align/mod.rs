//! Geometric registration of a scanned image against the reference layout.

mod markers;
mod transform;

pub use markers::{detect_markers, MarkerDetection};
pub use transform::{
    fit_affine, reprojection_error, AlignmentError, MarkerResidual, ScanTransform,
    MIN_CORRESPONDENCES,
};

use image::GrayImage;

use crate::config::ScanConfig;
use crate::layout::SheetLayout;
use crate::response::ScanWarning;

/// Locate the layout's fiducial markers in `img` and fit the layout-to-image
/// transform.
///
/// Markers below the confidence floor are dropped with a warning; fewer than
/// [`MIN_CORRESPONDENCES`] surviving markers is a hard failure. A fit whose
/// mean residual exceeds `config.residual_tolerance_px` is still returned,
/// flagged as degraded, so callers can decide to reject or annotate.
///
/// Pure function of the image and marker geometry; no I/O.
pub fn align(
    img: &GrayImage,
    layout: &SheetLayout,
    config: &ScanConfig,
) -> Result<ScanTransform, AlignmentError> {
    let detections = detect_markers(img, layout, config);

    let mut warnings = Vec::new();
    let mut found = Vec::new();
    for det in &detections {
        if det.is_found(config) {
            found.push(det);
        } else {
            warnings.push(ScanWarning::MarkerNotFound {
                index: det.index,
                confidence: det.confidence,
            });
        }
    }

    if found.len() < MIN_CORRESPONDENCES {
        return Err(AlignmentError::InsufficientMarkers {
            needed: MIN_CORRESPONDENCES,
            found: found.len(),
        });
    }

    let src: Vec<[f64; 2]> = found.iter().map(|d| d.layout_center).collect();
    let dst: Vec<[f64; 2]> = found.iter().map(|d| d.image_center).collect();
    let m = fit_affine(&src, &dst)?;

    let residuals: Vec<MarkerResidual> = found
        .iter()
        .zip(src.iter().zip(&dst))
        .map(|(det, (s, d))| MarkerResidual {
            index: det.index,
            residual_px: reprojection_error(&m, s, d),
        })
        .collect();
    let mean_residual =
        residuals.iter().map(|r| r.residual_px).sum::<f64>() / residuals.len() as f64;

    if mean_residual > config.residual_tolerance_px {
        tracing::warn!(
            mean_residual_px = mean_residual,
            tolerance_px = config.residual_tolerance_px,
            "alignment residual above tolerance"
        );
        warnings.push(ScanWarning::AlignmentDegraded {
            mean_residual_px: mean_residual,
            tolerance_px: config.residual_tolerance_px,
        });
    }

    let marker_confidence =
        found.iter().map(|d| d.confidence as f64).sum::<f64>() / found.len() as f64;
    let coverage = found.len() as f64 / detections.len().max(1) as f64;
    let confidence = marker_confidence * coverage;

    Ok(ScanTransform::new(m, confidence, residuals, warnings))
}
