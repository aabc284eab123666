//! Layout-to-image transform estimation via least squares.
//!
//! A scanned page differs from the reference layout by translation, small
//! rotation and scale drift; an affine model absorbs all of those (plus the
//! y-axis flip between layout points and raster rows) and, unlike an exact
//! 4-point projective fit, leaves residuals that expose a bad registration.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use thiserror::Error;

use crate::response::ScanWarning;

/// Minimum marker correspondences for an affine fit.
pub const MIN_CORRESPONDENCES: usize = 3;

/// Alignment failures that abort processing of one sheet.
#[derive(Debug, Clone, Error)]
pub enum AlignmentError {
    #[error("insufficient markers: need {needed}, found {found}")]
    InsufficientMarkers { needed: usize, found: usize },
    #[error("transform fit failed: {0}")]
    FitFailed(String),
}

/// Reprojection residual of one marker correspondence.
#[derive(Debug, Clone, Copy)]
pub struct MarkerResidual {
    /// Index of the marker in the layout's marker list.
    pub index: usize,
    pub residual_px: f64,
}

/// Immutable mapping from layout coordinates to image pixel coordinates,
/// computed once per scanned image.
#[derive(Debug, Clone)]
pub struct ScanTransform {
    /// Affine matrix (last row 0 0 1).
    m: Matrix3<f64>,
    /// Overall registration confidence in [0, 1].
    pub confidence: f64,
    /// Per-marker reprojection residuals for the markers used in the fit.
    pub residuals: Vec<MarkerResidual>,
    /// Alignment diagnostics carried forward into the sheet response.
    pub warnings: Vec<ScanWarning>,
}

impl ScanTransform {
    pub(crate) fn new(
        m: Matrix3<f64>,
        confidence: f64,
        residuals: Vec<MarkerResidual>,
        warnings: Vec<ScanWarning>,
    ) -> Self {
        Self {
            m,
            confidence,
            residuals,
            warnings,
        }
    }

    /// Map a layout-space point into image pixel coordinates.
    #[inline]
    pub fn project(&self, x: f64, y: f64) -> [f64; 2] {
        let p = self.m * Vector3::new(x, y, 1.0);
        [p[0], p[1]]
    }

    /// Isotropic scale factor of the linear part, used to map layout
    /// radii into pixel radii.
    pub fn mean_scale(&self) -> f64 {
        let det = self.m[(0, 0)] * self.m[(1, 1)] - self.m[(0, 1)] * self.m[(1, 0)];
        det.abs().sqrt()
    }

    /// Mean reprojection residual over the fitted markers.
    pub fn mean_residual_px(&self) -> f64 {
        if self.residuals.is_empty() {
            return 0.0;
        }
        self.residuals.iter().map(|r| r.residual_px).sum::<f64>() / self.residuals.len() as f64
    }

    /// The underlying 3x3 affine matrix (row-major, last row 0 0 1).
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.m
    }
}

/// Reprojection error: ||affine(src) - dst||.
pub fn reprojection_error(m: &Matrix3<f64>, src: &[f64; 2], dst: &[f64; 2]) -> f64 {
    let p = m * Vector3::new(src[0], src[1], 1.0);
    let dx = p[0] - dst[0];
    let dy = p[1] - dst[1];
    (dx * dx + dy * dy).sqrt()
}

/// Estimate the affine transform mapping `src` (layout points) onto `dst`
/// (image pixels) by least squares over >= 3 correspondences.
///
/// Each correspondence contributes two rows to the design matrix:
///
/// ```text
/// [ x  y  1  0  0  0 ] [a b tx c d ty]^T = u
/// [ 0  0  0  x  y  1 ]                     v
/// ```
pub fn fit_affine(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Result<Matrix3<f64>, AlignmentError> {
    let n = src.len();
    if n < MIN_CORRESPONDENCES || dst.len() < MIN_CORRESPONDENCES {
        return Err(AlignmentError::InsufficientMarkers {
            needed: MIN_CORRESPONDENCES,
            found: n.min(dst.len()),
        });
    }
    if src.len() != dst.len() {
        return Err(AlignmentError::FitFailed(
            "src and dst must have the same length".into(),
        ));
    }

    let mut a = DMatrix::zeros(2 * n, 6);
    let mut b = DVector::zeros(2 * n);
    for i in 0..n {
        let [x, y] = src[i];
        let [u, v] = dst[i];

        a[(2 * i, 0)] = x;
        a[(2 * i, 1)] = y;
        a[(2 * i, 2)] = 1.0;
        b[2 * i] = u;

        a[(2 * i + 1, 3)] = x;
        a[(2 * i + 1, 4)] = y;
        a[(2 * i + 1, 5)] = 1.0;
        b[2 * i + 1] = v;
    }

    let svd = a.svd(true, true);
    let p = svd
        .solve(&b, 1e-12)
        .map_err(|e| AlignmentError::FitFailed(e.to_string()))?;

    let m = Matrix3::new(
        p[0], p[1], p[2],
        p[3], p[4], p[5],
        0.0, 0.0, 1.0,
    );
    if m.iter().any(|v| !v.is_finite()) {
        return Err(AlignmentError::FitFailed(
            "non-finite transform coefficients".into(),
        ));
    }
    Ok(m)
}
