//! Pipeline tuning knobs.
//!
//! One [`ScanConfig`] value is passed by reference into alignment,
//! measurement and classification so a batch can run with its own
//! calibration without cross-contamination. Serde-derived so a calibration
//! can be stored next to a scan batch as JSON.

/// Top-level scanning configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Minimum fill ratio for a bubble to count as marked on its own.
    pub fill_abs_threshold: f32,
    /// Fraction of the best-filled sibling above which a bubble also counts
    /// as marked (rescues faint marks under poor lighting).
    pub fill_rel_threshold: f32,
    /// Minimum fill ratio for the relative rule to apply at all; below this
    /// a group is treated as unmarked smudge noise.
    pub fill_noise_floor: f32,
    /// Maximum fill-ratio gap between the two best digit bubbles before the
    /// slot is flagged ambiguous instead of auto-resolved.
    pub digit_ambiguity_margin: f32,
    /// Mean marker reprojection residual (pixels) above which the sheet is
    /// flagged as alignment-degraded.
    pub residual_tolerance_px: f64,
    /// Minimum per-marker detection confidence for a marker to count as found.
    pub marker_confidence_floor: f32,
    /// Half-extent of the per-marker search window, as a fraction of the
    /// larger image dimension. Bounds the tolerated page offset.
    pub marker_search_frac: f32,
    /// A sample is ink when darker than `local background x this ratio`.
    pub local_contrast_ratio: f32,
    /// Fraction of the bubble radius excluded at the rim to avoid the
    /// printed outline and anti-aliasing bias.
    pub sample_border_frac: f32,
    /// Sampling grid pitch in image pixels.
    pub sample_step_px: f32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            fill_abs_threshold: 0.5,
            fill_rel_threshold: 0.8,
            fill_noise_floor: 0.2,
            digit_ambiguity_margin: 0.1,
            residual_tolerance_px: 3.0,
            marker_confidence_floor: 0.35,
            marker_search_frac: 0.12,
            local_contrast_ratio: 0.75,
            sample_border_frac: 0.15,
            sample_step_px: 1.0,
        }
    }
}

impl ScanConfig {
    /// Override the absolute fill threshold, keeping everything else.
    pub fn with_fill_threshold(mut self, threshold: f32) -> Self {
        self.fill_abs_threshold = threshold;
        self
    }
}
