//! Fill-ratio classification: bubbles to discrete selections.
//!
//! The marked/unmarked decision is a pure predicate over a measurement and
//! its sibling group so it can be unit-tested in isolation; nothing here
//! touches the image.

use crate::config::ScanConfig;
use crate::measure::BubbleMeasurement;

/// Outcome of reading one student-ID digit slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DigitReading {
    /// Exactly one bubble won the slot.
    Digit(u8),
    /// No bubble in the slot is convincingly marked.
    Blank,
    /// The two best fills are within the ambiguity margin; not auto-resolved.
    Ambiguous { best_fill: f32, second_fill: f32 },
}

/// The marked-bubble predicate.
///
/// A bubble is marked when its fill clears the absolute threshold, or when
/// it is close enough to the best fill in its sibling group (relative rule,
/// tolerating globally faint marks). The noise floor keeps the relative
/// rule from promoting smudges in a group where nothing is genuinely
/// filled.
pub fn is_marked(fill_ratio: f32, max_sibling_fill: f32, config: &ScanConfig) -> bool {
    if fill_ratio >= config.fill_abs_threshold {
        return true;
    }
    fill_ratio >= config.fill_noise_floor
        && fill_ratio >= config.fill_rel_threshold * max_sibling_fill
}

/// Classify one question's sibling group into selected option labels.
///
/// Returns labels in layout order. Zero marked bubbles yield an empty
/// selection; multiple marked bubbles are all preserved — collapsing a
/// multi-mark would hide information the scoring stage needs.
pub fn classify_question(
    measurements: &[(char, BubbleMeasurement)],
    config: &ScanConfig,
) -> Vec<char> {
    let max_fill = group_max(measurements.iter().map(|(_, m)| m));
    measurements
        .iter()
        .filter(|(_, m)| m.in_image && is_marked(m.fill_ratio, max_fill, config))
        .map(|(option, _)| *option)
        .collect()
}

/// Classify one student-ID digit slot.
///
/// Picks the single best-filled bubble; when the runner-up is within the
/// ambiguity margin the slot is surfaced as [`DigitReading::Ambiguous`]
/// instead of being silently resolved.
pub fn classify_digit(
    measurements: &[(u8, BubbleMeasurement)],
    config: &ScanConfig,
) -> DigitReading {
    let mut best: Option<(u8, f32)> = None;
    let mut second_fill = 0.0f32;
    for (value, m) in measurements {
        if !m.in_image {
            continue;
        }
        match best {
            Some((_, best_fill)) if m.fill_ratio <= best_fill => {
                second_fill = second_fill.max(m.fill_ratio);
            }
            Some((_, best_fill)) => {
                second_fill = second_fill.max(best_fill);
                best = Some((*value, m.fill_ratio));
            }
            None => best = Some((*value, m.fill_ratio)),
        }
    }

    let Some((value, best_fill)) = best else {
        return DigitReading::Blank;
    };
    if !is_marked(best_fill, best_fill, config) {
        return DigitReading::Blank;
    }
    if best_fill - second_fill < config.digit_ambiguity_margin
        && is_marked(second_fill, best_fill, config)
    {
        return DigitReading::Ambiguous {
            best_fill,
            second_fill,
        };
    }
    DigitReading::Digit(value)
}

fn group_max<'a>(measurements: impl Iterator<Item = &'a BubbleMeasurement>) -> f32 {
    measurements
        .filter(|m| m.in_image)
        .map(|m| m.fill_ratio)
        .fold(0.0f32, f32::max)
}
