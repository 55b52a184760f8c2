//! Preview zoom state and the slider curve behind it
//!
//! The slider is a linear 0..1 track; the zoom it controls is not. The lower
//! half of the track covers `MIN_SCALE..RESET_SCALE` and the upper half covers
//! `RESET_SCALE..MAX_SCALE`, each half geometric so equal slider steps give
//! equal zoom ratios.

/// Lowest zoom the preview accepts
pub const MIN_SCALE: f64 = 0.1;
/// Highest zoom the preview accepts
pub const MAX_SCALE: f64 = 3.0;
/// "Fit to view" zoom, sitting at the middle of the slider
pub const RESET_SCALE: f64 = 1.0;

const MID_SLIDER: f64 = 0.5;

/// Map a slider position (0 = bottom, 1 = top) to a zoom scale.
///
/// Out-of-range positions are clamped; NaN maps to the reset scale.
pub fn scale_from_slider_percent(pct: f64) -> f64 {
    if pct.is_nan() {
        return RESET_SCALE;
    }
    let pct = pct.clamp(0.0, 1.0);
    if pct <= MID_SLIDER {
        MIN_SCALE * (RESET_SCALE / MIN_SCALE).powf(pct / MID_SLIDER)
    } else {
        RESET_SCALE * (MAX_SCALE / RESET_SCALE).powf((pct - MID_SLIDER) / (1.0 - MID_SLIDER))
    }
}

/// Inverse of [`scale_from_slider_percent`].
///
/// Out-of-range scales are clamped; NaN maps to the middle of the track.
pub fn slider_percent_from_scale(scale: f64) -> f64 {
    if scale.is_nan() {
        return MID_SLIDER;
    }
    let scale = scale.clamp(MIN_SCALE, MAX_SCALE);
    if scale <= RESET_SCALE {
        MID_SLIDER * (scale / MIN_SCALE).ln() / (RESET_SCALE / MIN_SCALE).ln()
    } else {
        MID_SLIDER + (1.0 - MID_SLIDER) * (scale / RESET_SCALE).ln() / (MAX_SCALE / RESET_SCALE).ln()
    }
}

/// Zoom state for the sheet preview
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zoom {
    /// Current zoom factor (1.0 = fit to view)
    pub factor: f64,
}

impl Default for Zoom {
    fn default() -> Self {
        Self {
            factor: RESET_SCALE,
        }
    }
}

impl Zoom {
    /// Factor applied per zoom step, in both directions
    pub const STEP_RATE: f64 = 1.1;

    pub fn new(factor: f64) -> Self {
        Self {
            factor: Self::clamp_factor(factor),
        }
    }

    /// Returns the current zoom factor
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Zoom in by one step
    pub fn step_in(&mut self) {
        self.factor = Self::clamp_factor(self.factor * Self::STEP_RATE);
    }

    /// Zoom out by one step
    pub fn step_out(&mut self) {
        self.factor = Self::clamp_factor(self.factor / Self::STEP_RATE);
    }

    /// Positive `steps` zoom in, negative zoom out
    pub fn step_by(&mut self, steps: i32) {
        for _ in 0..steps.unsigned_abs() {
            if steps > 0 {
                self.step_in();
            } else {
                self.step_out();
            }
        }
    }

    /// Back to fit-to-view
    pub fn reset(&mut self) {
        self.factor = RESET_SCALE;
    }

    /// Move the slider thumb to `pct` of the track
    pub fn set_from_slider(&mut self, pct: f64) {
        self.factor = scale_from_slider_percent(pct);
    }

    /// Where the slider thumb sits for the current factor
    pub fn slider_percent(&self) -> f64 {
        slider_percent_from_scale(self.factor)
    }

    /// Tooltip text, e.g. "125%"
    pub fn percent_label(&self) -> String {
        format!("{}%", (self.factor * 100.0).round() as i64)
    }

    /// Clamp factor to valid range, handling NaN/Inf
    pub fn clamp_factor(factor: f64) -> f64 {
        if !factor.is_finite() {
            RESET_SCALE
        } else {
            factor.clamp(MIN_SCALE, MAX_SCALE)
        }
    }
}
