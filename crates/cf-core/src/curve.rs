//! Fade Curve Types
//!
//! Volume transition curves shared by the fade timeline and the music
//! crossfade path.

use serde::{Deserialize, Serialize};
use std::f32::consts::{E, FRAC_PI_2};

/// Fade curve type for volume transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FadeCurve {
    /// Linear interpolation (constant rate)
    #[default]
    Linear = 0,
    /// Logarithmic curve (slow start, fast end) - 3dB
    Log3 = 1,
    /// Sine curve (smooth S)
    Sine = 2,
    /// Logarithmic curve (slow start, fast end) - 1dB
    Log1 = 3,
    /// Inverse S-curve (fast start/end, slow middle)
    InvSCurve = 4,
    /// S-curve (slow start/end, fast middle)
    SCurve = 5,
    /// Exponential curve (fast start, slow end) - 1dB
    Exp1 = 6,
    /// Exponential curve (fast start, slow end) - 3dB
    Exp3 = 7,
}

impl FadeCurve {
    /// Get display name
    pub fn name(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "Linear",
            FadeCurve::Log3 => "Log3",
            FadeCurve::Sine => "Sine",
            FadeCurve::Log1 => "Log1",
            FadeCurve::InvSCurve => "InvSCurve",
            FadeCurve::SCurve => "SCurve",
            FadeCurve::Exp1 => "Exp1",
            FadeCurve::Exp3 => "Exp3",
        }
    }

    /// Evaluate curve at position t (0.0 - 1.0)
    ///
    /// Returns value in range 0.0 - 1.0
    #[inline]
    pub fn evaluate(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);

        match self {
            // Linear: y = t
            FadeCurve::Linear => t,

            // Logarithmic 3dB: slow start, fast end
            FadeCurve::Log3 => (1.0 + t * 3.0).ln() / 4.0_f32.ln(),

            // Sine: smooth S using sine quarter period
            FadeCurve::Sine => (t * FRAC_PI_2).sin(),

            // Logarithmic 1dB: gentler log curve
            FadeCurve::Log1 => (1.0 + t).ln() / 2.0_f32.ln(),

            // Inverse S-curve: fast at edges, slow in middle
            FadeCurve::InvSCurve => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - 2.0 * (1.0 - t) * (1.0 - t)
                }
            }

            // S-curve: slow at edges, fast in middle (cubic)
            FadeCurve::SCurve => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }

            // Exponential 1dB: fast start, slow end
            FadeCurve::Exp1 => (E.powf(t) - 1.0) / (E - 1.0),

            // Exponential 3dB: steeper exponential
            FadeCurve::Exp3 => (E.powf(t * 3.0) - 1.0) / (E.powi(3) - 1.0),
        }
    }

    /// Evaluate curve for fade-out (inverted)
    ///
    /// For fade-out, we want the curve to go from 1.0 to 0.0
    #[inline]
    pub fn evaluate_fadeout(&self, t: f32) -> f32 {
        1.0 - self.evaluate(t)
    }
}

/// Equal power crossfade calculation
///
/// For crossfading between two sources without volume dip.
#[inline]
pub fn equal_power_crossfade(t: f32) -> (f32, f32) {
    let t = t.clamp(0.0, 1.0);
    let angle = t * FRAC_PI_2;

    // gain_a decreases, gain_b increases
    // Sum of squares = 1.0 (constant power)
    let gain_a = angle.cos();
    let gain_b = angle.sin();

    (gain_a, gain_b)
}
