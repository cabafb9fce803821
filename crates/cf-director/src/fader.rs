//! Fade timeline
//!
//! Pure time-function calculator: given the host clock, produces a 0..1 gain
//! multiplier from independent fade-in and fade-out schedules. The timeline
//! never mutates on read; callers sample [`FadeTimeline::value`] every tick
//! and react to the completion flag.

use cf_core::{FadeCurve, HostTime, Seconds};

#[derive(Debug, Clone, Copy, PartialEq)]
struct FadeSchedule {
    start: HostTime,
    duration: Seconds,
}

impl FadeSchedule {
    #[inline]
    fn completion(&self) -> HostTime {
        self.start + self.duration
    }

    /// Progress in [0,1]; zero duration is a step at the start time
    fn progress(&self, now: HostTime) -> f64 {
        if now < self.start {
            0.0
        } else if self.duration <= 0.0 {
            1.0
        } else {
            ((now - self.start) / self.duration).clamp(0.0, 1.0)
        }
    }
}

/// Result of sampling a fade timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeValue {
    /// Combined fade multiplier in [0,1]
    pub gain: f32,
    /// True the moment the fade-out window has fully elapsed
    pub fade_out_completed: bool,
}

impl FadeValue {
    /// Unity gain, no fade activity
    pub const UNITY: FadeValue = FadeValue {
        gain: 1.0,
        fade_out_completed: false,
    };
}

/// Independent fade-in / fade-out schedules with curve shaping
///
/// The combine rule for overlapping fade-out requests is
/// faster-completion-wins: a second request only replaces the active
/// schedule when it would finish strictly sooner.
#[derive(Debug, Clone, Default)]
pub struct FadeTimeline {
    fade_in: Option<FadeSchedule>,
    fade_out: Option<FadeSchedule>,
    fade_in_curve: FadeCurve,
    fade_out_curve: FadeCurve,
}

impl FadeTimeline {
    /// Create an empty timeline (unity gain)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the curves applied to fade-in and fade-out progress
    pub fn set_curves(&mut self, fade_in: FadeCurve, fade_out: FadeCurve) {
        self.fade_in_curve = fade_in;
        self.fade_out_curve = fade_out;
    }

    /// Set only the fade-out curve, leaving the fade-in curve untouched
    pub fn set_fade_out_curve(&mut self, curve: FadeCurve) {
        self.fade_out_curve = curve;
    }

    /// Sample the timeline at the given host time
    pub fn value(&self, now: HostTime) -> FadeValue {
        let mut gain = 1.0_f32;
        let mut completed = false;

        if let Some(out) = &self.fade_out {
            if now >= out.start {
                let progress = out.progress(now);
                gain *= self.fade_out_curve.evaluate_fadeout(progress as f32);
                completed = progress >= 1.0;
            }
        }

        if let Some(fade_in) = &self.fade_in {
            gain *= self.fade_in_curve.evaluate(fade_in.progress(now) as f32);
        }

        FadeValue {
            gain,
            fade_out_completed: completed,
        }
    }

    /// Request a fade-out of `duration` starting at `now + delay`
    ///
    /// If a fade-out is already scheduled, the request only takes effect
    /// when it would complete sooner than the existing one.
    pub fn start_fade_out(&mut self, now: HostTime, duration: Seconds, delay: Seconds) {
        let requested = FadeSchedule {
            start: now + delay.max(0.0),
            duration: duration.max(0.0),
        };
        match &self.fade_out {
            Some(existing) if existing.completion() <= requested.completion() => {}
            _ => self.fade_out = Some(requested),
        }
    }

    /// Request a fade-in of `duration` starting at `at`
    ///
    /// With `cancel_fade_out`, an active fade-out is removed and the fade-in
    /// is back-dated so its value at `now` matches the gain the fade-out had
    /// reached, reversing smoothly instead of jumping.
    pub fn start_fade_in(
        &mut self,
        now: HostTime,
        duration: Seconds,
        at: HostTime,
        cancel_fade_out: bool,
    ) {
        let duration = duration.max(0.0);
        if cancel_fade_out && self.fade_out.is_some() {
            let current = self.value(now).gain as f64;
            self.fade_out = None;
            self.fade_in = Some(FadeSchedule {
                start: now - duration * current,
                duration,
            });
            return;
        }
        self.fade_in = Some(FadeSchedule {
            start: at,
            duration,
        });
    }

    /// Whether a fade-out is scheduled or running
    #[inline]
    pub fn is_fading_out(&self) -> bool {
        self.fade_out.is_some()
    }

    /// Host time at which the active fade-out reaches silence
    pub fn fade_out_completion(&self) -> Option<HostTime> {
        self.fade_out.map(|s| s.completion())
    }

    /// Drop both schedules, returning to unity gain
    pub fn clear(&mut self) {
        self.fade_in = None;
        self.fade_out = None;
    }

    /// Drop only the fade-out schedule
    pub fn clear_fade_out(&mut self) {
        self.fade_out = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_timeline_is_unity() {
        let timeline = FadeTimeline::new();
        assert_eq!(timeline.value(12.5), FadeValue::UNITY);
    }

    #[test]
    fn test_fade_out_boundaries() {
        let mut timeline = FadeTimeline::new();
        timeline.start_fade_out(0.0, 2.0, 0.0);

        assert_eq!(timeline.value(0.0).gain, 1.0);
        assert!((timeline.value(1.0).gain - 0.5).abs() < 1e-6);

        let end = timeline.value(2.0);
        assert_eq!(end.gain, 0.0);
        assert!(end.fade_out_completed);
    }

    #[test]
    fn test_fade_out_monotone_non_increasing() {
        let mut timeline = FadeTimeline::new();
        timeline.start_fade_out(0.0, 1.5, 0.0);

        let mut previous = f32::INFINITY;
        for step in 0..=30 {
            let gain = timeline.value(step as f64 * 0.05).gain;
            assert!(gain <= previous + 1e-6);
            previous = gain;
        }
    }

    #[test]
    fn test_fade_in_monotone_non_decreasing() {
        let mut timeline = FadeTimeline::new();
        timeline.start_fade_in(0.0, 1.0, 0.0, false);

        let mut previous = -1.0_f32;
        for step in 0..=20 {
            let gain = timeline.value(step as f64 * 0.05).gain;
            assert!(gain >= previous - 1e-6);
            previous = gain;
        }
        assert_eq!(timeline.value(1.0).gain, 1.0);
    }

    #[test]
    fn test_zero_duration_is_a_step() {
        let mut timeline = FadeTimeline::new();
        timeline.start_fade_out(0.0, 0.0, 1.0);

        assert_eq!(timeline.value(0.999).gain, 1.0);
        let after = timeline.value(1.0);
        assert_eq!(after.gain, 0.0);
        assert!(after.fade_out_completed);
    }

    #[test]
    fn test_slower_fade_out_request_is_ignored() {
        let mut timeline = FadeTimeline::new();
        timeline.start_fade_out(0.0, 2.0, 0.0);

        // A slower request mid-fade must not postpone completion.
        timeline.start_fade_out(0.5, 5.0, 0.0);
        assert_eq!(timeline.fade_out_completion(), Some(2.0));
        assert!(timeline.value(2.0).fade_out_completed);
    }

    #[test]
    fn test_faster_fade_out_request_wins() {
        let mut timeline = FadeTimeline::new();
        timeline.start_fade_out(0.0, 5.0, 0.0);

        timeline.start_fade_out(0.5, 0.5, 0.0);
        assert_eq!(timeline.fade_out_completion(), Some(1.0));
    }

    #[test]
    fn test_fade_in_cancels_fade_out_smoothly() {
        let mut timeline = FadeTimeline::new();
        timeline.start_fade_out(0.0, 2.0, 0.0);

        // Halfway down (gain 0.5), reverse into a 1-second fade-in.
        timeline.start_fade_in(1.0, 1.0, 1.0, true);
        assert!(!timeline.is_fading_out());
        assert!((timeline.value(1.0).gain - 0.5).abs() < 1e-6);

        // Continues rising and reaches unity after the remaining half.
        assert!((timeline.value(1.25).gain - 0.75).abs() < 1e-6);
        assert_eq!(timeline.value(1.5).gain, 1.0);
    }

    #[test]
    fn test_delayed_fade_in() {
        let mut timeline = FadeTimeline::new();
        timeline.start_fade_in(0.0, 1.0, 2.0, false);

        assert_eq!(timeline.value(0.5).gain, 0.0);
        assert!((timeline.value(2.5).gain - 0.5).abs() < 1e-6);
        assert_eq!(timeline.value(3.0).gain, 1.0);
    }
}
