use crate::error::QssError;
use serde::{Deserialize, Serialize};

/// Safety factor applied to the tolerance-derived step scaling, so a step
/// accepted right at tolerance is not immediately grown into a rejection.
const SAFETY: f64 = 0.9;

/// A rejected step always shrinks by at least this factor.
const REJECT_CEILING: f64 = 0.9;

/// Per-integration configuration. Immutable once handed to the integrator,
/// so concurrent independent integrations stay reproducible.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QssSettings {
    /// Relative error tolerance judged against the step error estimate.
    pub relative_tolerance: f64,
    /// Smallest step size the controller may attempt.
    pub min_step: f64,
    /// Largest step size the controller may attempt.
    pub max_step: f64,
    /// First attempted step size; 0.0 selects the geometric mean of the
    /// step bounds.
    pub initial_step: f64,
    /// Cap on how much an accepted step may grow the step size.
    pub max_growth_factor: f64,
    /// Floor on how much a rejected step may shrink the step size,
    /// in (0, 1).
    pub max_shrink_factor: f64,
    /// Consecutive rejections tolerated before an advance fails.
    pub max_rejected_steps: usize,
    /// Corrector passes per step.
    pub corrector_iterations: usize,
    /// Weight on the corrector-phase rates when blending with the predictor
    /// rates; 0.5 is the arithmetic mean.
    pub corrector_weight: f64,
    /// Ceiling on accepted steps per `integrate_to` call.
    pub max_steps: usize,
}

impl Default for QssSettings {
    fn default() -> Self {
        Self {
            relative_tolerance: 1e-3,
            min_step: 1e-15,
            max_step: 1e2,
            initial_step: 0.0,
            max_growth_factor: 2.0,
            max_shrink_factor: 0.1,
            max_rejected_steps: 10,
            corrector_iterations: 1,
            corrector_weight: 0.5,
            max_steps: 1_000_000,
        }
    }
}

impl QssSettings {
    pub fn validate(&self) -> Result<(), QssError> {
        if !self.relative_tolerance.is_finite() || self.relative_tolerance <= 0.0 {
            return Err(QssError::Configuration(
                "relative_tolerance must be finite and positive".into(),
            ));
        }
        if !self.min_step.is_finite() || self.min_step <= 0.0 {
            return Err(QssError::Configuration(
                "min_step must be finite and positive".into(),
            ));
        }
        if !self.max_step.is_finite() || self.max_step < self.min_step {
            return Err(QssError::Configuration(
                "max_step must be finite and at least min_step".into(),
            ));
        }
        if self.initial_step != 0.0 && (!self.initial_step.is_finite() || self.initial_step < 0.0)
        {
            return Err(QssError::Configuration(
                "initial_step must be zero (automatic) or positive".into(),
            ));
        }
        if !self.max_growth_factor.is_finite() || self.max_growth_factor <= 1.0 {
            return Err(QssError::Configuration(
                "max_growth_factor must exceed 1".into(),
            ));
        }
        if !(self.max_shrink_factor > 0.0 && self.max_shrink_factor < 1.0) {
            return Err(QssError::Configuration(
                "max_shrink_factor must lie in (0, 1)".into(),
            ));
        }
        if self.max_rejected_steps == 0 {
            return Err(QssError::Configuration(
                "max_rejected_steps must be at least 1".into(),
            ));
        }
        if self.corrector_iterations == 0 {
            return Err(QssError::Configuration(
                "corrector_iterations must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.corrector_weight) {
            return Err(QssError::Configuration(
                "corrector_weight must lie in [0, 1]".into(),
            ));
        }
        if self.max_steps == 0 {
            return Err(QssError::Configuration("max_steps must be at least 1".into()));
        }
        Ok(())
    }

    /// Step size to attempt first after `set_state`.
    pub(crate) fn first_step(&self) -> f64 {
        let h = if self.initial_step > 0.0 {
            self.initial_step
        } else {
            (self.min_step * self.max_step).sqrt()
        };
        h.clamp(self.min_step, self.max_step)
    }
}

/// Outcome of judging one proposed step, carrying the step size to attempt
/// next. The caller commits state on `Accept` and retries on `Reject`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepVerdict {
    Accept { next_step: f64 },
    Reject { next_step: f64 },
}

/// Accept/reject decision plus step-size adaptation.
///
/// A step passes when its error estimate is within the relative tolerance.
/// The next step size scales with the square root of the tolerance margin:
/// far under tolerance grows the step (capped by the growth factor and
/// `max_step`), over tolerance shrinks it (floored by the shrink factor and
/// `min_step`).
#[derive(Debug, Clone, Copy)]
pub struct StepSizeControl {
    tolerance: f64,
    min_step: f64,
    max_step: f64,
    max_growth: f64,
    max_shrink: f64,
}

impl StepSizeControl {
    pub fn new(settings: &QssSettings) -> Self {
        Self {
            tolerance: settings.relative_tolerance,
            min_step: settings.min_step,
            max_step: settings.max_step,
            max_growth: settings.max_growth_factor,
            max_shrink: settings.max_shrink_factor,
        }
    }

    pub fn judge(&self, step_size: f64, error_estimate: f64) -> StepVerdict {
        let scale = if error_estimate > 0.0 {
            SAFETY * (self.tolerance / error_estimate).sqrt()
        } else {
            self.max_growth
        };

        if error_estimate <= self.tolerance {
            let factor = scale.clamp(1.0, self.max_growth);
            StepVerdict::Accept {
                next_step: (step_size * factor).min(self.max_step),
            }
        } else {
            let factor = scale.clamp(self.max_shrink, REJECT_CEILING);
            StepVerdict::Reject {
                next_step: (step_size * factor).max(self.min_step),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{QssSettings, StepSizeControl, StepVerdict};
    use crate::error::QssError;

    fn assert_config_err(result: Result<(), QssError>, needle: &str) {
        let err = result.expect_err("expected configuration error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    fn control() -> StepSizeControl {
        StepSizeControl::new(&QssSettings {
            relative_tolerance: 1e-3,
            min_step: 1e-10,
            max_step: 10.0,
            max_growth_factor: 2.0,
            max_shrink_factor: 0.1,
            ..QssSettings::default()
        })
    }

    #[test]
    fn default_settings_are_valid() {
        QssSettings::default().validate().unwrap();
    }

    #[test]
    fn validation_rejects_each_bad_field() {
        let ok = QssSettings::default();

        assert_config_err(
            QssSettings { relative_tolerance: 0.0, ..ok }.validate(),
            "relative_tolerance",
        );
        assert_config_err(QssSettings { min_step: -1.0, ..ok }.validate(), "min_step");
        assert_config_err(
            QssSettings { min_step: 1.0, max_step: 0.5, ..ok }.validate(),
            "max_step",
        );
        assert_config_err(
            QssSettings { initial_step: f64::NAN, ..ok }.validate(),
            "initial_step",
        );
        assert_config_err(
            QssSettings { max_growth_factor: 1.0, ..ok }.validate(),
            "max_growth_factor",
        );
        assert_config_err(
            QssSettings { max_shrink_factor: 1.0, ..ok }.validate(),
            "max_shrink_factor",
        );
        assert_config_err(
            QssSettings { max_rejected_steps: 0, ..ok }.validate(),
            "max_rejected_steps",
        );
        assert_config_err(
            QssSettings { corrector_iterations: 0, ..ok }.validate(),
            "corrector_iterations",
        );
        assert_config_err(
            QssSettings { corrector_weight: 1.5, ..ok }.validate(),
            "corrector_weight",
        );
        assert_config_err(QssSettings { max_steps: 0, ..ok }.validate(), "max_steps");
    }

    #[test]
    fn first_step_defaults_to_geometric_mean_of_bounds() {
        let settings = QssSettings {
            min_step: 1e-8,
            max_step: 1e2,
            initial_step: 0.0,
            ..QssSettings::default()
        };
        let h = settings.first_step();
        assert!((h - 1e-3).abs() < 1e-15, "got {h}");

        let clamped = QssSettings {
            initial_step: 50.0,
            max_step: 2.0,
            ..QssSettings::default()
        };
        assert_eq!(clamped.first_step(), 2.0);
    }

    #[test]
    fn accepts_exactly_at_tolerance() {
        match control().judge(0.5, 1e-3) {
            StepVerdict::Accept { next_step } => assert!(next_step >= 0.5),
            other => panic!("expected Accept, got {other:?}"),
        }
    }

    #[test]
    fn growth_is_bounded_by_the_growth_factor() {
        // Error far under tolerance asks for a huge growth; the factor cap
        // holds it at 2x.
        match control().judge(1.0, 1e-12) {
            StepVerdict::Accept { next_step } => assert_eq!(next_step, 2.0),
            other => panic!("expected Accept, got {other:?}"),
        }

        // A zero error estimate takes the same capped path.
        match control().judge(1.0, 0.0) {
            StepVerdict::Accept { next_step } => assert_eq!(next_step, 2.0),
            other => panic!("expected Accept, got {other:?}"),
        }
    }

    #[test]
    fn growth_never_exceeds_max_step() {
        match control().judge(8.0, 0.0) {
            StepVerdict::Accept { next_step } => assert_eq!(next_step, 10.0),
            other => panic!("expected Accept, got {other:?}"),
        }
    }

    #[test]
    fn marginal_accept_does_not_shrink_the_step() {
        match control().judge(0.5, 0.99e-3) {
            StepVerdict::Accept { next_step } => assert_eq!(next_step, 0.5),
            other => panic!("expected Accept, got {other:?}"),
        }
    }

    #[test]
    fn rejection_shrinks_strictly() {
        match control().judge(1.0, 2e-3) {
            StepVerdict::Reject { next_step } => {
                assert!(next_step < 1.0, "got {next_step}");
                assert!(next_step >= 0.1, "shrink floor violated: {next_step}");
            }
            other => panic!("expected Reject, got {other:?}"),
        }
    }

    #[test]
    fn shrink_is_bounded_by_the_shrink_factor() {
        // Error vastly over tolerance asks for a tiny step; the shrink
        // floor holds it at 0.1x.
        match control().judge(1.0, 1e9) {
            StepVerdict::Reject { next_step } => assert_eq!(next_step, 0.1),
            other => panic!("expected Reject, got {other:?}"),
        }
    }

    #[test]
    fn rejection_never_goes_below_min_step() {
        match control().judge(1e-10, 1e9) {
            StepVerdict::Reject { next_step } => assert_eq!(next_step, 1e-10),
            other => panic!("expected Reject, got {other:?}"),
        }
    }
}
