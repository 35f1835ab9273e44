use crate::controller::{QssSettings, StepSizeControl, StepVerdict};
use crate::error::QssError;
use crate::step::QssStep;
use crate::traits::RateFunction;
use std::mem;

/// Drives a rate model across a time span with the quasi-steady-state
/// predictor-corrector scheme.
///
/// The integrator is the single owner of the mutable state `(t, y, h)`;
/// the step engine and the controller operate on snapshots and state is
/// committed only at the Accept transition. One integrator serves one
/// integration at a time; independent integrations are independent values
/// and may run on separate threads.
pub struct QssIntegrator<R: RateFunction<f64>> {
    rates: R,
    settings: QssSettings,
    engine: QssStep<f64>,
    control: StepSizeControl,
    t: f64,
    y: Vec<f64>,
    y_next: Vec<f64>,
    h: f64,
    initialized: bool,
}

impl<R: RateFunction<f64>> QssIntegrator<R> {
    /// Validates the settings and sizes the work buffers for the model's
    /// species count. The state is unset until [`set_state`] is called.
    ///
    /// [`set_state`]: QssIntegrator::set_state
    pub fn new(rates: R, settings: QssSettings) -> Result<Self, QssError> {
        settings.validate()?;
        let dim = rates.dimension();
        if dim == 0 {
            return Err(QssError::Configuration(
                "rate function reports zero species".into(),
            ));
        }
        Ok(Self {
            engine: QssStep::new(dim, settings.corrector_iterations, settings.corrector_weight),
            control: StepSizeControl::new(&settings),
            rates,
            settings,
            t: 0.0,
            y: vec![0.0; dim],
            y_next: vec![0.0; dim],
            h: 0.0,
            initialized: false,
        })
    }

    /// Installs an initial condition `(y0, t0)`, resetting the step size.
    /// Also serves as the reset between integrations.
    pub fn set_state(&mut self, y0: &[f64], t0: f64) -> Result<(), QssError> {
        if y0.len() != self.y.len() {
            return Err(QssError::Configuration(format!(
                "initial state has {} species, expected {}",
                y0.len(),
                self.y.len()
            )));
        }
        if !t0.is_finite() {
            return Err(QssError::Configuration("initial time must be finite".into()));
        }
        for (i, &v) in y0.iter().enumerate() {
            if !v.is_finite() {
                return Err(QssError::Configuration(format!(
                    "initial value for species {i} is not finite"
                )));
            }
            if v < 0.0 {
                return Err(QssError::Configuration(format!(
                    "initial value for species {i} is negative"
                )));
            }
        }
        self.y.copy_from_slice(y0);
        self.t = t0;
        self.h = self.settings.first_step();
        self.initialized = true;
        Ok(())
    }

    /// Current time.
    pub fn time(&self) -> f64 {
        self.t
    }

    /// Read-only view of the current species vector.
    pub fn state(&self) -> &[f64] {
        &self.y
    }

    /// Step size the controller will attempt next.
    pub fn step_size(&self) -> f64 {
        self.h
    }

    pub fn settings(&self) -> &QssSettings {
        &self.settings
    }

    /// The rate model driving this integration.
    pub fn rates(&self) -> &R {
        &self.rates
    }

    /// Advances by one accepted step and returns the new `(t, y)`.
    ///
    /// Rejected attempts are retried internally at smaller step sizes; the
    /// state is untouched unless the step is accepted.
    pub fn step(&mut self) -> Result<(f64, &[f64]), QssError> {
        self.require_state()?;
        self.advance(f64::INFINITY)?;
        Ok((self.t, self.y.as_slice()))
    }

    /// Integrates until `t` reaches `t_end` exactly, clamping the final
    /// step so it lands on `t_end` rather than overshooting.
    pub fn integrate_to(&mut self, t_end: f64) -> Result<(f64, &[f64]), QssError> {
        self.require_state()?;
        if !t_end.is_finite() {
            return Err(QssError::Configuration("t_end must be finite".into()));
        }
        if t_end < self.t {
            return Err(QssError::Configuration(format!(
                "t_end = {t_end} lies before the current time {}",
                self.t
            )));
        }

        let mut accepted = 0usize;
        while self.t < t_end {
            if accepted >= self.settings.max_steps {
                return Err(QssError::StepLimit {
                    t: self.t,
                    t_end,
                    max_steps: self.settings.max_steps,
                });
            }
            self.advance(t_end)?;
            accepted += 1;
        }
        Ok((self.t, self.y.as_slice()))
    }

    fn require_state(&self) -> Result<(), QssError> {
        if self.initialized {
            Ok(())
        } else {
            Err(QssError::Configuration(
                "no initial state; call set_state first".into(),
            ))
        }
    }

    /// One Propose -> Accept/Reject cycle under the rejection budget.
    ///
    /// Commits `(t, y)` only on Accept. A step that would cross `t_limit`
    /// is clamped, and its commit sets `t = t_limit` exactly.
    fn advance(&mut self, t_limit: f64) -> Result<(), QssError> {
        let mut h = self.h.clamp(self.settings.min_step, self.settings.max_step);
        let mut rejections = 0usize;

        loop {
            let lands = t_limit.is_finite() && self.t + h >= t_limit;
            let attempt = if lands { t_limit - self.t } else { h };

            let error_estimate =
                self.engine
                    .propose(&self.rates, self.t, &self.y, attempt, &mut self.y_next)?;

            match self.control.judge(attempt, error_estimate) {
                StepVerdict::Accept { next_step } => {
                    mem::swap(&mut self.y, &mut self.y_next);
                    self.t = if lands { t_limit } else { self.t + attempt };
                    self.h = next_step;
                    return Ok(());
                }
                StepVerdict::Reject { next_step } => {
                    rejections += 1;
                    if rejections >= self.settings.max_rejected_steps {
                        return Err(QssError::Exhausted {
                            t: self.t,
                            step_size: attempt,
                            error_estimate,
                            rejections,
                        });
                    }
                    // A step already at the floor cannot shrink further.
                    if !lands && attempt <= self.settings.min_step {
                        return Err(QssError::Exhausted {
                            t: self.t,
                            step_size: attempt,
                            error_estimate,
                            rejections,
                        });
                    }
                    h = next_step;
                }
            }
        }
    }
}
