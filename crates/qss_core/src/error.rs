use thiserror::Error;

/// Failure raised by a rate model that cannot produce a valid `(q, d)` pair,
/// e.g. a domain violation in the underlying chemistry.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct RateError(String);

impl RateError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Everything that can abort a step or an integration.
///
/// Rejected steps are ordinary control flow inside the controller and never
/// surface here; only exhausted retry budgets do.
#[derive(Debug, Error)]
pub enum QssError {
    /// Invalid settings or initial state. Detected eagerly at construction
    /// and `set_state`, never silently corrected.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The rate model failed mid-step. Not retried by the engine.
    #[error("rate evaluation failed at t = {t}")]
    RateEvaluation {
        t: f64,
        #[source]
        source: RateError,
    },

    /// The step size could not be reduced far enough to meet tolerance
    /// within the rejection budget.
    #[error(
        "step control exhausted at t = {t}: error estimate {error_estimate:.3e} \
         still above tolerance after {rejections} rejected steps \
         (last step size {step_size:.3e})"
    )]
    Exhausted {
        t: f64,
        step_size: f64,
        error_estimate: f64,
        rejections: usize,
    },

    /// A predictor or corrector evaluation produced NaN or infinity.
    #[error("non-finite value for species {species} at t = {t}")]
    NonFinite { t: f64, species: usize },

    /// The accepted-step ceiling was hit before reaching the target time.
    #[error("step budget of {max_steps} exhausted at t = {t} before reaching t = {t_end}")]
    StepLimit {
        t: f64,
        t_end: f64,
        max_steps: usize,
    },
}
