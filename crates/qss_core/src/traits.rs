use crate::error::RateError;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in the integration kernel.
/// Must support floating-point arithmetic, debug printing, and conversion
/// from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A production/loss rate model, the chemistry side of the integration.
///
/// The model decomposes each species' net rate of change as
/// `dy_i/dt = q_i - d_i * y_i`, where `q_i` is the creation rate and `d_i`
/// the specific destruction rate. This pseudo-first-order decomposition is
/// what the quasi-steady-state update solves analytically, so both outputs
/// must be componentwise non-negative and finite.
///
/// Implementations must be pure with respect to `(t, y, corrector)`: the
/// engine evaluates the model once per predictor and once per corrector
/// pass, and no hidden state may leak between calls.
pub trait RateFunction<T: Scalar> {
    /// Returns the number of species.
    fn dimension(&self) -> usize;

    /// Evaluates the rate decomposition at `(t, y)`.
    ///
    /// `corrector` is true on corrector-phase evaluations; models that vary
    /// auxiliary quantities (e.g. partial equilibria) by phase can branch on
    /// it. `q` and `d` are output buffers of length `dimension()`.
    ///
    /// Returns a [`RateError`] if the model cannot produce a valid pair,
    /// which aborts the step in progress.
    fn rates(&self, t: T, y: &[T], corrector: bool, q: &mut [T], d: &mut [T])
        -> Result<(), RateError>;
}

/// Adapter letting a plain closure serve as a [`RateFunction`].
///
/// The closure receives `(t, y, corrector, q, d)` and fills the output
/// buffers in place.
pub struct ClosureRates<F> {
    dimension: usize,
    f: F,
}

impl<F> ClosureRates<F> {
    pub fn new(dimension: usize, f: F) -> Self {
        Self { dimension, f }
    }
}

impl<T, F> RateFunction<T> for ClosureRates<F>
where
    T: Scalar,
    F: Fn(T, &[T], bool, &mut [T], &mut [T]) -> Result<(), RateError>,
{
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn rates(
        &self,
        t: T,
        y: &[T],
        corrector: bool,
        q: &mut [T],
        d: &mut [T],
    ) -> Result<(), RateError> {
        (self.f)(t, y, corrector, q, d)
    }
}

#[cfg(test)]
mod tests {
    use super::{ClosureRates, RateFunction};
    use crate::error::RateError;

    #[test]
    fn closure_adapter_fills_buffers() {
        let model = ClosureRates::new(2, |_t: f64, y: &[f64], _c: bool, q: &mut [f64], d: &mut [f64]| {
            q[0] = 1.0;
            q[1] = 2.0 * y[0];
            d[0] = 0.5;
            d[1] = 0.0;
            Ok(())
        });

        assert_eq!(model.dimension(), 2);

        let mut q = [0.0; 2];
        let mut d = [0.0; 2];
        model.rates(0.0, &[3.0, 1.0], false, &mut q, &mut d).unwrap();
        assert_eq!(q, [1.0, 6.0]);
        assert_eq!(d, [0.5, 0.0]);
    }

    #[test]
    fn closure_adapter_propagates_failure() {
        let model =
            ClosureRates::new(1, |_t: f64, _y: &[f64], _c: bool, _q: &mut [f64], _d: &mut [f64]| {
                Err(RateError::new("domain violation"))
            });

        let mut q = [0.0];
        let mut d = [0.0];
        let err = model.rates(0.0, &[1.0], true, &mut q, &mut d).unwrap_err();
        assert!(format!("{err}").contains("domain violation"));
    }
}
