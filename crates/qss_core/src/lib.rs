//! The `qss_core` crate integrates stiff production/loss ODE systems —
//! chiefly chemical-kinetics rate equations — with the quasi-steady-state
//! (QSS) predictor-corrector method. Each step analytically solves the
//! linearized equation `dy/dt = q - d*y` with the rates held fixed, which
//! keeps the scheme stable and non-negative for widely separated time
//! scales without any implicit linear-algebra solves.
//!
//! Key components:
//! - **Traits**: `Scalar` (numeric type abstraction), `RateFunction` (the
//!   caller-supplied production/loss rate model).
//! - **Step engine**: `QssStep`, the predictor-corrector kernel.
//! - **Controller**: `QssSettings` and `StepSizeControl`, accept/reject
//!   judgment and adaptive step sizing.
//! - **Integrator**: `QssIntegrator`, the orchestrating owner of the
//!   mutable state.
pub mod controller;
pub mod error;
pub mod integrator;
pub mod step;
pub mod traits;
