//! Configuration for Newton refinement and reference-set construction.

use serde::{Deserialize, Serialize};

use crate::error::{CriticalPointError, Result};
use crate::oracle::GradientMethod;

/// Controls the damped Newton iteration on `∇f = 0`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefinementOptions {
    /// Convergence tolerance on `‖∇f‖₂`.
    pub tolerance: f64,
    /// Maximum number of Newton steps.
    pub max_iterations: u32,
    /// Step length tried first in the damped line search, in `(0, 1]`.
    pub initial_damping: f64,
    /// Step length at which a non-improving step is accepted anyway, in `(0, initial_damping]`.
    pub min_damping: f64,
    /// Eigenvalues with `|λ|` at or below this are treated as zero when classifying.
    pub hessian_tolerance: f64,
    /// Derivative strategy.
    pub method: GradientMethod,
}

impl Default for RefinementOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 100,
            initial_damping: 1.0,
            min_damping: 1e-3,
            hessian_tolerance: 1e-6,
            method: GradientMethod::default(),
        }
    }
}

impl RefinementOptions {
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the initial and minimum damping factors together.
    pub fn with_damping(mut self, initial: f64, minimum: f64) -> Self {
        self.initial_damping = initial;
        self.min_damping = minimum;
        self
    }

    pub fn with_hessian_tolerance(mut self, tolerance: f64) -> Self {
        self.hessian_tolerance = tolerance;
        self
    }

    pub fn with_method(mut self, method: GradientMethod) -> Self {
        self.method = method;
        self
    }

    /// Rejects out-of-range settings before any objective evaluation.
    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(CriticalPointError::invalid_option(
                "tolerance",
                self.tolerance,
                "must be finite and > 0",
            ));
        }
        if self.max_iterations == 0 {
            return Err(CriticalPointError::invalid_option(
                "max_iterations",
                0.0,
                "must be at least 1",
            ));
        }
        if !(self.initial_damping > 0.0 && self.initial_damping <= 1.0) {
            return Err(CriticalPointError::invalid_option(
                "initial_damping",
                self.initial_damping,
                "must lie in (0, 1]",
            ));
        }
        if !(self.min_damping > 0.0 && self.min_damping <= self.initial_damping) {
            return Err(CriticalPointError::invalid_option(
                "min_damping",
                self.min_damping,
                "must lie in (0, initial_damping]",
            ));
        }
        if !self.hessian_tolerance.is_finite() || self.hessian_tolerance <= 0.0 {
            return Err(CriticalPointError::invalid_option(
                "hessian_tolerance",
                self.hessian_tolerance,
                "must be finite and > 0",
            ));
        }
        self.method.validate()
    }
}

/// Aggregated configuration for [`ReferenceSetBuilder`](crate::reference::ReferenceSetBuilder).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceOptions {
    /// Settings applied to every candidate refinement.
    pub refinement: RefinementOptions,
    /// Fraction of the domain diameter below which two refined points coincide.
    pub dedup_fraction: f64,
    /// Refine candidates on the rayon thread pool.
    pub parallel: bool,
}

impl Default for ReferenceOptions {
    fn default() -> Self {
        Self {
            refinement: RefinementOptions::default(),
            dedup_fraction: 0.01,
            parallel: true,
        }
    }
}

impl ReferenceOptions {
    /// Override the refinement settings while preserving other defaults.
    pub fn with_refinement(mut self, refinement: RefinementOptions) -> Self {
        self.refinement = refinement;
        self
    }

    /// Set the deduplication radius as a fraction of the domain diameter.
    pub fn with_dedup_fraction(mut self, fraction: f64) -> Self {
        self.dedup_fraction = fraction;
        self
    }

    /// Enable or disable parallel refinement.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.dedup_fraction > 0.0 && self.dedup_fraction < 1.0) {
            return Err(CriticalPointError::invalid_option(
                "dedup_fraction",
                self.dedup_fraction,
                "must lie in (0, 1)",
            ));
        }
        self.refinement.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RefinementOptions::default().validate().is_ok());
        assert!(ReferenceOptions::default().validate().is_ok());
    }

    #[test]
    fn min_damping_cannot_exceed_initial() {
        let options = RefinementOptions::default().with_damping(0.5, 0.75);
        assert!(matches!(
            options.validate(),
            Err(CriticalPointError::InvalidOption {
                name: "min_damping",
                ..
            })
        ));
    }

    #[test]
    fn dedup_fraction_must_be_proper() {
        for fraction in [0.0, 1.0, -0.1, f64::NAN] {
            let options = ReferenceOptions::default().with_dedup_fraction(fraction);
            assert!(options.validate().is_err(), "accepted {fraction}");
        }
    }
}
