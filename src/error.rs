use thiserror::Error;

/// Unified error type for `critpoints` operations.
///
/// Only input contract violations are errors. Numerical non-convergence of a
/// single refinement is reported through
/// [`RefinementOutcome::converged`](crate::refine::RefinementOutcome::converged).
#[derive(Debug, Error)]
pub enum CriticalPointError {
    /// Raised when points, bounds, or collections have incompatible dimensions.
    #[error("dimension mismatch in {context}: expected {expected} but found {found}")]
    DimensionMismatch {
        /// Human-readable context describing the operation.
        context: &'static str,
        /// The required dimension, usually implied by the domain.
        expected: usize,
        /// The dimension that was actually supplied.
        found: usize,
    },

    /// Raised when a required collection is empty.
    #[error("{context} must not be empty")]
    EmptyInput { context: &'static str },

    /// Raised when a domain interval is non-finite or has no positive extent.
    #[error(
        "bounds for dimension {dimension} must be finite with lower < upper, found [{lower}, {upper}]"
    )]
    InvalidBounds {
        dimension: usize,
        lower: f64,
        upper: f64,
    },

    /// Raised when a configuration scalar is outside its admissible range.
    #[error("invalid option `{name}`: {requirement}, found {value}")]
    InvalidOption {
        /// Name of the offending option.
        name: &'static str,
        /// The value that was supplied.
        value: f64,
        /// Description of the admissible range.
        requirement: &'static str,
    },

    /// Raised when no candidate of a batch refined to a critical point.
    #[error("none of the {candidates} candidate points converged to a critical point")]
    NoConvergedCandidates { candidates: usize },

    /// Raised when exact derivatives are requested for an opaque objective.
    #[error("exact differentiation requested but the objective cannot be evaluated over hyper-dual numbers")]
    ExactDerivativesUnavailable,

    /// Raised when capture results in a convergence study disagree on their tolerances.
    #[error("capture result for fidelity level {level} uses a different tolerance list")]
    ToleranceMismatch { level: u32 },

    /// Raised when the verdict reference fraction was not analysed.
    #[error("reference tolerance fraction {fraction} is not among the analysed fractions")]
    UnknownReferenceFraction { fraction: f64 },
}

impl CriticalPointError {
    /// Helper to format a [`DimensionMismatch`](CriticalPointError::DimensionMismatch) error.
    pub fn dimension_mismatch(context: &'static str, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            context,
            expected,
            found,
        }
    }

    /// Helper for empty required collections.
    pub fn empty(context: &'static str) -> Self {
        Self::EmptyInput { context }
    }

    /// Helper for out-of-range configuration values.
    pub fn invalid_option(name: &'static str, value: f64, requirement: &'static str) -> Self {
        Self::InvalidOption {
            name,
            value,
            requirement,
        }
    }
}

/// Type alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, CriticalPointError>;
