//! Damped, eigen-regularised Newton iteration on `∇f = 0`.
//!
//! Unlike a minimiser, Newton on the gradient converges to minima, maxima and
//! saddles alike. Curvature directions whose eigenvalue is numerically zero are
//! dropped from the step instead of inverted, and a halving line search on
//! `‖∇f‖` keeps the iteration from being thrown out of its basin.

use log::debug;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use serde::{Deserialize, Serialize};

use crate::classify::{classify_unchecked, CriticalPointType};
use crate::domain::DomainBounds;
use crate::error::{CriticalPointError, Result};
use crate::oracle::{GradientOracle, Objective};
use crate::options::RefinementOptions;

/// Absolute floor below which an eigenvalue is never inverted.
const EIGEN_ABS_CUTOFF: f64 = 1e-12;
/// Relative cutoff, scaled by the largest eigenvalue magnitude.
const EIGEN_REL_CUTOFF: f64 = 1e-10;

/// Result of refining a single starting point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefinementOutcome {
    /// Final iterate.
    pub point: DVector<f64>,
    /// `‖∇f‖₂` at `point`; `+∞` when the gradient could not be evaluated.
    pub gradient_norm: f64,
    /// `f(point)`.
    pub objective_value: f64,
    /// Whether `gradient_norm` fell below the tolerance.
    pub converged: bool,
    /// Number of completed Newton steps.
    ///
    /// Only accepted line-search steps are counted. The iteration stops
    /// early, without spending the remaining budget, when the gradient is
    /// not finite or the Hessian offers no usable curvature direction, so a
    /// non-converged outcome can report fewer than `max_iterations` steps,
    /// including zero.
    pub iterations: u32,
    /// Curvature type at `point`.
    pub cp_type: CriticalPointType,
    /// Hessian eigenvalues at `point`, ascending.
    pub hessian_eigenvalues: Vec<f64>,
    /// `‖∇f‖₂` at the starting point.
    pub initial_gradient_norm: f64,
}

/// Refines `start` to a stationary point of `objective`.
///
/// When `bounds` are given every proposed iterate is clamped into the box.
/// Input contract violations are errors; failing to converge is not, it is
/// reported through [`RefinementOutcome::converged`].
pub fn refine_critical_point<O: Objective + ?Sized>(
    objective: &O,
    start: &DVector<f64>,
    bounds: Option<&DomainBounds>,
    options: &RefinementOptions,
) -> Result<RefinementOutcome> {
    options.validate()?;
    if start.is_empty() {
        return Err(CriticalPointError::empty("starting point"));
    }
    if let Some(bounds) = bounds {
        bounds.check_dimension("starting point", start)?;
    }
    options.method.ensure_supported(objective, start)?;
    Ok(newton_refine(objective, start.clone(), bounds, options))
}

/// Runs the iteration on already validated input.
pub(crate) fn newton_refine<O: Objective + ?Sized>(
    objective: &O,
    start: DVector<f64>,
    bounds: Option<&DomainBounds>,
    options: &RefinementOptions,
) -> RefinementOutcome {
    let method = &options.method;
    let mut x = start;
    let mut gradient = method.gradient(objective, &x);
    let mut gradient_norm = norm_or_inf(&gradient);
    let initial_gradient_norm = gradient_norm;
    let mut iterations = 0u32;

    while !(gradient_norm < options.tolerance) && iterations < options.max_iterations {
        if !gradient_norm.is_finite() {
            debug!("newton: gradient not finite after {iterations} steps, giving up");
            break;
        }

        let hessian = method.hessian(objective, &x);
        let Some(direction) = newton_direction(&hessian, &gradient) else {
            debug!("newton: no usable curvature direction after {iterations} steps");
            break;
        };

        let mut alpha = options.initial_damping;
        let (trial, trial_gradient, trial_norm) = loop {
            let mut trial = &x + &direction * alpha;
            if let Some(bounds) = bounds {
                bounds.clamp(&mut trial);
            }
            let trial_gradient = method.gradient(objective, &trial);
            let trial_norm = norm_or_inf(&trial_gradient);
            if trial_norm > gradient_norm && alpha > options.min_damping {
                alpha *= 0.5;
                continue;
            }
            break (trial, trial_gradient, trial_norm);
        };

        x = trial;
        gradient = trial_gradient;
        gradient_norm = trial_norm;
        iterations += 1;
    }

    let converged = gradient_norm < options.tolerance;
    let hessian_eigenvalues = symmetric_eigenvalues(&method.hessian(objective, &x));
    let cp_type = classify_unchecked(&hessian_eigenvalues, options.hessian_tolerance);
    let objective_value = objective.value(x.as_slice());

    if converged {
        debug!(
            "newton: converged in {iterations} steps to {cp_type} (|g| {initial_gradient_norm:.3e} -> {gradient_norm:.3e})"
        );
    } else {
        debug!(
            "newton: stopped after {iterations} steps without convergence (|g| = {gradient_norm:.3e})"
        );
    }

    RefinementOutcome {
        point: x,
        gradient_norm,
        objective_value,
        converged,
        iterations,
        cp_type,
        hessian_eigenvalues,
        initial_gradient_norm,
    }
}

/// Regularised Newton direction `-Σ (Vᵀg)ᵢ / λᵢ · vᵢ` over well-conditioned eigenpairs.
///
/// Returns `None` when the Hessian is not finite or every eigenvalue falls
/// below the cutoff.
fn newton_direction(hessian: &DMatrix<f64>, gradient: &DVector<f64>) -> Option<DVector<f64>> {
    let symmetric = (hessian + hessian.transpose()) * 0.5;
    if symmetric.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let eig = SymmetricEigen::new(symmetric);
    let max_abs = eig
        .eigenvalues
        .iter()
        .fold(0.0_f64, |acc, lambda| acc.max(lambda.abs()));
    let cutoff = EIGEN_ABS_CUTOFF.max(EIGEN_REL_CUTOFF * max_abs);
    let coefficients = eig.eigenvectors.tr_mul(gradient);

    let mut direction = DVector::<f64>::zeros(gradient.len());
    let mut kept = 0usize;
    for (i, &lambda) in eig.eigenvalues.iter().enumerate() {
        if lambda.abs() > cutoff {
            direction -= eig.eigenvectors.column(i) * (coefficients[i] / lambda);
            kept += 1;
        }
    }
    (kept > 0).then_some(direction)
}

/// Eigenvalues of the symmetric part of `hessian`, ascending. Non-finite input yields NaNs.
pub fn symmetric_eigenvalues(hessian: &DMatrix<f64>) -> Vec<f64> {
    let symmetric = (hessian + hessian.transpose()) * 0.5;
    if symmetric.iter().any(|v| !v.is_finite()) {
        return vec![f64::NAN; hessian.nrows()];
    }
    let mut values: Vec<f64> = SymmetricEigen::new(symmetric)
        .eigenvalues
        .iter()
        .copied()
        .collect();
    values.sort_by(f64::total_cmp);
    values
}

fn norm_or_inf(gradient: &DVector<f64>) -> f64 {
    let norm = gradient.norm();
    if norm.is_finite() {
        norm
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::autodiff::{lift, Scalar};
    use crate::oracle::{Differentiable, GenericObjective, GradientMethod};

    struct CubicValley;

    // f(x, y) = x³ - 3x + y², minimum at (1, 0), saddle at (-1, 0).
    impl GenericObjective for CubicValley {
        fn evaluate<T: Scalar>(&self, x: &[T]) -> T {
            x[0] * x[0] * x[0] - lift::<T>(3.0) * x[0] + x[1] * x[1]
        }
    }

    struct QuarticFlat;

    // f(x, y) = x⁴ + y², Hessian singular at the origin.
    impl GenericObjective for QuarticFlat {
        fn evaluate<T: Scalar>(&self, x: &[T]) -> T {
            x[0].powi(4) + x[1] * x[1]
        }
    }

    struct Plane;

    impl GenericObjective for Plane {
        fn evaluate<T: Scalar>(&self, x: &[T]) -> T {
            lift::<T>(2.0) * x[0] + T::one()
        }
    }

    #[test]
    fn saddle_of_hyperbolic_paraboloid() {
        let f = |x: &[f64]| x[0] * x[0] - x[1] * x[1];
        let start = DVector::from_vec(vec![0.3, 0.4]);
        let outcome =
            refine_critical_point(&f, &start, None, &RefinementOptions::default()).unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.cp_type, CriticalPointType::Saddle);
        assert_relative_eq!(outcome.point, DVector::zeros(2), epsilon = 1e-8);
        assert_relative_eq!(outcome.initial_gradient_norm, 1.0, epsilon = 1e-6);
        assert_relative_eq!(outcome.hessian_eigenvalues[0], -2.0, epsilon = 1e-4);
        assert_relative_eq!(outcome.hessian_eigenvalues[1], 2.0, epsilon = 1e-4);
    }

    #[test]
    fn exact_mode_finds_minimum_and_saddle() {
        let f = Differentiable(CubicValley);
        let options = RefinementOptions::default().with_method(GradientMethod::Exact);

        let minimum =
            refine_critical_point(&f, &DVector::from_vec(vec![0.8, 0.3]), None, &options)
                .unwrap();
        assert!(minimum.converged);
        assert_eq!(minimum.cp_type, CriticalPointType::Minimum);
        assert_relative_eq!(minimum.point, DVector::from_vec(vec![1.0, 0.0]), epsilon = 1e-9);
        assert_relative_eq!(minimum.objective_value, -2.0, epsilon = 1e-12);

        let saddle =
            refine_critical_point(&f, &DVector::from_vec(vec![-1.3, -0.2]), None, &options)
                .unwrap();
        assert!(saddle.converged);
        assert_eq!(saddle.cp_type, CriticalPointType::Saddle);
        assert_relative_eq!(saddle.point, DVector::from_vec(vec![-1.0, 0.0]), epsilon = 1e-9);
    }

    #[test]
    fn converged_start_takes_no_steps() {
        let f = |x: &[f64]| -(x[0] * x[0]) - 2.0 * x[1] * x[1];
        let start = DVector::zeros(2);
        let outcome =
            refine_critical_point(&f, &start, None, &RefinementOptions::default()).unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.cp_type, CriticalPointType::Maximum);
        assert_eq!(outcome.point, start);
    }

    #[test]
    fn flat_direction_is_reported_degenerate() {
        let f = Differentiable(QuarticFlat);
        let options = RefinementOptions::default()
            .with_method(GradientMethod::Exact)
            .with_hessian_tolerance(1e-3);
        let outcome =
            refine_critical_point(&f, &DVector::from_vec(vec![0.5, 0.5]), None, &options)
                .unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.cp_type, CriticalPointType::Degenerate);
        assert!(outcome.iterations > 1);
    }

    #[test]
    fn iterates_stay_inside_bounds() {
        let f = |x: &[f64]| (x[0] - 5.0).powi(2);
        let bounds = DomainBounds::cube(1, -1.0, 1.0).unwrap();
        let options = RefinementOptions::default().with_max_iterations(5);
        let outcome = refine_critical_point(
            &f,
            &DVector::from_vec(vec![0.0]),
            Some(&bounds),
            &options,
        )
        .unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 5);
        assert!(bounds.contains(&outcome.point));
        assert_relative_eq!(outcome.point[0], 1.0);
    }

    #[test]
    fn non_finite_region_ends_without_convergence() {
        let f = |x: &[f64]| {
            if x[0] > 0.5 {
                f64::NAN
            } else {
                (x[0] - 1.0).powi(2)
            }
        };
        let options = RefinementOptions::default().with_max_iterations(20);
        let outcome =
            refine_critical_point(&f, &DVector::from_vec(vec![0.0]), None, &options).unwrap();
        assert!(!outcome.converged);
        assert!(outcome.iterations <= 20);
    }

    #[test]
    fn non_finite_start_counts_no_steps() {
        let f = |x: &[f64]| if x[0] > 0.5 { f64::NAN } else { x[0] * x[0] };
        let options = RefinementOptions::default().with_max_iterations(50);
        let outcome =
            refine_critical_point(&f, &DVector::from_vec(vec![2.0]), None, &options).unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.gradient_norm, f64::INFINITY);
        assert_eq!(outcome.point, DVector::from_vec(vec![2.0]));
    }

    #[test]
    fn zero_hessian_stops_immediately() {
        let f = Differentiable(Plane);
        let options = RefinementOptions::default().with_method(GradientMethod::Exact);
        let outcome =
            refine_critical_point(&f, &DVector::from_vec(vec![0.25]), None, &options).unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.cp_type, CriticalPointType::Degenerate);
    }

    #[test]
    fn rejects_dimension_mismatch_with_bounds() {
        let f = |x: &[f64]| x[0] * x[0];
        let bounds = DomainBounds::cube(2, -1.0, 1.0).unwrap();
        let result = refine_critical_point(
            &f,
            &DVector::from_vec(vec![0.1]),
            Some(&bounds),
            &RefinementOptions::default(),
        );
        assert!(matches!(
            result,
            Err(CriticalPointError::DimensionMismatch { expected: 2, found: 1, .. })
        ));
    }
}
