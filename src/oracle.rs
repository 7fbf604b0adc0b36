//! Objective functions and the derivative oracle used by the Newton refiner.
//!
//! Two interchangeable strategies are offered through [`GradientMethod`]:
//!
//! - [`GradientMethod::Exact`] evaluates the objective over [`HyperDual`]
//!   numbers. Only objectives written generically over [`Scalar`] (see
//!   [`GenericObjective`] and [`Differentiable`]) support it.
//! - [`GradientMethod::Numerical`] uses central finite differences and works
//!   with any black-box objective, including plain closures.
//!
//! Neither strategy raises on non-finite objective values: the affected
//! derivative entries become `+∞` so the caller can treat the step as failed.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::autodiff::{HyperDual, Scalar};
use crate::error::{CriticalPointError, Result};

/// A scalar objective `f: ℝⁿ → ℝ`.
pub trait Objective: Sync {
    /// Evaluates the objective at `x`.
    fn value(&self, x: &[f64]) -> f64;

    /// Evaluates the objective over hyper-dual numbers, or `None` when the
    /// objective is opaque to automatic differentiation.
    fn value_hyper(&self, _x: &[HyperDual]) -> Option<HyperDual> {
        None
    }
}

impl<F> Objective for F
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    fn value(&self, x: &[f64]) -> f64 {
        self(x)
    }
}

/// An objective written once for every [`Scalar`] type.
pub trait GenericObjective: Sync {
    fn evaluate<T: Scalar>(&self, x: &[T]) -> T;
}

/// Adapts a [`GenericObjective`] so it supports exact differentiation.
#[derive(Clone, Copy, Debug)]
pub struct Differentiable<G>(pub G);

impl<G: GenericObjective> Objective for Differentiable<G> {
    fn value(&self, x: &[f64]) -> f64 {
        self.0.evaluate(x)
    }

    fn value_hyper(&self, x: &[HyperDual]) -> Option<HyperDual> {
        Some(self.0.evaluate(x))
    }
}

/// Supplies first and second derivatives of an objective.
pub trait GradientOracle {
    /// `∇f(x)`.
    fn gradient<O: Objective + ?Sized>(&self, objective: &O, x: &DVector<f64>) -> DVector<f64>;

    /// `∇²f(x)`, symmetric by construction.
    fn hessian<O: Objective + ?Sized>(&self, objective: &O, x: &DVector<f64>) -> DMatrix<f64>;
}

/// How finite-difference steps scale with the evaluation point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepRule {
    /// `h_i = step · max(1, |x_i|)`.
    Relative,
    /// `h_i = step`.
    Absolute,
}

/// Central finite-difference configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FiniteDifference {
    /// Base step for gradient differences.
    pub gradient_step: f64,
    /// Base step for Hessian differences.
    pub hessian_step: f64,
    /// Scaling rule applied to both steps.
    pub rule: StepRule,
}

impl Default for FiniteDifference {
    fn default() -> Self {
        Self {
            gradient_step: f64::EPSILON.cbrt(),
            hessian_step: f64::EPSILON.powf(0.25),
            rule: StepRule::Relative,
        }
    }
}

impl FiniteDifference {
    /// Fixed absolute steps, independent of the evaluation point.
    pub fn absolute(gradient_step: f64, hessian_step: f64) -> Self {
        Self {
            gradient_step,
            hessian_step,
            rule: StepRule::Absolute,
        }
    }

    /// Checks that both steps are finite and strictly positive.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("gradient_step", self.gradient_step),
            ("hessian_step", self.hessian_step),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(CriticalPointError::invalid_option(
                    name,
                    value,
                    "must be finite and > 0",
                ));
            }
        }
        Ok(())
    }

    fn step(&self, base: f64, coordinate: f64) -> f64 {
        match self.rule {
            StepRule::Relative => base * coordinate.abs().max(1.0),
            StepRule::Absolute => base,
        }
    }

    fn gradient<O: Objective + ?Sized>(&self, objective: &O, x: &DVector<f64>) -> DVector<f64> {
        let mut probe = x.clone();
        DVector::from_iterator(
            x.len(),
            (0..x.len()).map(|i| {
                let h = self.step(self.gradient_step, x[i]);
                probe[i] = x[i] + h;
                let xp = probe[i];
                let fp = objective.value(probe.as_slice());
                probe[i] = x[i] - h;
                let xm = probe[i];
                let fm = objective.value(probe.as_slice());
                probe[i] = x[i];
                finite_or_inf((fp - fm) / (xp - xm))
            }),
        )
    }

    fn hessian<O: Objective + ?Sized>(&self, objective: &O, x: &DVector<f64>) -> DMatrix<f64> {
        let n = x.len();
        let steps: Vec<f64> = x.iter().map(|xi| self.step(self.hessian_step, *xi)).collect();
        let f0 = objective.value(x.as_slice());
        let mut probe = x.clone();
        let mut hessian = DMatrix::zeros(n, n);

        for i in 0..n {
            let hi = steps[i];
            probe[i] = x[i] + hi;
            let fp = objective.value(probe.as_slice());
            probe[i] = x[i] - hi;
            let fm = objective.value(probe.as_slice());
            probe[i] = x[i];
            hessian[(i, i)] = finite_or_inf((fp - 2.0 * f0 + fm) / (hi * hi));

            for j in (i + 1)..n {
                let hj = steps[j];
                let mut corner = |si: f64, sj: f64| {
                    probe[i] = x[i] + si * hi;
                    probe[j] = x[j] + sj * hj;
                    let value = objective.value(probe.as_slice());
                    probe[i] = x[i];
                    probe[j] = x[j];
                    value
                };
                let fpp = corner(1.0, 1.0);
                let fpm = corner(1.0, -1.0);
                let fmp = corner(-1.0, 1.0);
                let fmm = corner(-1.0, -1.0);
                let mixed = finite_or_inf((fpp - fpm - fmp + fmm) / (4.0 * hi * hj));
                hessian[(i, j)] = mixed;
                hessian[(j, i)] = mixed;
            }
        }
        hessian
    }
}

/// Derivative strategy, selected once per refinement run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum GradientMethod {
    /// Hyper-dual automatic differentiation.
    Exact,
    /// Central finite differences.
    Numerical(FiniteDifference),
}

impl Default for GradientMethod {
    fn default() -> Self {
        Self::Numerical(FiniteDifference::default())
    }
}

impl GradientMethod {
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Exact => Ok(()),
            Self::Numerical(fd) => fd.validate(),
        }
    }

    /// Fails fast when exact mode is paired with an opaque objective.
    pub fn ensure_supported<O: Objective + ?Sized>(
        &self,
        objective: &O,
        x: &DVector<f64>,
    ) -> Result<()> {
        if matches!(self, Self::Exact) {
            let probe: Vec<HyperDual> = x.iter().map(|v| HyperDual::constant(*v)).collect();
            if objective.value_hyper(&probe).is_none() {
                return Err(CriticalPointError::ExactDerivativesUnavailable);
            }
        }
        Ok(())
    }
}

impl GradientOracle for GradientMethod {
    fn gradient<O: Objective + ?Sized>(&self, objective: &O, x: &DVector<f64>) -> DVector<f64> {
        match self {
            Self::Exact => exact_gradient(objective, x),
            Self::Numerical(fd) => fd.gradient(objective, x),
        }
    }

    fn hessian<O: Objective + ?Sized>(&self, objective: &O, x: &DVector<f64>) -> DMatrix<f64> {
        match self {
            Self::Exact => exact_hessian(objective, x),
            Self::Numerical(fd) => fd.hessian(objective, x),
        }
    }
}

fn exact_gradient<O: Objective + ?Sized>(objective: &O, x: &DVector<f64>) -> DVector<f64> {
    let mut seeds: Vec<HyperDual> = x.iter().map(|v| HyperDual::constant(*v)).collect();
    DVector::from_iterator(
        x.len(),
        (0..x.len()).map(|i| {
            seeds[i].e1 = 1.0;
            let out = objective.value_hyper(&seeds);
            seeds[i].e1 = 0.0;
            match out {
                Some(v) if v.re.is_finite() => finite_or_inf(v.e1),
                _ => f64::INFINITY,
            }
        }),
    )
}

fn exact_hessian<O: Objective + ?Sized>(objective: &O, x: &DVector<f64>) -> DMatrix<f64> {
    let n = x.len();
    let mut seeds: Vec<HyperDual> = x.iter().map(|v| HyperDual::constant(*v)).collect();
    let mut hessian = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in i..n {
            seeds[i].e1 = 1.0;
            seeds[j].e2 = 1.0;
            let out = objective.value_hyper(&seeds);
            seeds[i].e1 = 0.0;
            seeds[j].e2 = 0.0;
            let entry = match out {
                Some(v) if v.re.is_finite() => finite_or_inf(v.e12),
                _ => f64::INFINITY,
            };
            hessian[(i, j)] = entry;
            hessian[(j, i)] = entry;
        }
    }
    hessian
}

fn finite_or_inf(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    struct Rosenbrock;

    impl GenericObjective for Rosenbrock {
        fn evaluate<T: Scalar>(&self, x: &[T]) -> T {
            let one = T::one();
            let hundred = crate::autodiff::lift::<T>(100.0);
            let a = one - x[0];
            let b = x[1] - x[0] * x[0];
            a * a + hundred * b * b
        }
    }

    fn rosenbrock_hessian(x: f64, y: f64) -> DMatrix<f64> {
        DMatrix::from_row_slice(
            2,
            2,
            &[
                2.0 - 400.0 * (y - x * x) + 800.0 * x * x,
                -400.0 * x,
                -400.0 * x,
                200.0,
            ],
        )
    }

    #[test]
    fn exact_derivatives_match_closed_form() {
        let f = Differentiable(Rosenbrock);
        let x = DVector::from_vec(vec![-0.5, 0.8]);
        let g = GradientMethod::Exact.gradient(&f, &x);
        let expected = DVector::from_vec(vec![
            -2.0 * (1.0 - -0.5) - 400.0 * -0.5 * (0.8 - 0.25),
            200.0 * (0.8 - 0.25),
        ]);
        assert_relative_eq!(g, expected, epsilon = 1e-12);

        let h = GradientMethod::Exact.hessian(&f, &x);
        assert_relative_eq!(h, rosenbrock_hessian(-0.5, 0.8), epsilon = 1e-10);
    }

    #[test]
    fn numerical_derivatives_agree_with_exact() {
        let f = Differentiable(Rosenbrock);
        let x = DVector::from_vec(vec![0.3, -0.2]);
        let method = GradientMethod::default();
        let exact = GradientMethod::Exact.gradient(&f, &x);
        let numeric = method.gradient(&f, &x);
        assert_relative_eq!(numeric, exact, epsilon = 1e-6);

        let h = method.hessian(&f, &x);
        assert_relative_eq!(h, rosenbrock_hessian(0.3, -0.2), epsilon = 1e-4);
    }

    #[test]
    fn non_finite_objective_yields_infinite_gradient() {
        let f = |x: &[f64]| if x[0] > 0.0 { f64::NAN } else { x[0] * x[0] };
        let x = DVector::from_vec(vec![0.0]);
        let g = GradientMethod::default().gradient(&f, &x);
        assert!(g[0].is_infinite());
    }

    #[test]
    fn exact_mode_rejects_opaque_closure() {
        let f = |x: &[f64]| x[0] * x[0];
        let x = DVector::from_vec(vec![1.0]);
        assert!(matches!(
            GradientMethod::Exact.ensure_supported(&f, &x),
            Err(CriticalPointError::ExactDerivativesUnavailable)
        ));
        assert!(GradientMethod::default().ensure_supported(&f, &x).is_ok());
    }

    #[test]
    fn rejects_non_positive_steps() {
        let method = GradientMethod::Numerical(FiniteDifference::absolute(0.0, 1e-4));
        assert!(matches!(
            method.validate(),
            Err(CriticalPointError::InvalidOption {
                name: "gradient_step",
                ..
            })
        ));
    }
}
