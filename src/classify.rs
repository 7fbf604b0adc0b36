//! Critical-point types from Hessian curvature.

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::error::{CriticalPointError, Result};

/// Type of a stationary point, read off the Hessian eigenvalue signs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CriticalPointType {
    Minimum,
    Maximum,
    Saddle,
    /// At least one eigenvalue is numerically zero (or non-finite).
    Degenerate,
}

impl CriticalPointType {
    /// Capture-analysis label; `Degenerate` folds into `Saddle`.
    pub fn capture_class(self) -> CaptureClass {
        match self {
            Self::Minimum => CaptureClass::Minimum,
            Self::Maximum => CaptureClass::Maximum,
            Self::Saddle | Self::Degenerate => CaptureClass::Saddle,
        }
    }
}

impl fmt::Display for CriticalPointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Minimum => "min",
            Self::Maximum => "max",
            Self::Saddle => "saddle",
            Self::Degenerate => "degenerate",
        };
        f.write_str(label)
    }
}

/// The three labels capture rates are broken down by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureClass {
    Minimum,
    Maximum,
    Saddle,
}

impl CaptureClass {
    pub const ALL: [CaptureClass; 3] = [Self::Minimum, Self::Maximum, Self::Saddle];

    fn index(self) -> usize {
        match self {
            Self::Minimum => 0,
            Self::Maximum => 1,
            Self::Saddle => 2,
        }
    }
}

impl From<CriticalPointType> for CaptureClass {
    fn from(value: CriticalPointType) -> Self {
        value.capture_class()
    }
}

impl fmt::Display for CaptureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Minimum => "min",
            Self::Maximum => "max",
            Self::Saddle => "saddle",
        };
        f.write_str(label)
    }
}

/// One value per [`CaptureClass`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerClass<T>([T; 3]);

impl<T> PerClass<T> {
    pub fn from_fn(mut f: impl FnMut(CaptureClass) -> T) -> Self {
        Self(CaptureClass::ALL.map(&mut f))
    }

    pub fn iter(&self) -> impl Iterator<Item = (CaptureClass, &T)> {
        CaptureClass::ALL.into_iter().zip(self.0.iter())
    }

    pub fn map<U>(&self, mut f: impl FnMut(CaptureClass, &T) -> U) -> PerClass<U> {
        PerClass::from_fn(|class| f(class, &self[class]))
    }
}

impl<T> Index<CaptureClass> for PerClass<T> {
    type Output = T;

    fn index(&self, class: CaptureClass) -> &T {
        &self.0[class.index()]
    }
}

impl<T> IndexMut<CaptureClass> for PerClass<T> {
    fn index_mut(&mut self, class: CaptureClass) -> &mut T {
        &mut self.0[class.index()]
    }
}

/// Labels a stationary point from its Hessian eigenvalues.
///
/// Eigenvalues with `|λ| ≤ tol` count as zero and make the point
/// [`Degenerate`](CriticalPointType::Degenerate); so does any non-finite
/// eigenvalue, since its sign carries no information.
///
/// Returns [`CriticalPointError::InvalidOption`] unless `tol` is finite and
/// strictly positive.
pub fn classify(eigenvalues: &[f64], tol: f64) -> Result<CriticalPointType> {
    if !tol.is_finite() || tol <= 0.0 {
        return Err(CriticalPointError::invalid_option(
            "hessian_tolerance",
            tol,
            "must be finite and > 0",
        ));
    }
    Ok(classify_unchecked(eigenvalues, tol))
}

/// [`classify`] for a tolerance that was already validated.
pub(crate) fn classify_unchecked(eigenvalues: &[f64], tol: f64) -> CriticalPointType {
    let n = eigenvalues.len();
    let mut n_pos = 0usize;
    let mut n_neg = 0usize;
    for &lambda in eigenvalues {
        if !lambda.is_finite() || lambda.abs() <= tol {
            return CriticalPointType::Degenerate;
        }
        if lambda > tol {
            n_pos += 1;
        } else {
            n_neg += 1;
        }
    }

    if n_pos == n {
        CriticalPointType::Minimum
    } else if n_neg == n {
        CriticalPointType::Maximum
    } else {
        CriticalPointType::Saddle
    }
}
