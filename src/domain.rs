//! Search-domain bounds and the diameter that scales every relative tolerance.

use nalgebra::DVector;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::error::{CriticalPointError, Result};

/// A point in the search domain.
pub type Point = DVector<f64>;

/// Axis-aligned box `[lower, upper]` with positive extent in every dimension.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainBounds {
    lower: DVector<f64>,
    upper: DVector<f64>,
    diameter: f64,
}

impl DomainBounds {
    /// Builds bounds from corner vectors after validating every interval.
    pub fn new(lower: DVector<f64>, upper: DVector<f64>) -> Result<Self> {
        if lower.is_empty() {
            return Err(CriticalPointError::empty("domain bounds"));
        }
        if lower.len() != upper.len() {
            return Err(CriticalPointError::dimension_mismatch(
                "upper bound length",
                lower.len(),
                upper.len(),
            ));
        }
        for (dimension, (&lo, &hi)) in lower.iter().zip(upper.iter()).enumerate() {
            if !lo.is_finite() || !hi.is_finite() || lo >= hi {
                return Err(CriticalPointError::InvalidBounds {
                    dimension,
                    lower: lo,
                    upper: hi,
                });
            }
        }
        let diameter = (&upper - &lower).norm();
        Ok(Self {
            lower,
            upper,
            diameter,
        })
    }

    /// Builds bounds from `(lower, upper)` pairs, one per dimension.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self> {
        let lower = DVector::from_iterator(pairs.len(), pairs.iter().map(|(lo, _)| *lo));
        let upper = DVector::from_iterator(pairs.len(), pairs.iter().map(|(_, hi)| *hi));
        Self::new(lower, upper)
    }

    /// Hypercube `[lower, upper]^dimension`.
    pub fn cube(dimension: usize, lower: f64, upper: f64) -> Result<Self> {
        Self::new(
            DVector::from_element(dimension, lower),
            DVector::from_element(dimension, upper),
        )
    }

    /// Number of coordinates.
    pub fn dimension(&self) -> usize {
        self.lower.len()
    }

    /// Lower corner.
    pub fn lower(&self) -> &DVector<f64> {
        &self.lower
    }

    /// Upper corner.
    pub fn upper(&self) -> &DVector<f64> {
        &self.upper
    }

    /// Euclidean distance between the two corners.
    pub fn diameter(&self) -> f64 {
        self.diameter
    }

    /// Per-dimension extent `upper - lower`.
    pub fn widths(&self) -> DVector<f64> {
        &self.upper - &self.lower
    }

    /// Midpoint of the box.
    pub fn center(&self) -> DVector<f64> {
        (&self.lower + &self.upper) * 0.5
    }

    /// Whether `point` lies inside the closed box.
    pub fn contains(&self, point: &DVector<f64>) -> bool {
        point.len() == self.dimension()
            && point
                .iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .all(|(x, (lo, hi))| *x >= *lo && *x <= *hi)
    }

    /// Projects `point` coordinate-wise onto the box. NaN coordinates are left untouched.
    pub fn clamp(&self, point: &mut DVector<f64>) {
        for ((x, lo), hi) in point
            .iter_mut()
            .zip(self.lower.iter())
            .zip(self.upper.iter())
        {
            *x = x.clamp(*lo, *hi);
        }
    }

    /// Checks that `point` has the domain dimension.
    pub fn check_dimension(&self, context: &'static str, point: &DVector<f64>) -> Result<()> {
        if point.len() != self.dimension() {
            return Err(CriticalPointError::dimension_mismatch(
                context,
                self.dimension(),
                point.len(),
            ));
        }
        Ok(())
    }

    /// Draws `count` reproducible starting points uniformly from the box.
    pub fn sample_uniform(&self, count: usize, seed: u64) -> Vec<Point> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let axes: Vec<Uniform<f64>> = self
            .lower
            .iter()
            .zip(self.upper.iter())
            .map(|(lo, hi)| Uniform::new_inclusive(*lo, *hi))
            .collect();
        (0..count)
            .map(|_| DVector::from_iterator(axes.len(), axes.iter().map(|u| u.sample(&mut rng))))
            .collect()
    }
}
