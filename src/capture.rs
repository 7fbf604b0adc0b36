//! Multi-threshold capture rates of known critical points by computed approximations.
//!
//! A known point is captured at a tolerance when at least one computed point
//! lies within `fraction × domain_diameter` of it. Distances are computed one
//! known point at a time, so memory stays linear in the set sizes.

use log::warn;
use nalgebra::DVector;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::classify::{CaptureClass, PerClass};
use crate::error::{CriticalPointError, Result};
use crate::reference::KnownCriticalPoints;

/// Default tolerance fractions of the domain diameter.
pub const DEFAULT_TOLERANCE_FRACTIONS: [f64; 4] = [0.01, 0.025, 0.05, 0.10];

/// Absolute slack used when looking up a tolerance fraction.
pub(crate) const FRACTION_MATCH_EPS: f64 = 1e-12;

/// Configuration for [`analyze_capture`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaptureOptions {
    /// Tolerances as fractions of the domain diameter; sorted before use.
    pub tolerance_fractions: Vec<f64>,
    /// Scan known points on the rayon thread pool.
    pub parallel: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            tolerance_fractions: DEFAULT_TOLERANCE_FRACTIONS.to_vec(),
            parallel: true,
        }
    }
}

impl CaptureOptions {
    pub fn with_tolerance_fractions(mut self, fractions: Vec<f64>) -> Self {
        self.tolerance_fractions = fractions;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.tolerance_fractions.is_empty() {
            return Err(CriticalPointError::empty("tolerance fractions"));
        }
        for &fraction in &self.tolerance_fractions {
            if !fraction.is_finite() || fraction <= 0.0 {
                return Err(CriticalPointError::invalid_option(
                    "tolerance_fractions",
                    fraction,
                    "every fraction must be finite and > 0",
                ));
            }
        }
        Ok(())
    }

    /// Sorted, duplicate-free fractions.
    fn sorted_fractions(&self) -> Vec<f64> {
        let mut fractions = self.tolerance_fractions.clone();
        fractions.sort_by(f64::total_cmp);
        fractions.dedup_by(|a, b| (*a - *b).abs() <= FRACTION_MATCH_EPS);
        fractions
    }
}

/// Capture statistics for one known set and one computed set.
///
/// Per-tolerance vectors are indexed like `tolerance_fractions`, which is
/// sorted ascending.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CaptureResult {
    /// Distance from each known point to its nearest computed point (`+∞` if none).
    pub nearest_distances: Vec<f64>,
    /// Index of that nearest computed point; ties resolve to the lowest index.
    pub nearest_indices: Vec<Option<usize>>,
    /// Capture class of each known point.
    pub known_classes: Vec<CaptureClass>,
    pub tolerance_fractions: Vec<f64>,
    /// `fraction × domain_diameter` for each tolerance.
    pub tolerance_values: Vec<f64>,
    /// `captured[t][k]`: known point `k` has a computed point within tolerance `t`.
    pub captured: Vec<Vec<bool>>,
    /// Overall capture rate per tolerance.
    pub capture_rates: Vec<f64>,
    /// Per-class capture rate per tolerance; `None` for classes with no known points.
    pub class_rates: PerClass<Option<Vec<f64>>>,
    /// Per-class captured counts per tolerance.
    pub class_captured: PerClass<Vec<usize>>,
    /// Number of known points per class.
    pub class_counts: PerClass<usize>,
    pub n_known: usize,
    pub n_computed: usize,
}

impl CaptureResult {
    /// Number of known points captured at tolerance index `t`.
    pub fn captured_count(&self, t: usize) -> usize {
        self.captured[t].iter().filter(|c| **c).count()
    }

    /// Indices of known points missed at tolerance index `t`.
    pub fn missed_indices(&self, t: usize) -> Vec<usize> {
        self.captured[t]
            .iter()
            .enumerate()
            .filter_map(|(k, captured)| (!captured).then_some(k))
            .collect()
    }

    /// Position of `fraction` in the analysed tolerance list.
    pub fn tolerance_index(&self, fraction: f64) -> Option<usize> {
        self.tolerance_fractions
            .iter()
            .position(|f| (f - fraction).abs() <= FRACTION_MATCH_EPS)
    }

    /// Overall capture rate at `fraction`, if it was analysed.
    pub fn rate_at(&self, fraction: f64) -> Option<f64> {
        self.tolerance_index(fraction)
            .map(|t| self.capture_rates[t])
    }

    /// Capture rate of `class` at tolerance index `t`, if the class has known points.
    pub fn class_rate(&self, class: CaptureClass, t: usize) -> Option<f64> {
        self.class_rates[class].as_ref().map(|rates| rates[t])
    }

    /// Whether `other` was analysed at the same tolerance fractions.
    pub fn same_tolerances(&self, other: &CaptureResult) -> bool {
        self.tolerance_fractions.len() == other.tolerance_fractions.len()
            && self
                .tolerance_fractions
                .iter()
                .zip(other.tolerance_fractions.iter())
                .all(|(a, b)| (a - b).abs() <= FRACTION_MATCH_EPS)
    }
}

/// Matches `computed` against `known` at every configured tolerance.
///
/// An empty computed set is valid: every known point is missed at distance `+∞`.
pub fn analyze_capture(
    known: &KnownCriticalPoints,
    computed: &[DVector<f64>],
    options: &CaptureOptions,
) -> Result<CaptureResult> {
    options.validate()?;
    let dimension = known.dimension();
    for point in computed {
        if point.len() != dimension {
            return Err(CriticalPointError::dimension_mismatch(
                "computed point",
                dimension,
                point.len(),
            ));
        }
    }

    let nearest_of = |point: &DVector<f64>| nearest_neighbor(point, computed);
    let nearest: Vec<(f64, Option<usize>)> = if options.parallel {
        known.points().par_iter().map(nearest_of).collect()
    } else {
        known.points().iter().map(nearest_of).collect()
    };
    let (nearest_distances, nearest_indices): (Vec<f64>, Vec<Option<usize>>) =
        nearest.into_iter().unzip();

    let tolerance_fractions = options.sorted_fractions();
    let diameter = known.domain_diameter();
    let tolerance_values: Vec<f64> = tolerance_fractions.iter().map(|f| f * diameter).collect();

    let n_known = known.len();
    let captured: Vec<Vec<bool>> = tolerance_values
        .iter()
        .map(|tol| nearest_distances.iter().map(|d| *d <= *tol).collect())
        .collect();
    let capture_rates: Vec<f64> = captured
        .iter()
        .map(|row| row.iter().filter(|c| **c).count() as f64 / n_known as f64)
        .collect();

    let known_classes = known.classes().to_vec();
    let class_counts = known.class_counts();
    let class_captured = PerClass::from_fn(|class| {
        captured
            .iter()
            .map(|row| {
                row.iter()
                    .zip(known_classes.iter())
                    .filter(|(hit, c)| **hit && **c == class)
                    .count()
            })
            .collect::<Vec<usize>>()
    });
    let class_rates = class_captured.map(|class, counts| {
        let total = class_counts[class];
        (total > 0).then(|| {
            counts
                .iter()
                .map(|n| *n as f64 / total as f64)
                .collect::<Vec<f64>>()
        })
    });

    if computed.is_empty() {
        warn!("capture analysis: no computed points, every known point is missed");
    }

    Ok(CaptureResult {
        nearest_distances,
        nearest_indices,
        known_classes,
        tolerance_fractions,
        tolerance_values,
        captured,
        capture_rates,
        class_rates,
        class_captured,
        class_counts,
        n_known,
        n_computed: computed.len(),
    })
}

/// Nearest computed point to `target`; the first of several equidistant points wins.
fn nearest_neighbor(target: &DVector<f64>, computed: &[DVector<f64>]) -> (f64, Option<usize>) {
    let mut best = (f64::INFINITY, None);
    for (index, point) in computed.iter().enumerate() {
        let distance = target.metric_distance(point);
        if distance < best.0 {
            best = (distance, Some(index));
        }
    }
    best
}
