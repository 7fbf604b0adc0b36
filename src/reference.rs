//! Batch refinement of raw candidates into a deduplicated, classified reference set.

use std::cmp::Ordering;

use log::{debug, warn};
use nalgebra::DVector;
use rayon::prelude::*;
use serde::Serialize;

use crate::classify::{CaptureClass, CriticalPointType, PerClass};
use crate::domain::DomainBounds;
use crate::error::{CriticalPointError, Result};
use crate::oracle::Objective;
use crate::options::ReferenceOptions;
use crate::refine::{newton_refine, RefinementOutcome};

/// Canonical set of known critical points against which computed points are scored.
///
/// Non-empty by construction; every point has the domain dimension.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KnownCriticalPoints {
    points: Vec<DVector<f64>>,
    values: Vec<f64>,
    classes: Vec<CaptureClass>,
    domain_diameter: f64,
}

impl KnownCriticalPoints {
    /// Validates an analytically supplied set of `(point, value, class)` triples.
    pub fn new(
        points: Vec<DVector<f64>>,
        values: Vec<f64>,
        classes: Vec<CaptureClass>,
        bounds: &DomainBounds,
    ) -> Result<Self> {
        if points.is_empty() {
            return Err(CriticalPointError::empty("known critical points"));
        }
        if values.len() != points.len() {
            return Err(CriticalPointError::dimension_mismatch(
                "known values length",
                points.len(),
                values.len(),
            ));
        }
        if classes.len() != points.len() {
            return Err(CriticalPointError::dimension_mismatch(
                "known classes length",
                points.len(),
                classes.len(),
            ));
        }
        for point in &points {
            bounds.check_dimension("known critical point", point)?;
        }
        Ok(Self {
            points,
            values,
            classes,
            domain_diameter: bounds.diameter(),
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.points[0].len()
    }

    /// Diameter of the domain the set was computed against.
    pub fn domain_diameter(&self) -> f64 {
        self.domain_diameter
    }

    pub fn points(&self) -> &[DVector<f64>] {
        &self.points
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn classes(&self) -> &[CaptureClass] {
        &self.classes
    }

    /// Number of known points per class.
    pub fn class_counts(&self) -> PerClass<usize> {
        let mut counts = PerClass::default();
        for class in &self.classes {
            counts[*class] += 1;
        }
        counts
    }

    /// Iterates `(point, value, class)` triples.
    pub fn iter(&self) -> impl Iterator<Item = (&DVector<f64>, f64, CaptureClass)> {
        self.points
            .iter()
            .zip(self.values.iter().copied())
            .zip(self.classes.iter().copied())
            .map(|((point, value), class)| (point, value, class))
    }
}

/// Batch statistics from [`ReferenceSetBuilder::build`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReferenceSummary {
    /// Number of raw candidates refined.
    pub candidates: usize,
    /// Number that met the gradient tolerance.
    pub converged: usize,
    /// Converged outcomes discarded as duplicates of a better representative.
    pub duplicates: usize,
    /// Unique critical points kept.
    pub unique: usize,
    /// Unique points classified `Degenerate` before folding into `Saddle`.
    pub degenerate: usize,
    /// Unique points per capture class.
    pub class_counts: PerClass<usize>,
}

impl ReferenceSummary {
    /// Fraction of candidates that converged.
    pub fn convergence_rate(&self) -> f64 {
        self.converged as f64 / self.candidates as f64
    }
}

/// Output of a reference-set build.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReferenceSet {
    /// Canonical known set for capture analysis.
    pub known: KnownCriticalPoints,
    /// Refinement outcomes of the unique points, best gradient norm first.
    /// `Degenerate` labels are preserved here.
    pub outcomes: Vec<RefinementOutcome>,
    pub summary: ReferenceSummary,
}

/// Refines candidate points and reduces them to a canonical [`KnownCriticalPoints`].
pub struct ReferenceSetBuilder<'a, O: ?Sized> {
    objective: &'a O,
    bounds: DomainBounds,
    options: ReferenceOptions,
}

impl<'a, O: Objective + ?Sized> ReferenceSetBuilder<'a, O> {
    pub fn new(objective: &'a O, bounds: DomainBounds) -> Self {
        Self {
            objective,
            bounds,
            options: ReferenceOptions::default(),
        }
    }

    /// Replaces the builder options.
    pub fn options(mut self, options: ReferenceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn bounds(&self) -> &DomainBounds {
        &self.bounds
    }

    /// Refines every candidate, drops non-converged ones, removes duplicates
    /// best-first and classifies the survivors.
    pub fn build(&self, candidates: &[DVector<f64>]) -> Result<ReferenceSet> {
        self.options.validate()?;
        if candidates.is_empty() {
            return Err(CriticalPointError::empty("candidate batch"));
        }
        for candidate in candidates {
            self.bounds.check_dimension("candidate point", candidate)?;
        }
        let refinement = &self.options.refinement;
        refinement
            .method
            .ensure_supported(self.objective, &candidates[0])?;

        let refine_one = |start: &DVector<f64>| {
            newton_refine(self.objective, start.clone(), Some(&self.bounds), refinement)
        };
        let outcomes: Vec<RefinementOutcome> = if self.options.parallel {
            candidates.par_iter().map(refine_one).collect()
        } else {
            candidates.iter().map(refine_one).collect()
        };

        let mut converged: Vec<RefinementOutcome> =
            outcomes.into_iter().filter(|o| o.converged).collect();
        if converged.is_empty() {
            warn!(
                "reference set: none of {} candidates converged",
                candidates.len()
            );
            return Err(CriticalPointError::NoConvergedCandidates {
                candidates: candidates.len(),
            });
        }
        if converged.len() < candidates.len() {
            warn!(
                "reference set: {} of {} candidates did not converge",
                candidates.len() - converged.len(),
                candidates.len()
            );
        }
        let converged_count = converged.len();

        converged.sort_by(best_first);
        let threshold = self.options.dedup_fraction * self.bounds.diameter();
        let unique = deduplicate(converged, threshold);

        let mut class_counts = PerClass::default();
        let mut degenerate = 0usize;
        for outcome in &unique {
            class_counts[outcome.cp_type.capture_class()] += 1;
            if outcome.cp_type == CriticalPointType::Degenerate {
                degenerate += 1;
            }
        }

        let summary = ReferenceSummary {
            candidates: candidates.len(),
            converged: converged_count,
            duplicates: converged_count - unique.len(),
            unique: unique.len(),
            degenerate,
            class_counts,
        };
        debug!(
            "reference set: {} candidates, {} converged, {} unique ({} duplicates, {} degenerate)",
            summary.candidates,
            summary.converged,
            summary.unique,
            summary.duplicates,
            summary.degenerate
        );

        let known = KnownCriticalPoints {
            points: unique.iter().map(|o| o.point.clone()).collect(),
            values: unique.iter().map(|o| o.objective_value).collect(),
            classes: unique.iter().map(|o| o.cp_type.capture_class()).collect(),
            domain_diameter: self.bounds.diameter(),
        };

        Ok(ReferenceSet {
            known,
            outcomes: unique,
            summary,
        })
    }
}

/// Total order on outcomes: gradient norm, then point coordinates
/// lexicographically, then the remaining per-start fields.
///
/// Equal gradient norms are common (finite differences often report exactly
/// zero), so the coordinates decide which near-duplicate represents a
/// cluster. The input order of the batch never does.
fn best_first(a: &RefinementOutcome, b: &RefinementOutcome) -> Ordering {
    a.gradient_norm
        .total_cmp(&b.gradient_norm)
        .then_with(|| {
            a.point
                .iter()
                .zip(b.point.iter())
                .map(|(x, y)| x.total_cmp(y))
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.initial_gradient_norm.total_cmp(&b.initial_gradient_norm))
        .then_with(|| a.iterations.cmp(&b.iterations))
}

/// Greedy best-first deduplication over outcomes sorted by gradient norm.
///
/// An outcome is kept only if it lies farther than `threshold` from every
/// outcome kept before it.
fn deduplicate(sorted: Vec<RefinementOutcome>, threshold: f64) -> Vec<RefinementOutcome> {
    let mut accepted: Vec<usize> = Vec::new();
    for (index, outcome) in sorted.iter().enumerate() {
        let is_new = accepted
            .iter()
            .all(|&kept| outcome.point.metric_distance(&sorted[kept].point) > threshold);
        if is_new {
            accepted.push(index);
        }
    }

    let mut keep = vec![false; sorted.len()];
    for index in accepted {
        keep[index] = true;
    }
    sorted
        .into_iter()
        .zip(keep)
        .filter_map(|(outcome, kept)| kept.then_some(outcome))
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn cubic_valley(x: &[f64]) -> f64 {
        x[0].powi(3) - 3.0 * x[0] + x[1] * x[1]
    }

    fn candidates() -> Vec<DVector<f64>> {
        vec![
            DVector::from_vec(vec![0.8, 0.3]),
            DVector::from_vec(vec![-1.3, -0.2]),
            DVector::from_vec(vec![1.2, -0.1]),
            DVector::from_vec(vec![-0.7, 0.1]),
        ]
    }

    fn outcome_at(point: Vec<f64>, gradient_norm: f64) -> RefinementOutcome {
        RefinementOutcome {
            point: DVector::from_vec(point),
            gradient_norm,
            objective_value: 0.0,
            converged: true,
            iterations: 1,
            cp_type: CriticalPointType::Minimum,
            hessian_eigenvalues: vec![1.0, 1.0],
            initial_gradient_norm: 1.0,
        }
    }

    #[test]
    fn builds_minimum_and_saddle() {
        let bounds = DomainBounds::cube(2, -2.0, 2.0).unwrap();
        let set = ReferenceSetBuilder::new(&cubic_valley, bounds)
            .build(&candidates())
            .unwrap();

        assert_eq!(set.summary.candidates, 4);
        assert_eq!(set.summary.converged, 4);
        assert_eq!(set.summary.unique, 2);
        assert_eq!(set.summary.duplicates, 2);
        assert_relative_eq!(set.summary.convergence_rate(), 1.0);
        assert_eq!(set.known.len(), 2);

        let counts = set.known.class_counts();
        assert_eq!(counts[CaptureClass::Minimum], 1);
        assert_eq!(counts[CaptureClass::Saddle], 1);
        assert_eq!(counts[CaptureClass::Maximum], 0);

        for (point, value, class) in set.known.iter() {
            let expected_x = match class {
                CaptureClass::Minimum => 1.0,
                _ => -1.0,
            };
            assert_relative_eq!(point[0], expected_x, epsilon = 1e-6);
            assert_relative_eq!(value, cubic_valley(point.as_slice()), epsilon = 1e-12);
        }
    }

    #[test]
    fn sequential_and_parallel_agree() {
        let bounds = DomainBounds::cube(2, -2.0, 2.0).unwrap();
        let parallel = ReferenceSetBuilder::new(&cubic_valley, bounds.clone())
            .build(&candidates())
            .unwrap();
        let sequential = ReferenceSetBuilder::new(&cubic_valley, bounds)
            .options(ReferenceOptions::default().with_parallel(false))
            .build(&candidates())
            .unwrap();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn result_does_not_depend_on_candidate_order() {
        let bounds = DomainBounds::cube(2, -2.0, 2.0).unwrap();
        let builder = ReferenceSetBuilder::new(&cubic_valley, bounds.clone());
        let forward_batch = bounds.sample_uniform(40, 5);
        let reversed_batch: Vec<DVector<f64>> = forward_batch.iter().rev().cloned().collect();

        let forward = builder.build(&forward_batch).unwrap();
        let reversed = builder.build(&reversed_batch).unwrap();
        assert_eq!(forward.known.points(), reversed.known.points());
        assert_eq!(forward.known, reversed.known);
        assert_eq!(forward.outcomes, reversed.outcomes);
        assert_eq!(forward.summary, reversed.summary);
    }

    #[test]
    fn equal_gradient_norms_order_by_coordinates() {
        let mut outcomes = vec![
            outcome_at(vec![-0.999_999_999_997, 4e-12], 0.0),
            outcome_at(vec![-0.999_999_999_993, 2e-12], 0.0),
            outcome_at(vec![0.5, 0.0], 1e-14),
        ];
        outcomes.sort_by(best_first);
        let unique = deduplicate(outcomes, 0.01);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].point[0], -0.999_999_999_997);
        assert_eq!(unique[1].point[0], 0.5);
    }

    #[test]
    fn dedup_keeps_lowest_gradient_representative() {
        let sorted = vec![
            outcome_at(vec![0.0, 0.0], 1e-12),
            outcome_at(vec![0.001, 0.0], 1e-10),
            outcome_at(vec![1.0, 1.0], 1e-9),
        ];
        let unique = deduplicate(sorted, 0.01);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].gradient_norm, 1e-12);
        assert_eq!(unique[1].point, DVector::from_vec(vec![1.0, 1.0]));
    }

    #[test]
    fn no_converged_candidates_is_an_error() {
        let tilted = |x: &[f64]| 2.0 * x[0] + x[1];
        let bounds = DomainBounds::cube(2, -1.0, 1.0).unwrap();
        let options = ReferenceOptions::default().with_refinement(
            crate::options::RefinementOptions::default().with_max_iterations(3),
        );
        let result = ReferenceSetBuilder::new(&tilted, bounds)
            .options(options)
            .build(&[DVector::from_vec(vec![0.1, 0.2])]);
        assert!(matches!(
            result,
            Err(CriticalPointError::NoConvergedCandidates { candidates: 1 })
        ));
    }

    #[test]
    fn rejects_contract_violations() {
        let bounds = DomainBounds::cube(2, -2.0, 2.0).unwrap();
        let builder = ReferenceSetBuilder::new(&cubic_valley, bounds.clone());
        assert!(matches!(
            builder.build(&[]),
            Err(CriticalPointError::EmptyInput { .. })
        ));
        assert!(matches!(
            builder.build(&[DVector::from_vec(vec![0.1, 0.2, 0.3])]),
            Err(CriticalPointError::DimensionMismatch { .. })
        ));
        let bad = ReferenceSetBuilder::new(&cubic_valley, bounds)
            .options(ReferenceOptions::default().with_dedup_fraction(1.5));
        assert!(matches!(
            bad.build(&candidates()),
            Err(CriticalPointError::InvalidOption {
                name: "dedup_fraction",
                ..
            })
        ));
    }

    #[test]
    fn known_set_validates_lengths() {
        let bounds = DomainBounds::cube(2, -1.0, 1.0).unwrap();
        let result = KnownCriticalPoints::new(
            vec![DVector::zeros(2)],
            vec![0.0, 1.0],
            vec![CaptureClass::Minimum],
            &bounds,
        );
        assert!(matches!(
            result,
            Err(CriticalPointError::DimensionMismatch { .. })
        ));
        let empty = KnownCriticalPoints::new(vec![], vec![], vec![], &bounds);
        assert!(matches!(empty, Err(CriticalPointError::EmptyInput { .. })));
    }
}
