//! Critical-point refinement and capture analysis.
//!
//! Approximate critical points of a scalar objective, typically produced by a
//! polynomial-approximation solver, are turned into a trustworthy reference
//! set and then used to score how well other approximations recover them.
//! The crate offers tools to
//!
//! - supply first and second derivatives exactly or by finite differences (`oracle` module),
//! - refine a starting point to a minimum, maximum or saddle with a damped,
//!   eigen-regularised Newton iteration (`refine` module),
//! - classify stationary points from Hessian eigenvalues (`classify` module),
//! - batch-refine and deduplicate candidates into [`KnownCriticalPoints`] (`reference` module),
//! - measure multi-threshold capture rates of computed points (`capture` module), and
//! - judge a sequence of capture results across fidelity levels (`verdict` module).
//!
//! Input contract violations are reported as [`CriticalPointError`]; numerical
//! non-convergence is data, visible through [`RefinementOutcome::converged`]
//! and [`ReferenceSummary`].
//!
//! # Quick start
//!
//! ```no_run
//! use critpoints::capture::{analyze_capture, CaptureOptions};
//! use critpoints::domain::DomainBounds;
//! use critpoints::reference::ReferenceSetBuilder;
//! use critpoints::verdict::{assess_convergence, VerdictOptions};
//! use nalgebra::DVector;
//!
//! // f(x, y) = x³ - 3x + y² has a minimum at (1, 0) and a saddle at (-1, 0).
//! let objective = |x: &[f64]| x[0].powi(3) - 3.0 * x[0] + x[1] * x[1];
//! let bounds = DomainBounds::cube(2, -2.0, 2.0).expect("valid bounds");
//!
//! let candidates = bounds.sample_uniform(32, 1234);
//! let reference = ReferenceSetBuilder::new(&objective, bounds)
//!     .build(&candidates)
//!     .expect("at least one candidate converged");
//!
//! let degree_4 = vec![DVector::from_vec(vec![0.98, 0.01])];
//! let degree_6 = vec![
//!     DVector::from_vec(vec![1.0, 0.0]),
//!     DVector::from_vec(vec![-1.01, 0.0]),
//! ];
//! let options = CaptureOptions::default();
//! let levels = vec![
//!     (4, analyze_capture(&reference.known, &degree_4, &options).expect("matching dimensions")),
//!     (6, analyze_capture(&reference.known, &degree_6, &options).expect("matching dimensions")),
//! ];
//!
//! let verdict = assess_convergence(&levels, &VerdictOptions::default()).expect("consistent tolerances");
//! println!("best degree {} captures {:.0}% ({})", verdict.best_level, 100.0 * verdict.best_rate, verdict.label);
//! ```

pub mod autodiff;
pub mod capture;
pub mod classify;
pub mod domain;
pub mod error;
pub mod options;
pub mod oracle;
pub mod reference;
pub mod refine;
pub mod verdict;

pub use capture::{analyze_capture, CaptureOptions, CaptureResult};
pub use classify::{classify, CaptureClass, CriticalPointType, PerClass};
pub use domain::{DomainBounds, Point};
pub use error::{CriticalPointError, Result};
pub use options::{ReferenceOptions, RefinementOptions};
pub use oracle::{Differentiable, GenericObjective, GradientMethod, GradientOracle, Objective};
pub use reference::{KnownCriticalPoints, ReferenceSet, ReferenceSetBuilder, ReferenceSummary};
pub use refine::{refine_critical_point, RefinementOutcome};
pub use verdict::{assess_convergence, ConvergenceVerdict, VerdictLabel, VerdictOptions};
