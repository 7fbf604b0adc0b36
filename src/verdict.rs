//! Pass/fail judgment over capture results across increasing fidelity levels.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::capture::CaptureResult;
use crate::classify::PerClass;
use crate::error::{CriticalPointError, Result};

/// Reference tolerance and label thresholds for [`assess_convergence`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerdictOptions {
    /// Tolerance fraction at which levels are compared.
    pub reference_fraction: f64,
    /// Minimum capture rate labelled [`VerdictLabel::Excellent`].
    pub excellent_threshold: f64,
    /// Minimum capture rate labelled [`VerdictLabel::Good`].
    pub good_threshold: f64,
}

impl Default for VerdictOptions {
    fn default() -> Self {
        Self {
            reference_fraction: 0.05,
            excellent_threshold: 0.80,
            good_threshold: 0.50,
        }
    }
}

impl VerdictOptions {
    pub fn with_reference_fraction(mut self, fraction: f64) -> Self {
        self.reference_fraction = fraction;
        self
    }

    pub fn with_thresholds(mut self, excellent: f64, good: f64) -> Self {
        self.excellent_threshold = excellent;
        self.good_threshold = good;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.reference_fraction.is_finite() || self.reference_fraction <= 0.0 {
            return Err(CriticalPointError::invalid_option(
                "reference_fraction",
                self.reference_fraction,
                "must be finite and > 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.excellent_threshold) {
            return Err(CriticalPointError::invalid_option(
                "excellent_threshold",
                self.excellent_threshold,
                "must lie in [0, 1]",
            ));
        }
        if !(0.0..=self.excellent_threshold).contains(&self.good_threshold) {
            return Err(CriticalPointError::invalid_option(
                "good_threshold",
                self.good_threshold,
                "must lie in [0, excellent_threshold]",
            ));
        }
        Ok(())
    }

    /// Qualitative label for a capture rate.
    pub fn label(&self, rate: f64) -> VerdictLabel {
        if rate >= self.excellent_threshold {
            VerdictLabel::Excellent
        } else if rate >= self.good_threshold {
            VerdictLabel::Good
        } else {
            VerdictLabel::Poor
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerdictLabel {
    Excellent,
    Good,
    Poor,
}

impl fmt::Display for VerdictLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Poor => "poor",
        };
        f.write_str(label)
    }
}

/// Captured/total counts for one class at the winning level.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ClassBreakdown {
    pub captured: usize,
    pub total: usize,
    pub rate: f64,
}

/// Summary of a convergence study at one reference tolerance.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConvergenceVerdict {
    /// Fidelity level with the highest capture rate (earliest on ties).
    pub best_level: u32,
    pub best_rate: f64,
    /// Known points captured at the best level.
    pub captured_count: usize,
    pub n_known: usize,
    pub tolerance_fraction: f64,
    /// `tolerance_fraction × domain_diameter`.
    pub tolerance_value: f64,
    /// Per-class breakdown at the best level; `None` for classes with no known points.
    pub class_breakdown: PerClass<Option<ClassBreakdown>>,
    /// `(level, rate)` for every input level, in input order.
    pub trend: Vec<(u32, f64)>,
    pub label: VerdictLabel,
}

impl ConvergenceVerdict {
    /// Change in capture rate from the first to the last level.
    pub fn improvement(&self) -> f64 {
        match (self.trend.first(), self.trend.last()) {
            (Some((_, first)), Some((_, last))) => last - first,
            _ => 0.0,
        }
    }

    /// Whether the best level reached at least [`VerdictLabel::Good`].
    pub fn is_passing(&self) -> bool {
        self.label != VerdictLabel::Poor
    }
}

/// Selects the best fidelity level at the reference tolerance and labels it.
///
/// Every result must share the same tolerance list and the reference
/// fraction must be one of its entries.
pub fn assess_convergence(
    levels: &[(u32, CaptureResult)],
    options: &VerdictOptions,
) -> Result<ConvergenceVerdict> {
    options.validate()?;
    let Some((_, first)) = levels.first() else {
        return Err(CriticalPointError::empty("fidelity levels"));
    };
    for (level, result) in levels {
        if !first.same_tolerances(result) {
            return Err(CriticalPointError::ToleranceMismatch { level: *level });
        }
    }
    let t = first
        .tolerance_index(options.reference_fraction)
        .ok_or(CriticalPointError::UnknownReferenceFraction {
            fraction: options.reference_fraction,
        })?;

    let trend: Vec<(u32, f64)> = levels
        .iter()
        .map(|(level, result)| (*level, result.capture_rates[t]))
        .collect();

    let mut best_index = 0usize;
    for (index, (_, rate)) in trend.iter().enumerate() {
        if *rate > trend[best_index].1 {
            best_index = index;
        }
    }
    let (best_level, best) = &levels[best_index];
    let best_rate = best.capture_rates[t];

    let class_breakdown = best.class_counts.map(|class, total| {
        (*total > 0).then(|| {
            let captured = best.class_captured[class][t];
            ClassBreakdown {
                captured,
                total: *total,
                rate: captured as f64 / *total as f64,
            }
        })
    });

    let label = options.label(best_rate);
    debug!(
        "convergence verdict: best level {best_level} captures {best_rate:.3} at fraction {} ({label})",
        best.tolerance_fractions[t]
    );

    Ok(ConvergenceVerdict {
        best_level: *best_level,
        best_rate,
        captured_count: best.captured_count(t),
        n_known: best.n_known,
        tolerance_fraction: best.tolerance_fractions[t],
        tolerance_value: best.tolerance_values[t],
        class_breakdown,
        trend,
        label,
    })
}
