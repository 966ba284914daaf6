//! Static arbitrage checks on a volatility surface.
//!
//! The surface convention here is `x = expiry (years)`, `y = strike`,
//! `z = implied vol`. Three checks are provided:
//!
//! - *Calendar*: total variance `w = σ²·T` must be non-decreasing in
//!   expiry at every strike.
//! - *Butterfly*: the smile must be convex across neighboring strikes at
//!   each expiry.
//! - *Vertical*: with a forward price supplied, the slope of `w` against
//!   log-moneyness must stay within a band.
//!
//! Violations are data, not errors: checks return reports and never fail.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::surface::Surface;
use crate::types::Vol;

/// Default tolerance for calendar and butterfly checks.
pub const DEFAULT_TOLERANCE: f64 = 0.001;
/// Default band for the vertical (total-variance slope) check.
pub const DEFAULT_SLOPE_LIMIT: f64 = 2.0;

/// Which no-arbitrage condition a violation breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArbitrageKind {
    Calendar,
    Butterfly,
    Vertical,
}

/// Graded size of a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
}

impl Severity {
    /// Classify a violation magnitude by the per-kind thresholds.
    pub fn classify(kind: ArbitrageKind, magnitude: f64) -> Self {
        let (moderate, severe) = match kind {
            ArbitrageKind::Calendar => (0.005, 0.01),
            ArbitrageKind::Butterfly => (0.01, 0.02),
            ArbitrageKind::Vertical => (0.5, 1.0),
        };
        if magnitude >= severe {
            Severity::Severe
        } else if magnitude >= moderate {
            Severity::Moderate
        } else {
            Severity::Minor
        }
    }
}

/// A single arbitrage violation at a grid location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ArbitrageKind,
    pub severity: Severity,
    /// Expiry index (for calendar: the near expiry of the offending pair).
    pub xi: usize,
    /// Strike index (for butterfly: the non-convex midpoint).
    pub yi: usize,
    /// Expiry in years at `xi`.
    pub expiry: f64,
    /// Strike at `yi`.
    pub strike: f64,
    /// How far past the tolerance the condition is broken.
    pub magnitude: f64,
}

/// Aggregate report of all three checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageSummary {
    pub calendar_count: usize,
    pub butterfly_count: usize,
    pub vertical_count: usize,
    /// All violations, unsorted.
    pub violations: Vec<Violation>,
    pub is_free: bool,
}

/// Options for [`check_all_arbitrage`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageConfig {
    pub tolerance: f64,
    pub slope_limit: f64,
    /// Forward price enabling the vertical check.
    pub forward: Option<f64>,
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            slope_limit: DEFAULT_SLOPE_LIMIT,
            forward: None,
        }
    }
}

#[inline]
fn total_variance(iv: f64, t: f64) -> f64 {
    Vol(iv).total_variance(t).0
}

/// Calendar check: at every strike, `w(T₂) ≥ w(T₁) − tolerance` for each
/// consecutive expiry pair.
pub fn check_calendar(surface: &Surface, tolerance: f64) -> Vec<Violation> {
    let mut violations = Vec::new();
    let x = surface.x();
    for yi in 0..surface.ny() {
        for xi in 0..surface.nx().saturating_sub(1) {
            let w_near = total_variance(surface.value(xi, yi), x[xi]);
            let w_far = total_variance(surface.value(xi + 1, yi), x[xi + 1]);
            let deficit = w_near - w_far;
            if deficit > tolerance {
                violations.push(Violation {
                    kind: ArbitrageKind::Calendar,
                    severity: Severity::classify(ArbitrageKind::Calendar, deficit),
                    xi,
                    yi,
                    expiry: x[xi],
                    strike: surface.y()[yi],
                    magnitude: deficit,
                });
            }
        }
    }
    violations
}

/// Butterfly check: at every expiry, the smile must satisfy
/// `(σ(K₋) + σ(K₊))/2 − σ(K) ≥ −tolerance` at interior strikes.
pub fn check_butterfly(surface: &Surface, tolerance: f64) -> Vec<Violation> {
    let mut violations = Vec::new();
    for xi in 0..surface.nx() {
        for yi in 1..surface.ny().saturating_sub(1) {
            let convexity = (surface.value(xi, yi - 1) + surface.value(xi, yi + 1)) / 2.0
                - surface.value(xi, yi);
            if convexity < -tolerance {
                let magnitude = -convexity;
                violations.push(Violation {
                    kind: ArbitrageKind::Butterfly,
                    severity: Severity::classify(ArbitrageKind::Butterfly, magnitude),
                    xi,
                    yi,
                    expiry: surface.x()[xi],
                    strike: surface.y()[yi],
                    magnitude,
                });
            }
        }
    }
    violations
}

/// Vertical check: with a forward price, the slope of total variance
/// against log-moneyness `k = ln(K/F)` must stay within `±limit`.
pub fn check_vertical(surface: &Surface, forward: f64, limit: f64) -> Vec<Violation> {
    let mut violations = Vec::new();
    if forward <= 0.0 {
        return violations;
    }
    let y = surface.y();
    for xi in 0..surface.nx() {
        let t = surface.x()[xi];
        for yi in 0..surface.ny().saturating_sub(1) {
            let (k_lo, k_hi) = ((y[yi] / forward).ln(), (y[yi + 1] / forward).ln());
            if !(k_hi - k_lo).is_normal() {
                continue;
            }
            let w_lo = total_variance(surface.value(xi, yi), t);
            let w_hi = total_variance(surface.value(xi, yi + 1), t);
            let slope = (w_hi - w_lo) / (k_hi - k_lo);
            let excess = slope.abs() - limit;
            if excess > 0.0 {
                violations.push(Violation {
                    kind: ArbitrageKind::Vertical,
                    severity: Severity::classify(ArbitrageKind::Vertical, excess),
                    xi,
                    yi,
                    expiry: t,
                    strike: y[yi],
                    magnitude: excess,
                });
            }
        }
    }
    violations
}

/// Run all applicable checks and aggregate per-category counts.
///
/// The vertical check only runs when `config.forward` is supplied.
pub fn check_all_arbitrage(surface: &Surface, config: &ArbitrageConfig) -> ArbitrageSummary {
    let mut violations = check_calendar(surface, config.tolerance);
    let calendar_count = violations.len();

    let butterfly = check_butterfly(surface, config.tolerance);
    let butterfly_count = butterfly.len();
    violations.extend(butterfly);

    let vertical_count = match config.forward {
        Some(f) => {
            let vertical = check_vertical(surface, f, config.slope_limit);
            let n = vertical.len();
            violations.extend(vertical);
            n
        }
        None => 0,
    };

    let is_free = violations.is_empty();
    ArbitrageSummary {
        calendar_count,
        butterfly_count,
        vertical_count,
        violations,
        is_free,
    }
}

/// Result of [`enforce_arbitrage_free`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnforceOutcome {
    /// The repaired surface.
    pub surface: Surface,
    /// Repair sweeps performed.
    pub iterations: usize,
    /// Whether the surface came out clean within the iteration budget.
    pub arbitrage_free: bool,
}

/// Iteratively repair calendar and butterfly violations.
///
/// Each sweep nudges the far-dated point of every calendar violation up by
/// `√(violation / T_far) / 2` in vol space and replaces every butterfly
/// midpoint with the average of its strike neighbors, then re-checks.
/// Stops when the surface is clean or after `max_iter` sweeps.
///
/// # Errors
/// Propagates surface reconstruction failures (the axes are untouched, so
/// this only happens if the input surface was malformed).
pub fn enforce_arbitrage_free(
    surface: &Surface,
    max_iter: usize,
    tolerance: f64,
) -> crate::error::Result<EnforceOutcome> {
    let ny = surface.ny();
    let mut z = surface.z().to_vec();
    let mut iterations = 0;
    let mut clean = false;

    for iter in 0..max_iter {
        iterations = iter + 1;

        let working = Surface::with_meta(
            surface.x().to_vec(),
            surface.y().to_vec(),
            z.clone(),
            surface.meta().clone(),
        )?;

        let calendar = check_calendar(&working, tolerance);
        let butterfly = check_butterfly(&working, tolerance);
        if calendar.is_empty() && butterfly.is_empty() {
            clean = true;
            break;
        }

        for v in &calendar {
            let far_xi = v.xi + 1;
            let t_far = working.x()[far_xi];
            let idx = far_xi * ny + v.yi;
            z[idx] += (v.magnitude / t_far).sqrt() / 2.0;
        }
        for v in &butterfly {
            let idx = v.xi * ny + v.yi;
            z[idx] = (z[v.xi * ny + v.yi - 1] + z[v.xi * ny + v.yi + 1]) / 2.0;
        }
    }

    // One final check when the budget ran out mid-sweep.
    let repaired = Surface::with_meta(
        surface.x().to_vec(),
        surface.y().to_vec(),
        z,
        surface.meta().clone(),
    )?;
    if !clean {
        clean = check_calendar(&repaired, tolerance).is_empty()
            && check_butterfly(&repaired, tolerance).is_empty();
    }

    debug!(iterations, arbitrage_free = clean, "arbitrage enforcement finished");

    Ok(EnforceOutcome {
        surface: repaired,
        iterations,
        arbitrage_free: clean,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::AxisLabels;

    fn surface_from(x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> Surface {
        Surface::new(x, y, z, AxisLabels::default()).unwrap()
    }

    fn flat(iv: f64) -> Surface {
        surface_from(
            vec![0.25, 0.5, 1.0, 2.0],
            vec![80.0, 90.0, 100.0, 110.0, 120.0],
            vec![iv; 20],
        )
    }

    #[test]
    fn flat_surface_has_no_calendar_violations() {
        let summary = check_all_arbitrage(&flat(0.2), &ArbitrageConfig::default());
        assert_eq!(summary.calendar_count, 0);
        assert!(summary.is_free);
    }

    #[test]
    fn decreasing_variance_flags_calendar() {
        // w(1y) = 0.16, w(2y) = 0.01*2 = 0.02: clear decrease at every strike
        let s = surface_from(
            vec![1.0, 2.0],
            vec![90.0, 100.0, 110.0],
            vec![0.4, 0.4, 0.4, 0.1, 0.1, 0.1],
        );
        let violations = check_calendar(&s, DEFAULT_TOLERANCE);
        assert_eq!(violations.len(), 3);
        for v in &violations {
            assert_eq!(v.kind, ArbitrageKind::Calendar);
            assert_eq!(v.xi, 0);
            assert_eq!(v.severity, Severity::Severe);
            assert!((v.magnitude - 0.14).abs() < 1e-12);
        }
    }

    #[test]
    fn calendar_severity_thresholds() {
        assert_eq!(
            Severity::classify(ArbitrageKind::Calendar, 0.004),
            Severity::Minor
        );
        assert_eq!(
            Severity::classify(ArbitrageKind::Calendar, 0.007),
            Severity::Moderate
        );
        assert_eq!(
            Severity::classify(ArbitrageKind::Calendar, 0.02),
            Severity::Severe
        );
    }

    #[test]
    fn concave_smile_flags_butterfly() {
        // Middle strike vol pokes above the wing average by 0.05
        let s = surface_from(
            vec![1.0],
            vec![90.0, 100.0, 110.0],
            vec![0.2, 0.25, 0.2],
        );
        let violations = check_butterfly(&s, DEFAULT_TOLERANCE);
        assert_eq!(violations.len(), 1);
        let v = violations[0];
        assert_eq!(v.kind, ArbitrageKind::Butterfly);
        assert_eq!(v.yi, 1);
        assert!((v.magnitude - 0.05).abs() < 1e-12);
        assert_eq!(v.severity, Severity::Severe);
    }

    #[test]
    fn convex_smile_is_butterfly_clean() {
        let s = surface_from(
            vec![1.0],
            vec![90.0, 100.0, 110.0],
            vec![0.25, 0.2, 0.25],
        );
        assert!(check_butterfly(&s, DEFAULT_TOLERANCE).is_empty());
    }

    #[test]
    fn vertical_check_needs_forward() {
        // Steep variance jump across a narrow log-moneyness gap
        let s = surface_from(
            vec![1.0],
            vec![99.0, 100.0, 101.0],
            vec![0.2, 0.2, 0.9],
        );
        let summary = check_all_arbitrage(&s, &ArbitrageConfig::default());
        assert_eq!(summary.vertical_count, 0, "no forward, no vertical check");

        let with_forward = check_all_arbitrage(
            &s,
            &ArbitrageConfig {
                forward: Some(100.0),
                ..ArbitrageConfig::default()
            },
        );
        assert!(with_forward.vertical_count > 0);
        assert!(!with_forward.is_free);
    }

    #[test]
    fn summary_counts_match_violation_list() {
        let s = surface_from(
            vec![1.0, 2.0],
            vec![90.0, 100.0, 110.0],
            vec![0.4, 0.45, 0.4, 0.1, 0.1, 0.1],
        );
        let summary = check_all_arbitrage(&s, &ArbitrageConfig::default());
        assert_eq!(
            summary.violations.len(),
            summary.calendar_count + summary.butterfly_count + summary.vertical_count
        );
        assert!(!summary.is_free);
    }

    #[test]
    fn nan_cells_produce_no_violations() {
        let s = surface_from(
            vec![1.0, 2.0],
            vec![90.0, 100.0, 110.0],
            vec![f64::NAN; 6],
        );
        let summary = check_all_arbitrage(&s, &ArbitrageConfig::default());
        assert!(summary.is_free, "NaN comparisons must not flag violations");
    }

    #[test]
    fn enforce_repairs_calendar_violation() {
        let s = surface_from(
            vec![1.0, 2.0],
            vec![90.0, 100.0, 110.0],
            vec![0.4, 0.4, 0.4, 0.1, 0.1, 0.1],
        );
        let outcome = enforce_arbitrage_free(&s, 50, DEFAULT_TOLERANCE).unwrap();
        assert!(outcome.arbitrage_free, "should repair within 50 sweeps");
        let summary = check_all_arbitrage(&outcome.surface, &ArbitrageConfig::default());
        assert_eq!(summary.violations.len(), 0);
    }

    #[test]
    fn enforce_repairs_butterfly_violation() {
        let s = surface_from(
            vec![1.0],
            vec![90.0, 100.0, 110.0],
            vec![0.2, 0.3, 0.2],
        );
        let outcome = enforce_arbitrage_free(&s, 20, DEFAULT_TOLERANCE).unwrap();
        assert!(outcome.arbitrage_free);
        // Midpoint pulled to the neighbor average
        assert!((outcome.surface.value(0, 1) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn enforce_is_idempotent_on_clean_surface() {
        let s = flat(0.2);
        let outcome = enforce_arbitrage_free(&s, 10, DEFAULT_TOLERANCE).unwrap();
        assert!(outcome.arbitrage_free);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.surface.z(), s.z());
    }

    #[test]
    fn enforce_reports_exhausted_budget() {
        let s = surface_from(
            vec![1.0, 2.0],
            vec![90.0, 100.0, 110.0],
            vec![0.9, 0.9, 0.9, 0.01, 0.01, 0.01],
        );
        let outcome = enforce_arbitrage_free(&s, 1, DEFAULT_TOLERANCE).unwrap();
        assert_eq!(outcome.iterations, 1);
        // One sweep is not enough for this gap
        assert!(!outcome.arbitrage_free);
    }
}
