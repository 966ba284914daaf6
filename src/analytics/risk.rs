//! Composite risk metrics derived from a slope field.
//!
//! Summarizes the gradient of a surface into scalar steepness measures,
//! extreme-cell listings, and a bounded composite score.

use serde::{Deserialize, Serialize};

use crate::surface::SlopeField;

/// Cap on reported high-risk and flat zones.
const MAX_ZONES: usize = 10;
/// Fraction of the max magnitude that marks a cell high-risk.
const HIGH_RISK_FRACTION: f64 = 0.7;
/// Fraction of the max magnitude below which a cell counts as flat.
const FLAT_FRACTION: f64 = 0.1;

/// One grid cell singled out by magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskZone {
    pub xi: usize,
    pub yi: usize,
    pub magnitude: f64,
}

/// Summary statistics over a slope field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub max_slope: f64,
    pub avg_slope: f64,
    /// `E[m²] − E[m]²` over the magnitude field.
    pub slope_variance: f64,
    /// Fraction of cells with positive ∂z/∂y, in `[0, 1]`.
    pub upward_bias: f64,
    /// Mean ∂z/∂x (signed).
    pub term_structure_steepness: f64,
    /// Mean |∂z/∂y| (nonnegative).
    pub smile_steepness: f64,
    /// Up to 10 cells with magnitude ≥ 0.7·max, sorted descending.
    pub high_risk_zones: Vec<RiskZone>,
    /// Up to 10 cells with magnitude ≤ 0.1·max, in grid order.
    pub flat_zones: Vec<RiskZone>,
    /// Composite score in `[0, 1]`.
    pub risk_score: f64,
}

/// Derive [`RiskMetrics`] from a slope field.
///
/// The composite score is
/// `0.4·min(1, max/2) + 0.3·min(1, √var/0.5) + 0.3·min(1, |tss|/0.5)`,
/// clamped to `[0, 1]`; an identically-zero field scores 0.
pub fn risk_metrics(field: &SlopeField) -> RiskMetrics {
    let n = field.len();
    if n == 0 {
        return RiskMetrics {
            max_slope: 0.0,
            avg_slope: 0.0,
            slope_variance: 0.0,
            upward_bias: 0.0,
            term_structure_steepness: 0.0,
            smile_steepness: 0.0,
            high_risk_zones: Vec::new(),
            flat_zones: Vec::new(),
            risk_score: 0.0,
        };
    }
    let nf = n as f64;

    let mut max_slope = 0.0_f64;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut upward = 0usize;
    let mut sum_dx = 0.0;
    let mut sum_abs_dy = 0.0;

    for i in 0..n {
        let m = field.magnitude[i];
        if m > max_slope {
            max_slope = m;
        }
        sum += m;
        sum_sq += m * m;
        if field.dz_dy[i] > 0.0 {
            upward += 1;
        }
        sum_dx += field.dz_dx[i];
        sum_abs_dy += field.dz_dy[i].abs();
    }

    let avg_slope = sum / nf;
    let slope_variance = (sum_sq / nf - avg_slope * avg_slope).max(0.0);
    let upward_bias = upward as f64 / nf;
    let term_structure_steepness = sum_dx / nf;
    let smile_steepness = sum_abs_dy / nf;

    let mut high_risk_zones = Vec::new();
    let mut flat_zones = Vec::new();
    if max_slope > 0.0 {
        let high_cut = HIGH_RISK_FRACTION * max_slope;
        let flat_cut = FLAT_FRACTION * max_slope;
        for xi in 0..field.nx {
            for yi in 0..field.ny {
                let m = field.magnitude[xi * field.ny + yi];
                if m >= high_cut {
                    high_risk_zones.push(RiskZone { xi, yi, magnitude: m });
                } else if m <= flat_cut && flat_zones.len() < MAX_ZONES {
                    flat_zones.push(RiskZone { xi, yi, magnitude: m });
                }
            }
        }
        high_risk_zones.sort_by(|a, b| {
            b.magnitude
                .partial_cmp(&a.magnitude)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        high_risk_zones.truncate(MAX_ZONES);
    }

    let risk_score = (0.4 * (max_slope / 2.0).min(1.0)
        + 0.3 * (slope_variance.sqrt() / 0.5).min(1.0)
        + 0.3 * (term_structure_steepness.abs() / 0.5).min(1.0))
    .clamp(0.0, 1.0);

    RiskMetrics {
        max_slope,
        avg_slope,
        slope_variance,
        upward_bias,
        term_structure_steepness,
        smile_steepness,
        high_risk_zones,
        flat_zones,
        risk_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{compute_slope, AxisLabels, Surface};
    use approx::assert_abs_diff_eq;

    fn field_of(surface: &Surface) -> SlopeField {
        compute_slope(surface)
    }

    fn zero_field() -> SlopeField {
        let s = Surface::new(
            vec![0.0, 1.0, 2.0],
            vec![0.0, 1.0, 2.0],
            vec![0.5; 9],
            AxisLabels::default(),
        )
        .unwrap();
        field_of(&s)
    }

    #[test]
    fn zero_field_scores_zero() {
        let metrics = risk_metrics(&zero_field());
        assert_eq!(metrics.risk_score, 0.0);
        assert_eq!(metrics.max_slope, 0.0);
        assert_eq!(metrics.avg_slope, 0.0);
        assert_eq!(metrics.slope_variance, 0.0);
        assert_eq!(metrics.upward_bias, 0.0);
        assert!(metrics.high_risk_zones.is_empty());
        assert!(metrics.flat_zones.is_empty());
    }

    #[test]
    fn planar_field_known_metrics() {
        // z = x + 2y: dz_dx = 1, dz_dy = 2 everywhere
        let s = Surface::from_fn(
            vec![0.0, 1.0, 2.0],
            vec![0.0, 1.0, 2.0],
            AxisLabels::default(),
            |x, y| x + 2.0 * y,
        )
        .unwrap();
        let metrics = risk_metrics(&field_of(&s));
        let mag = (5.0_f64).sqrt();
        assert_abs_diff_eq!(metrics.max_slope, mag, epsilon = 1e-12);
        assert_abs_diff_eq!(metrics.avg_slope, mag, epsilon = 1e-12);
        assert_abs_diff_eq!(metrics.slope_variance, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(metrics.upward_bias, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(metrics.term_structure_steepness, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(metrics.smile_steepness, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn risk_score_saturates_on_steep_uneven_field() {
        // z = 100x² over x ∈ {0,1,2}: magnitudes {100, 200, 300}, so the
        // max, variance, and steepness terms all hit their caps.
        let s = Surface::from_fn(
            vec![0.0, 1.0, 2.0],
            vec![0.0, 1.0],
            AxisLabels::default(),
            |x, _| 100.0 * x * x,
        )
        .unwrap();
        let metrics = risk_metrics(&field_of(&s));
        assert!(metrics.risk_score >= 0.0 && metrics.risk_score <= 1.0);
        assert_abs_diff_eq!(metrics.risk_score, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn uniform_steep_field_scores_without_variance_term() {
        // Constant gradient: max and steepness saturate, variance is zero.
        let s = Surface::from_fn(
            vec![0.0, 1.0],
            vec![0.0, 1.0],
            AxisLabels::default(),
            |x, y| 100.0 * x - 50.0 * y,
        )
        .unwrap();
        let metrics = risk_metrics(&field_of(&s));
        assert_abs_diff_eq!(metrics.risk_score, 0.7, epsilon = 1e-12);
    }

    #[test]
    fn high_risk_zones_sorted_and_capped() {
        // One steep ridge in an otherwise gentle surface
        let s = Surface::from_fn(
            crate::grid::linspace(0.0, 1.0, 8).unwrap(),
            crate::grid::linspace(0.0, 1.0, 8).unwrap(),
            AxisLabels::default(),
            |x, y| if x > 0.5 { 10.0 * x } else { 0.1 * y },
        )
        .unwrap();
        let metrics = risk_metrics(&field_of(&s));
        assert!(metrics.high_risk_zones.len() <= 10);
        assert!(!metrics.high_risk_zones.is_empty());
        for pair in metrics.high_risk_zones.windows(2) {
            assert!(pair[0].magnitude >= pair[1].magnitude);
        }
        for zone in &metrics.high_risk_zones {
            assert!(zone.magnitude >= 0.7 * metrics.max_slope);
        }
    }

    #[test]
    fn flat_zones_capped_at_ten() {
        // Mostly flat with one spike: nearly every cell qualifies as flat
        let s = Surface::from_fn(
            crate::grid::linspace(0.0, 1.0, 10).unwrap(),
            crate::grid::linspace(0.0, 1.0, 10).unwrap(),
            AxisLabels::default(),
            |x, y| {
                if x > 0.8 && y > 0.8 {
                    5.0
                } else {
                    0.0
                }
            },
        )
        .unwrap();
        let metrics = risk_metrics(&field_of(&s));
        assert!(metrics.flat_zones.len() <= 10);
        assert!(!metrics.flat_zones.is_empty());
        for zone in &metrics.flat_zones {
            assert!(zone.magnitude <= 0.1 * metrics.max_slope);
        }
    }

    #[test]
    fn upward_bias_counts_positive_dz_dy() {
        // dz_dy > 0 on the left half of y, < 0 on the right half
        let s = Surface::from_fn(
            vec![0.0, 1.0],
            crate::grid::linspace(-1.0, 1.0, 9).unwrap(),
            AxisLabels::default(),
            |_, y| -(y * y),
        )
        .unwrap();
        let metrics = risk_metrics(&field_of(&s));
        assert!(metrics.upward_bias > 0.0 && metrics.upward_bias < 1.0);
    }

    #[test]
    fn serde_round_trip() {
        let s = Surface::from_fn(
            vec![0.0, 1.0, 2.0],
            vec![0.0, 1.0, 2.0],
            AxisLabels::default(),
            |x, y| x * y,
        )
        .unwrap();
        let metrics = risk_metrics(&field_of(&s));
        let json = serde_json::to_string(&metrics).unwrap();
        let back: RiskMetrics = serde_json::from_str(&json).unwrap();
        assert_eq!(metrics, back);
    }
}
