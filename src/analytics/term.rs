//! Term-structure and smile analyses, plus lenient opportunity detection.
//!
//! These read the surface with the same convention as the arbitrage checks:
//! `x = expiry (years)`, `y = strike`, `z = implied vol`. Unlike the strict
//! checks, the opportunity scan uses loose thresholds and grades each hit
//! with a profit estimate and a confidence.

use serde::{Deserialize, Serialize};

use crate::surface::Surface;

/// Hysteresis applied when deciding smile skew direction.
const SKEW_HYSTERESIS: f64 = 0.01;
/// Lenient calendar trigger: near vol must exceed far vol by this ratio.
const CALENDAR_RATIO: f64 = 1.1;
/// Lenient butterfly trigger: convexity more negative than this.
const BUTTERFLY_CONVEXITY: f64 = -0.01;

/// Which way a smile leans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkewDirection {
    /// Put wing richer than call wing.
    Put,
    /// Call wing richer than put wing.
    Call,
    Neutral,
}

/// Vol against expiry at a fixed strike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermCurve {
    pub strike_index: usize,
    pub strike: f64,
    pub expiries: Vec<f64>,
    pub vols: Vec<f64>,
    /// Curve positions where the discrete second derivative changes sign.
    pub inflection_points: Vec<usize>,
}

/// Term-structure summary over a set of strike columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermStructureAnalysis {
    pub curves: Vec<TermCurve>,
    /// `IV_near < IV_far` on the central curve.
    pub contango: bool,
    /// `IV_near > IV_far` on the central curve.
    pub backwardation: bool,
    /// `1 − |near − far| / max(near, far)` on the central curve.
    pub flatness: f64,
}

/// Vol against strike at a fixed expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmileCurve {
    pub expiry_index: usize,
    pub expiry: f64,
    pub strikes: Vec<f64>,
    pub vols: Vec<f64>,
    pub skew_direction: SkewDirection,
    /// `(left_wing + right_wing)/2 − atm`.
    pub butterfly_spread: f64,
    pub inflection_points: Vec<usize>,
}

/// Smile summary over a set of expiry rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmileAnalysis {
    pub curves: Vec<SmileCurve>,
}

/// Kind of lenient opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityKind {
    Calendar,
    Butterfly,
}

/// A candidate mispricing with a profit estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub kind: OpportunityKind,
    pub xi: usize,
    pub yi: usize,
    pub expiry: f64,
    pub strike: f64,
    /// Estimated edge in vol points.
    pub profit: f64,
    /// In `(0, 1]`.
    pub confidence: f64,
}

/// Evenly spread representative indices over an axis of length `n`.
///
/// Always includes both endpoints; interior picks land on quartiles.
pub fn default_indices(n: usize) -> Vec<usize> {
    if n <= 1 {
        return vec![0];
    }
    let mut picks = vec![0, n / 4, n / 2, 3 * n / 4, n - 1];
    picks.dedup();
    picks
}

/// Sign changes of the discrete second derivative along a curve.
fn inflection_points(values: &[f64]) -> Vec<usize> {
    let n = values.len();
    if n < 4 {
        return Vec::new();
    }
    let second: Vec<f64> = (1..n - 1)
        .map(|i| values[i - 1] - 2.0 * values[i] + values[i + 1])
        .collect();
    let mut points = Vec::new();
    for i in 1..second.len() {
        if second[i - 1] * second[i] < 0.0 {
            // Index in curve coordinates of the sign flip
            points.push(i + 1);
        }
    }
    points
}

/// Analyze term structure along the given strike columns.
///
/// `contango`, `backwardation`, and `flatness` are computed on the central
/// curve of the selection. Empty or out-of-range selections fall back to
/// [`default_indices`].
pub fn analyze_term_structure(surface: &Surface, strike_indices: &[usize]) -> TermStructureAnalysis {
    let ny = surface.ny();
    let indices: Vec<usize> = {
        let picked: Vec<usize> = strike_indices.iter().copied().filter(|&i| i < ny).collect();
        if picked.is_empty() {
            default_indices(ny)
        } else {
            picked
        }
    };

    let curves: Vec<TermCurve> = indices
        .iter()
        .map(|&yi| {
            let vols: Vec<f64> = (0..surface.nx()).map(|xi| surface.value(xi, yi)).collect();
            TermCurve {
                strike_index: yi,
                strike: surface.y()[yi],
                expiries: surface.x().to_vec(),
                inflection_points: inflection_points(&vols),
                vols,
            }
        })
        .collect();

    let central = &curves[curves.len() / 2];
    let near = central.vols[0];
    let far = central.vols[central.vols.len() - 1];
    let contango = near < far;
    let backwardation = near > far;
    let flatness = if near.max(far) > 0.0 {
        1.0 - (near - far).abs() / near.max(far)
    } else {
        1.0
    };

    TermStructureAnalysis {
        curves,
        contango,
        backwardation,
        flatness,
    }
}

/// Analyze smiles along the given expiry rows.
///
/// Skew direction compares the wing vols with a 0.01 hysteresis; the
/// butterfly spread uses the central strike as ATM.
pub fn analyze_smiles(surface: &Surface, expiry_indices: &[usize]) -> SmileAnalysis {
    let nx = surface.nx();
    let indices: Vec<usize> = {
        let picked: Vec<usize> = expiry_indices.iter().copied().filter(|&i| i < nx).collect();
        if picked.is_empty() {
            default_indices(nx)
        } else {
            picked
        }
    };

    let curves = indices
        .iter()
        .map(|&xi| {
            let vols: Vec<f64> = (0..surface.ny()).map(|yi| surface.value(xi, yi)).collect();
            let left = vols[0];
            let right = vols[vols.len() - 1];
            let atm = vols[vols.len() / 2];
            let skew_direction = if left > right + SKEW_HYSTERESIS {
                SkewDirection::Put
            } else if right > left + SKEW_HYSTERESIS {
                SkewDirection::Call
            } else {
                SkewDirection::Neutral
            };
            SmileCurve {
                expiry_index: xi,
                expiry: surface.x()[xi],
                strikes: surface.y().to_vec(),
                skew_direction,
                butterfly_spread: (left + right) / 2.0 - atm,
                inflection_points: inflection_points(&vols),
                vols,
            }
        })
        .collect();

    SmileAnalysis { curves }
}

/// Lenient opportunity scan, distinct from the strict arbitrage checks.
///
/// Calendar hits fire when `IV_near > 1.1·IV_far` for a consecutive expiry
/// pair; butterfly hits when smile convexity drops below −0.01. Results are
/// sorted by `profit` descending.
pub fn find_opportunities(surface: &Surface) -> Vec<Opportunity> {
    let mut out = Vec::new();
    let x = surface.x();
    let y = surface.y();

    for yi in 0..surface.ny() {
        for xi in 0..surface.nx().saturating_sub(1) {
            let near = surface.value(xi, yi);
            let far = surface.value(xi + 1, yi);
            if far > 0.0 && near > CALENDAR_RATIO * far {
                let ratio = near / far;
                out.push(Opportunity {
                    kind: OpportunityKind::Calendar,
                    xi,
                    yi,
                    expiry: x[xi],
                    strike: y[yi],
                    profit: near - far,
                    confidence: (1.0 - CALENDAR_RATIO / ratio).min(1.0),
                });
            }
        }
    }

    for xi in 0..surface.nx() {
        for yi in 1..surface.ny().saturating_sub(1) {
            let convexity = (surface.value(xi, yi - 1) + surface.value(xi, yi + 1)) / 2.0
                - surface.value(xi, yi);
            if convexity < BUTTERFLY_CONVEXITY {
                out.push(Opportunity {
                    kind: OpportunityKind::Butterfly,
                    xi,
                    yi,
                    expiry: x[xi],
                    strike: y[yi],
                    profit: -convexity,
                    confidence: (-convexity / 0.05).clamp(0.0, 1.0).max(f64::MIN_POSITIVE),
                });
            }
        }
    }

    out.sort_by(|a, b| {
        b.profit
            .partial_cmp(&a.profit)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::AxisLabels;
    use approx::assert_abs_diff_eq;

    fn surface_from(x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> Surface {
        Surface::new(x, y, z, AxisLabels::default()).unwrap()
    }

    #[test]
    fn default_indices_cover_endpoints() {
        assert_eq!(default_indices(1), vec![0]);
        let picks = default_indices(9);
        assert_eq!(picks.first(), Some(&0));
        assert_eq!(picks.last(), Some(&8));
    }

    #[test]
    fn rising_term_structure_is_contango() {
        // Vol increases with expiry at every strike
        let s = surface_from(
            vec![0.25, 0.5, 1.0],
            vec![90.0, 100.0, 110.0],
            vec![0.15, 0.15, 0.15, 0.18, 0.18, 0.18, 0.22, 0.22, 0.22],
        );
        let analysis = analyze_term_structure(&s, &[0, 1, 2]);
        assert!(analysis.contango);
        assert!(!analysis.backwardation);
        assert_abs_diff_eq!(analysis.flatness, 1.0 - 0.07 / 0.22, epsilon = 1e-12);
    }

    #[test]
    fn falling_term_structure_is_backwardation() {
        let s = surface_from(
            vec![0.25, 1.0],
            vec![90.0, 100.0, 110.0],
            vec![0.3, 0.3, 0.3, 0.2, 0.2, 0.2],
        );
        let analysis = analyze_term_structure(&s, &[1]);
        assert!(analysis.backwardation);
        assert!(!analysis.contango);
    }

    #[test]
    fn flat_curve_is_neither() {
        let s = surface_from(
            vec![0.25, 1.0],
            vec![90.0, 100.0],
            vec![0.2, 0.2, 0.2, 0.2],
        );
        let analysis = analyze_term_structure(&s, &[0]);
        assert!(!analysis.contango);
        assert!(!analysis.backwardation);
        assert_abs_diff_eq!(analysis.flatness, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn out_of_range_selection_falls_back() {
        let s = surface_from(
            vec![0.25, 1.0],
            vec![90.0, 100.0],
            vec![0.2, 0.2, 0.2, 0.2],
        );
        let analysis = analyze_term_structure(&s, &[99]);
        assert!(!analysis.curves.is_empty());
    }

    #[test]
    fn inflection_points_detect_sign_change() {
        // Convex then concave: second derivative flips sign once
        let vols = [0.3, 0.2, 0.16, 0.18, 0.26, 0.3, 0.28];
        let points = inflection_points(&vols);
        assert!(!points.is_empty());
        for &p in &points {
            assert!(p >= 2 && p < vols.len());
        }
    }

    #[test]
    fn no_inflection_on_straight_line() {
        let vols = [0.1, 0.2, 0.3, 0.4, 0.5];
        assert!(inflection_points(&vols).is_empty());
    }

    #[test]
    fn put_skew_detected() {
        let s = surface_from(
            vec![1.0],
            vec![80.0, 90.0, 100.0, 110.0, 120.0],
            vec![0.30, 0.25, 0.20, 0.19, 0.185],
        );
        let analysis = analyze_smiles(&s, &[0]);
        let curve = &analysis.curves[0];
        assert_eq!(curve.skew_direction, SkewDirection::Put);
        assert_abs_diff_eq!(
            curve.butterfly_spread,
            (0.30 + 0.185) / 2.0 - 0.20,
            epsilon = 1e-12
        );
    }

    #[test]
    fn call_skew_detected() {
        let s = surface_from(
            vec![1.0],
            vec![80.0, 100.0, 120.0],
            vec![0.18, 0.20, 0.30],
        );
        let analysis = analyze_smiles(&s, &[0]);
        assert_eq!(analysis.curves[0].skew_direction, SkewDirection::Call);
    }

    #[test]
    fn near_symmetric_smile_is_neutral() {
        // Wings differ by less than the hysteresis
        let s = surface_from(
            vec![1.0],
            vec![80.0, 100.0, 120.0],
            vec![0.25, 0.20, 0.255],
        );
        let analysis = analyze_smiles(&s, &[0]);
        assert_eq!(analysis.curves[0].skew_direction, SkewDirection::Neutral);
    }

    #[test]
    fn calendar_opportunity_fires_on_rich_near_vol() {
        // near = 0.3 > 1.1 * 0.2
        let s = surface_from(
            vec![0.25, 1.0],
            vec![100.0],
            vec![0.3, 0.2],
        );
        let opps = find_opportunities(&s);
        assert_eq!(opps.len(), 1);
        let o = opps[0];
        assert_eq!(o.kind, OpportunityKind::Calendar);
        assert_abs_diff_eq!(o.profit, 0.1, epsilon = 1e-12);
        assert!(o.confidence > 0.0 && o.confidence <= 1.0);
    }

    #[test]
    fn calendar_opportunity_respects_ratio_threshold() {
        // near = 0.21 < 1.1 * 0.2: no hit even though near > far
        let s = surface_from(vec![0.25, 1.0], vec![100.0], vec![0.21, 0.2]);
        assert!(find_opportunities(&s).is_empty());
    }

    #[test]
    fn butterfly_opportunity_fires_on_negative_convexity() {
        let s = surface_from(
            vec![1.0],
            vec![90.0, 100.0, 110.0],
            vec![0.2, 0.25, 0.2],
        );
        let opps = find_opportunities(&s);
        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].kind, OpportunityKind::Butterfly);
        assert_abs_diff_eq!(opps[0].profit, 0.05, epsilon = 1e-12);
        assert!(opps[0].confidence > 0.0 && opps[0].confidence <= 1.0);
    }

    #[test]
    fn opportunities_sorted_by_profit_desc() {
        let s = surface_from(
            vec![0.25, 1.0],
            vec![90.0, 100.0, 110.0],
            // calendar gaps of different sizes plus a butterfly kink
            vec![0.50, 0.30, 0.26, 0.20, 0.20, 0.20],
        );
        let opps = find_opportunities(&s);
        assert!(opps.len() >= 2);
        for pair in opps.windows(2) {
            assert!(pair[0].profit >= pair[1].profit);
        }
    }
}
