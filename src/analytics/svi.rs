//! SVI (Stochastic Volatility Inspired) smile model.
//!
//! The raw SVI parameterization models total implied variance as:
//!
//! ```text
//! w(k) = a + b·[ρ(k − m) + √((k − m)² + σ²)]
//! ```
//!
//! where `k = ln(K/F)` is log-moneyness and `(a, b, ρ, m, σ)` are the five
//! SVI parameters.
//!
//! # References
//! - Gatheral, J. "The Volatility Surface: A Practitioner's Guide" (2006)
//! - Zeliade Systems, "Quasi-Explicit Calibration of Gatheral's SVI Model" (2009)

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MarigraphError;
use crate::types::Vol;
use crate::validate::{validate_finite, validate_positive};

/// Lower bound on the slope parameter `b` during calibration.
pub const MIN_B: f64 = 0.001;
/// Lower bound on the curvature parameter `σ` during calibration.
pub const MIN_SIGMA: f64 = 0.001;
/// Open bound on `|ρ|` during calibration.
pub const MAX_RHO: f64 = 0.99;

/// Raw SVI smile parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SviParamsRaw", into = "SviParamsRaw")]
pub struct SviParams {
    /// Minimum variance level.
    a: f64,
    /// Variance slope (controls skew magnitude).
    b: f64,
    /// Skew direction, `|ρ| < 0.99`.
    rho: f64,
    /// Moneyness shift.
    m: f64,
    /// Curvature (smile convexity).
    sigma: f64,
}

#[derive(Serialize, Deserialize)]
struct SviParamsRaw {
    a: f64,
    b: f64,
    rho: f64,
    m: f64,
    sigma: f64,
}

impl TryFrom<SviParamsRaw> for SviParams {
    type Error = MarigraphError;
    fn try_from(raw: SviParamsRaw) -> Result<Self, Self::Error> {
        Self::new(raw.a, raw.b, raw.rho, raw.m, raw.sigma)
    }
}

impl From<SviParams> for SviParamsRaw {
    fn from(p: SviParams) -> Self {
        Self {
            a: p.a,
            b: p.b,
            rho: p.rho,
            m: p.m,
            sigma: p.sigma,
        }
    }
}

impl SviParams {
    /// Create SVI parameters, enforcing the calibration constraints
    /// `b ≥ 0.001`, `σ ≥ 0.001`, `|ρ| < 0.99`, and finite `a`, `m`.
    ///
    /// # Errors
    /// Returns [`MarigraphError::InvalidInput`] on any violated constraint.
    pub fn new(a: f64, b: f64, rho: f64, m: f64, sigma: f64) -> crate::error::Result<Self> {
        validate_finite(a, "a")?;
        validate_finite(m, "m")?;
        if !(b.is_finite() && b >= MIN_B) {
            return Err(MarigraphError::InvalidInput {
                message: format!("b must be >= {MIN_B}, got {b}"),
            });
        }
        if !(rho.is_finite() && rho.abs() < MAX_RHO) {
            return Err(MarigraphError::InvalidInput {
                message: format!("|rho| must be < {MAX_RHO}, got {rho}"),
            });
        }
        if !(sigma.is_finite() && sigma >= MIN_SIGMA) {
            return Err(MarigraphError::InvalidInput {
                message: format!("sigma must be >= {MIN_SIGMA}, got {sigma}"),
            });
        }
        Ok(Self { a, b, rho, m, sigma })
    }

    pub fn a(&self) -> f64 {
        self.a
    }

    pub fn b(&self) -> f64 {
        self.b
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    pub fn m(&self) -> f64 {
        self.m
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Total variance `w(k) = a + b·[ρ(k − m) + √((k − m)² + σ²)]`.
    pub fn total_variance(&self, k: f64) -> f64 {
        let dk = k - self.m;
        self.a + self.b * (self.rho * dk + (dk * dk + self.sigma * self.sigma).sqrt())
    }

    /// Implied volatility `√(w(k)/T)` for `T > 0` and `w ≥ 0`; otherwise 0.
    pub fn implied_vol(&self, k: f64, expiry: f64) -> Vol {
        if expiry <= 0.0 {
            return Vol(0.0);
        }
        let w = self.total_variance(k);
        if w < 0.0 {
            return Vol(0.0);
        }
        Vol((w / expiry).sqrt())
    }

    /// First derivative `w'(k) = b·[ρ + (k−m)/√((k−m)² + σ²)]`.
    pub fn w_prime(&self, k: f64) -> f64 {
        let dk = k - self.m;
        let r = (dk * dk + self.sigma * self.sigma).sqrt();
        self.b * (self.rho + dk / r)
    }

    /// Second derivative `w''(k) = b·σ²/((k−m)² + σ²)^(3/2)`.
    pub fn w_double_prime(&self, k: f64) -> f64 {
        let dk = k - self.m;
        let r2 = dk * dk + self.sigma * self.sigma;
        self.b * self.sigma * self.sigma / (r2 * r2.sqrt())
    }
}

/// One market observation for calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SviSample {
    /// Log-moneyness `k = ln(K/F)`.
    pub k: f64,
    /// Observed implied volatility.
    pub iv: f64,
    /// Relative weight of this observation (must be positive).
    pub weight: f64,
}

/// Calibration stopping criteria.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Outer-iteration budget.
    pub max_iter: usize,
    /// Early stop once relative RMSE improvement drops below this.
    pub tolerance: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            max_iter: 300,
            tolerance: 1e-9,
        }
    }
}

/// Outcome of a calibration run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SviFit {
    pub params: SviParams,
    /// Weighted RMS error in total-variance space.
    pub rmse: f64,
    /// Outer iterations performed.
    pub iterations: usize,
}

/// Calibrate SVI parameters to weighted `(k, iv)` observations.
///
/// Minimizes the weighted squared total-variance error using the
/// quasi-explicit scheme: for fixed `(m, σ)` the remaining parameters
/// `(a, b·ρ, b)` enter linearly and are solved by weighted least squares;
/// a grid search plus Nelder-Mead optimizes `(m, σ)`. Early stop on
/// relative RMSE improvement below `config.tolerance` or after
/// `config.max_iter` iterations.
///
/// # Errors
/// Returns [`MarigraphError::InvalidInput`] for bad samples and
/// [`MarigraphError::CalibrationError`] when no admissible parameters exist.
pub fn calibrate(
    samples: &[SviSample],
    expiry: f64,
    config: &CalibrationConfig,
) -> crate::error::Result<SviFit> {
    /// Minimum observations for a 5-parameter fit.
    const MIN_POINTS: usize = 5;
    /// Grid search resolution for (m, sigma) initialization.
    const GRID_N: usize = 15;

    validate_positive(expiry, "expiry")?;
    if samples.len() < MIN_POINTS {
        return Err(MarigraphError::InvalidInput {
            message: format!(
                "at least {MIN_POINTS} samples required, got {}",
                samples.len()
            ),
        });
    }
    for s in samples {
        validate_finite(s.k, "sample k")?;
        validate_positive(s.iv, "sample iv")?;
        validate_positive(s.weight, "sample weight")?;
    }

    debug!(n_samples = samples.len(), expiry, "SVI calibration started");

    let k_vals: Vec<f64> = samples.iter().map(|s| s.k).collect();
    let w_vals: Vec<f64> = samples.iter().map(|s| s.iv * s.iv * expiry).collect();
    let weights: Vec<f64> = samples.iter().map(|s| s.weight).collect();
    let weight_sum: f64 = weights.iter().sum();

    let k_min = k_vals.iter().cloned().fold(f64::INFINITY, f64::min);
    let k_max = k_vals.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let k_range = (k_max - k_min).max(0.1);

    // Inner weighted linear solve: for fixed (m, sigma), find (a, b*rho, b).
    // Rows are scaled by sqrt(weight) so the normal equations minimize the
    // weighted RSS.
    let inner_solve = |m: f64, sigma: f64| -> Option<(f64, f64, f64, f64)> {
        let n = k_vals.len();
        let a_mat = DMatrix::<f64>::from_fn(n, 3, |i, j| {
            let sw = weights[i].sqrt();
            let dk = k_vals[i] - m;
            sw * match j {
                0 => 1.0,
                1 => dk,
                2 => (dk * dk + sigma * sigma).sqrt(),
                _ => unreachable!(),
            }
        });
        let b_vec = DVector::from_fn(n, |i, _| weights[i].sqrt() * w_vals[i]);

        let ata = a_mat.transpose() * &a_mat;
        let atb = a_mat.transpose() * &b_vec;
        let x = ata.qr().solve(&atb)?;

        let residual = &a_mat * &x - &b_vec;
        let rss = residual.dot(&residual);
        Some((x[0], x[1], x[2], rss)) // (a, b_rho, b, weighted rss)
    };

    // Objective: weighted RSS with an inadmissibility penalty.
    let objective = |m: f64, sigma: f64| -> f64 {
        if sigma < MIN_SIGMA {
            return f64::MAX;
        }
        match inner_solve(m, sigma) {
            None => f64::MAX,
            Some((a, b_rho, b, rss)) => {
                if b < -1e-10 || !a.is_finite() {
                    return f64::MAX;
                }
                let b_clamped = b.max(MIN_B);
                let rho = (b_rho / b_clamped).clamp(-MAX_RHO, MAX_RHO);
                let min_var = a + b_clamped * sigma * (1.0 - rho * rho).sqrt();
                if min_var < -1e-10 {
                    return f64::MAX;
                }
                rss
            }
        }
    };

    // Grid search for a starting point
    let m_lo = k_min - 0.5 * k_range;
    let m_hi = k_max + 0.5 * k_range;
    let sigma_lo = 0.01_f64;
    let sigma_hi = k_range.max(0.5);

    let mut best_m = 0.0;
    let mut best_sigma = 0.1;
    let mut best_rss = f64::MAX;

    for im in 0..GRID_N {
        let m = m_lo + (m_hi - m_lo) * (im as f64) / ((GRID_N - 1) as f64);
        for is in 0..GRID_N {
            let sigma = sigma_lo + (sigma_hi - sigma_lo) * (is as f64) / ((GRID_N - 1) as f64);
            let rss = objective(m, sigma);
            if rss < best_rss {
                best_rss = rss;
                best_m = m;
                best_sigma = sigma;
            }
        }
    }

    if best_rss >= f64::MAX {
        return Err(MarigraphError::CalibrationError {
            message: "grid search found no admissible starting point".into(),
            rms_error: None,
        });
    }

    // Nelder-Mead refinement over (m, sigma)
    let step_m = (m_hi - m_lo) / (GRID_N as f64) * 0.5;
    let step_s = ((sigma_hi - sigma_lo) / (GRID_N as f64) * 0.5).max(0.001);

    let nm_config = crate::optim::NelderMeadConfig {
        max_iter: config.max_iter,
        diameter_tol: 1e-10,
        improvement_tol: config.tolerance,
    };
    let nm_result =
        crate::optim::nelder_mead_2d(objective, best_m, best_sigma, step_m, step_s, &nm_config);

    let (opt_m, opt_sigma) = (nm_result.x, nm_result.y.max(MIN_SIGMA));

    let (a, b_rho, b, _rss) =
        inner_solve(opt_m, opt_sigma).ok_or_else(|| MarigraphError::CalibrationError {
            message: "linear solve failed at optimal (m, sigma)".into(),
            rms_error: None,
        })?;

    let b = b.max(MIN_B);
    let rho = (b_rho / b).clamp(-MAX_RHO + 1e-6, MAX_RHO - 1e-6);

    let params =
        SviParams::new(a, b, rho, opt_m, opt_sigma).map_err(|e| MarigraphError::CalibrationError {
            message: format!("calibrated params invalid: {e}"),
            rms_error: None,
        })?;

    // Weighted RMSE in variance space at the final parameters
    let sse: f64 = samples
        .iter()
        .map(|s| {
            let diff = params.total_variance(s.k) - s.iv * s.iv * expiry;
            s.weight * diff * diff
        })
        .sum();
    let rmse = (sse / weight_sum).sqrt();

    debug!(
        a = params.a,
        b = params.b,
        rho = params.rho,
        m = params.m,
        sigma = params.sigma,
        rmse,
        objective = nm_result.fval,
        iterations = nm_result.iterations,
        "SVI calibration complete"
    );

    Ok(SviFit {
        params,
        rmse,
        iterations: nm_result.iterations,
    })
}
