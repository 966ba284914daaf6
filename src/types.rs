//! Core domain types for surface analytics.
//!
//! These newtypes wrap `f64` to provide compile-time type safety, preventing
//! accidental parameter swapping (e.g., passing a volatility where a total
//! variance is expected).
//!
//! # Newtype Strategy
//!
//! **Outputs use newtypes** — [`Vol`] and [`Variance`] wrap return values so
//! callers can't silently mix a volatility with a variance.
//!
//! **Inputs use bare `f64`** — API methods like `implied_vol(k: f64, t: f64)`
//! accept raw floats for ergonomics; the caller already knows what they are
//! passing and the parameter names document it.
//!
//! # Why no `Eq` or `Ord`?
//! These types wrap `f64`, which does not implement `Eq` or `Ord` because
//! `NaN` breaks total ordering. We derive `PartialEq` and `PartialOrd` only.

use serde::{Deserialize, Serialize};

/// Implied volatility `σ`, measured as annualized standard deviation.
///
/// A vol of 0.20 represents 20% annualized volatility.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Vol(pub f64);

/// Total variance `σ²T`.
///
/// Calendar-arbitrage checks compare total variance across expiries because
/// it must be non-decreasing in time for an arbitrage-free surface.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Variance(pub f64);

impl Vol {
    /// Total variance at the given expiry: `σ² · T`.
    pub fn total_variance(self, expiry: f64) -> Variance {
        Variance(self.0 * self.0 * expiry)
    }
}
