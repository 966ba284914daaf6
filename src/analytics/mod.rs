//! Surface analytics.
//!
//! Everything here is pure CPU over a [`Surface`](crate::surface::Surface)
//! or [`SlopeField`](crate::surface::SlopeField):
//!
//! - [`svi`] — SVI smile evaluation and weighted calibration
//! - [`arbitrage`] — strict calendar/butterfly/vertical checks and repair
//! - [`risk`] — slope-field summary metrics and composite score
//! - [`term`] — term-structure / smile analyses and lenient opportunities

pub mod arbitrage;
pub mod risk;
pub mod svi;
pub mod term;

pub use arbitrage::{
    check_all_arbitrage, check_butterfly, check_calendar, check_vertical, enforce_arbitrage_free,
    ArbitrageConfig, ArbitrageKind, ArbitrageSummary, EnforceOutcome, Severity, Violation,
};
pub use risk::{risk_metrics, RiskMetrics, RiskZone};
pub use svi::{calibrate, CalibrationConfig, SviFit, SviParams, SviSample};
pub use term::{
    analyze_smiles, analyze_term_structure, find_opportunities, Opportunity, OpportunityKind,
    SkewDirection, SmileAnalysis, SmileCurve, TermCurve, TermStructureAnalysis,
};
