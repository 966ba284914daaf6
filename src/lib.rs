//! # marigraph
//!
//! Terminal dashboard core for time-indexed volatility surfaces: an
//! interactively rotatable 3D wireframe renderer, surface analytics, and a
//! multi-process event router.
//!
//! ## Architecture
//!
//! - **`grid`** — dense numeric buffer primitives (linspace, minmax,
//!   normalize, concat, element-wise ops)
//! - **`surface`** — regular-grid surface model, slope fields,
//!   interpolation and resampling
//! - **`analytics`** — SVI smile calibration, arbitrage checks and repair,
//!   risk metrics, term-structure/smile analyses
//! - **`render`** — 3D→2D projection, scene building, depth-sorted
//!   character rasterization with ANSI color
//! - **`ipc`** — length-prefixed frame codec, streaming reader, surface
//!   payload codecs
//! - **`router`** — worker supervisor and declarative event wiring
//! - **`worker`** — worker-side runtime with an optional unix-socket
//!   JSON-RPC endpoint

pub mod analytics;
pub mod error;
pub mod grid;
pub mod ipc;
pub mod render;
pub mod router;
pub mod surface;
pub mod types;
pub mod worker;

mod optim;
mod validate;

pub use error::{MarigraphError, Result};
pub use types::{Variance, Vol};
