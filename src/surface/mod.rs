//! Regular-grid surface model.
//!
//! A [`Surface`] is a rectilinear sampling of `z = f(x, y)` with strictly
//! increasing axes and a row-major value buffer (`z[xi * ny + yi]`). It is
//! the unit of exchange between the data producer, the analytics layer, the
//! renderer, and the wire codecs.
//!
//! - [`slope`] — central-difference slope fields
//! - [`interp`] — bilinear / bicubic / nearest interpolation, slicing,
//!   resampling

pub mod interp;
pub mod slope;

pub use interp::{interpolate, resample, slice_at_x, slice_at_y, InterpMethod, SurfaceSlice};
pub use slope::{compute_slope, SlopeField};

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::MarigraphError;
use crate::grid;
use crate::validate::validate_increasing;

/// Axis and value labels for a surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisLabels {
    pub x: String,
    pub y: String,
    pub z: String,
}

impl Default for AxisLabels {
    fn default() -> Self {
        Self {
            x: "expiry".into(),
            y: "strike".into(),
            z: "iv".into(),
        }
    }
}

/// Cached `[min, max]` ranges per axis and for the value buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Domains {
    pub x: [f64; 2],
    pub y: [f64; 2],
    pub z: [f64; 2],
}

/// Surface metadata carried alongside the grid on the wire.
///
/// Unknown keys in serialized metadata are ignored on read so newer peers
/// can add fields without breaking older receivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SurfaceMeta {
    pub labels: AxisLabels,
    pub domains: Domains,
    /// Creation time, milliseconds since the Unix epoch.
    pub timestamp: u64,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A regular, rectilinear sampling of `z = f(x, y)`.
///
/// Invariants maintained by every constructor and mutator:
/// - `x.len() == nx`, `y.len() == ny`, `z.len() == nx * ny`
/// - `x` and `y` strictly increasing
/// - `meta.domains` equal the min/max of the buffers (mutators recompute)
///
/// `z` values may contain NaN sentinels; analytics propagate them naturally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SurfaceRaw", into = "SurfaceRaw")]
pub struct Surface {
    nx: usize,
    ny: usize,
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    meta: SurfaceMeta,
}

#[derive(Serialize, Deserialize)]
struct SurfaceRaw {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    #[serde(default)]
    meta: SurfaceMeta,
}

impl TryFrom<SurfaceRaw> for Surface {
    type Error = MarigraphError;
    fn try_from(raw: SurfaceRaw) -> Result<Self, Self::Error> {
        Surface::with_meta(raw.x, raw.y, raw.z, raw.meta)
    }
}

impl From<Surface> for SurfaceRaw {
    fn from(s: Surface) -> Self {
        Self {
            x: s.x,
            y: s.y,
            z: s.z,
            meta: s.meta,
        }
    }
}

impl Surface {
    /// Create a surface from axes and a row-major value buffer.
    ///
    /// Domains are computed from the buffers; the timestamp is set to now.
    ///
    /// # Errors
    /// Returns [`MarigraphError::InvalidInput`] if either axis is empty or
    /// not strictly increasing, or if `z.len() != x.len() * y.len()`.
    pub fn new(
        x: Vec<f64>,
        y: Vec<f64>,
        z: Vec<f64>,
        labels: AxisLabels,
    ) -> crate::error::Result<Self> {
        let meta = SurfaceMeta {
            labels,
            domains: Domains::default(),
            timestamp: now_millis(),
        };
        Self::with_meta(x, y, z, meta)
    }

    /// Create a surface carrying existing metadata (wire deserialization).
    ///
    /// Labels and timestamp are kept; domains are recomputed from the
    /// buffers so precision loss on the wire cannot leave them stale.
    pub fn with_meta(
        x: Vec<f64>,
        y: Vec<f64>,
        z: Vec<f64>,
        mut meta: SurfaceMeta,
    ) -> crate::error::Result<Self> {
        let nx = x.len();
        let ny = y.len();
        if nx == 0 || ny == 0 {
            return Err(MarigraphError::InvalidInput {
                message: format!("surface axes must be non-empty, got nx={nx}, ny={ny}"),
            });
        }
        validate_increasing(&x, "x axis")?;
        validate_increasing(&y, "y axis")?;
        if z.len() != nx * ny {
            return Err(MarigraphError::InvalidInput {
                message: format!(
                    "z length {} does not match nx*ny = {}",
                    z.len(),
                    nx * ny
                ),
            });
        }
        let (x_lo, x_hi) = grid::minmax(&x);
        let (y_lo, y_hi) = grid::minmax(&y);
        let (z_lo, z_hi) = grid::minmax(&z);
        meta.domains = Domains {
            x: [x_lo, x_hi],
            y: [y_lo, y_hi],
            z: [z_lo, z_hi],
        };
        Ok(Self {
            nx,
            ny,
            x,
            y,
            z,
            meta,
        })
    }

    /// Build a surface by sampling `f(x, y)` over the given axes.
    pub fn from_fn<F>(
        x: Vec<f64>,
        y: Vec<f64>,
        labels: AxisLabels,
        f: F,
    ) -> crate::error::Result<Self>
    where
        F: Fn(f64, f64) -> f64,
    {
        let mut z = Vec::with_capacity(x.len() * y.len());
        for &xv in &x {
            for &yv in &y {
                z.push(f(xv, yv));
            }
        }
        Self::new(x, y, z, labels)
    }

    /// Axis length along x.
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Axis length along y.
    pub fn ny(&self) -> usize {
        self.ny
    }

    /// The x axis (strictly increasing).
    pub fn x(&self) -> &[f64] {
        &self.x
    }

    /// The y axis (strictly increasing).
    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// Row-major value buffer, `z[xi * ny + yi]`.
    pub fn z(&self) -> &[f64] {
        &self.z
    }

    /// Surface metadata (labels, cached domains, creation timestamp).
    pub fn meta(&self) -> &SurfaceMeta {
        &self.meta
    }

    /// Flat index of grid cell `(xi, yi)`.
    #[inline]
    pub fn index(&self, xi: usize, yi: usize) -> usize {
        xi * self.ny + yi
    }

    /// Value at grid cell `(xi, yi)`.
    #[inline]
    pub fn value(&self, xi: usize, yi: usize) -> f64 {
        self.z[xi * self.ny + yi]
    }

    /// Overwrite one cell and recompute the z domain.
    ///
    /// # Errors
    /// Returns [`MarigraphError::InvalidInput`] if the cell is out of range.
    pub fn set_value(&mut self, xi: usize, yi: usize, value: f64) -> crate::error::Result<()> {
        if xi >= self.nx || yi >= self.ny {
            return Err(MarigraphError::InvalidInput {
                message: format!(
                    "cell ({xi}, {yi}) out of range for {}x{} surface",
                    self.nx, self.ny
                ),
            });
        }
        self.z[xi * self.ny + yi] = value;
        self.recompute_z_domain();
        Ok(())
    }

    /// Apply a sparse update of `(flat_index, value)` pairs, then recompute
    /// the z domain once.
    ///
    /// # Errors
    /// Returns [`MarigraphError::InvalidInput`] on the first out-of-range
    /// index; earlier writes in the batch remain applied, the domain is
    /// still recomputed.
    pub fn apply_delta(&mut self, updates: &[(u32, f32)]) -> crate::error::Result<()> {
        let result = updates.iter().try_for_each(|&(idx, value)| {
            let idx = idx as usize;
            if idx >= self.z.len() {
                return Err(MarigraphError::InvalidInput {
                    message: format!(
                        "delta index {idx} out of range for z length {}",
                        self.z.len()
                    ),
                });
            }
            self.z[idx] = f64::from(value);
            Ok(())
        });
        self.recompute_z_domain();
        result
    }

    fn recompute_z_domain(&mut self) {
        let (lo, hi) = grid::minmax(&self.z);
        self.meta.domains.z = [lo, hi];
    }
}
