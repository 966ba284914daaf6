//! Surface interpolation, slicing, and resampling.
//!
//! Queries outside the convex hull of the axes clamp to the nearest
//! boundary cell; interpolation never fails on a valid surface.

use serde::{Deserialize, Serialize};

use crate::error::MarigraphError;
use crate::grid;
use crate::surface::Surface;

/// Interpolation scheme for surface queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InterpMethod {
    /// Blend the four cell corners by normalized offsets.
    #[default]
    Bilinear,
    /// Catmull-Rom over a 4×4 stencil, indices clamped at the boundary.
    Bicubic,
    /// Closest grid node in each dimension.
    Nearest,
}

/// A 1-D curve extracted from a surface at a fixed coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSlice {
    /// The varying axis values.
    pub axis: Vec<f64>,
    /// Interpolated z along the slice.
    pub values: Vec<f64>,
}

/// Locate the cell containing `q` on a strictly increasing axis.
///
/// Returns `(i, t)` with `t ∈ [0, 1]` the normalized offset inside cell
/// `[axis[i], axis[i+1]]`. Out-of-range queries clamp to the first or last
/// cell with `t` pinned to the boundary.
fn locate(axis: &[f64], q: f64) -> (usize, f64) {
    let n = axis.len();
    if n < 2 {
        return (0, 0.0);
    }
    if q <= axis[0] {
        return (0, 0.0);
    }
    if q >= axis[n - 1] {
        return (n - 2, 1.0);
    }
    // First index with axis[i] > q; the containing cell starts one before.
    let right = axis.partition_point(|&v| v <= q);
    let i = right - 1;
    let t = (q - axis[i]) / (axis[i + 1] - axis[i]);
    (i, t)
}

/// Catmull-Rom interpolation through `p1` and `p2` with tangents from the
/// outer points, evaluated at `t ∈ [0, 1]`.
#[inline]
fn catmull_rom(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p1)
        + (-p0 + p2) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * t3)
}

#[inline]
fn clamp_index(i: isize, n: usize) -> usize {
    i.clamp(0, n as isize - 1) as usize
}

fn bilinear(surface: &Surface, x: f64, y: f64) -> f64 {
    let (xi, tx) = locate(surface.x(), x);
    let (yi, ty) = locate(surface.y(), y);
    let xi1 = (xi + 1).min(surface.nx() - 1);
    let yi1 = (yi + 1).min(surface.ny() - 1);

    let z00 = surface.value(xi, yi);
    let z01 = surface.value(xi, yi1);
    let z10 = surface.value(xi1, yi);
    let z11 = surface.value(xi1, yi1);

    let a = z00 * (1.0 - tx) + z10 * tx;
    let b = z01 * (1.0 - tx) + z11 * tx;
    a * (1.0 - ty) + b * ty
}

fn bicubic(surface: &Surface, x: f64, y: f64) -> f64 {
    let (xi, tx) = locate(surface.x(), x);
    let (yi, ty) = locate(surface.y(), y);
    let nx = surface.nx();
    let ny = surface.ny();

    // Interpolate along y for each of the four x rows, then along x.
    let mut rows = [0.0; 4];
    for (r, row) in rows.iter_mut().enumerate() {
        let sx = clamp_index(xi as isize + r as isize - 1, nx);
        let mut cols = [0.0; 4];
        for (c, col) in cols.iter_mut().enumerate() {
            let sy = clamp_index(yi as isize + c as isize - 1, ny);
            *col = surface.value(sx, sy);
        }
        *row = catmull_rom(cols[0], cols[1], cols[2], cols[3], ty);
    }
    catmull_rom(rows[0], rows[1], rows[2], rows[3], tx)
}

fn nearest(surface: &Surface, x: f64, y: f64) -> f64 {
    let (xi, tx) = locate(surface.x(), x);
    let (yi, ty) = locate(surface.y(), y);
    let xi = if tx >= 0.5 {
        (xi + 1).min(surface.nx() - 1)
    } else {
        xi
    };
    let yi = if ty >= 0.5 {
        (yi + 1).min(surface.ny() - 1)
    } else {
        yi
    };
    surface.value(xi, yi)
}

/// Interpolate the surface at `(x, y)` with the given method.
///
/// Out-of-hull queries clamp to the boundary; this never fails.
pub fn interpolate(surface: &Surface, x: f64, y: f64, method: InterpMethod) -> f64 {
    match method {
        InterpMethod::Bilinear => bilinear(surface, x, y),
        InterpMethod::Bicubic => bicubic(surface, x, y),
        InterpMethod::Nearest => nearest(surface, x, y),
    }
}

/// Curve along varying y at fixed `x = x0`.
pub fn slice_at_x(surface: &Surface, x0: f64, method: InterpMethod) -> SurfaceSlice {
    let axis = surface.y().to_vec();
    let values = axis
        .iter()
        .map(|&y| interpolate(surface, x0, y, method))
        .collect();
    SurfaceSlice { axis, values }
}

/// Curve along varying x at fixed `y = y0`.
pub fn slice_at_y(surface: &Surface, y0: f64, method: InterpMethod) -> SurfaceSlice {
    let axis = surface.x().to_vec();
    let values = axis
        .iter()
        .map(|&x| interpolate(surface, x, y0, method))
        .collect();
    SurfaceSlice { axis, values }
}

/// Resample onto a fresh regularly-spaced grid across the source domain.
///
/// # Errors
/// Returns [`MarigraphError::InvalidInput`] if either new dimension is
/// below 2.
pub fn resample(
    surface: &Surface,
    new_nx: usize,
    new_ny: usize,
    method: InterpMethod,
) -> crate::error::Result<Surface> {
    if new_nx < 2 || new_ny < 2 {
        return Err(MarigraphError::InvalidInput {
            message: format!("resample dimensions must be >= 2, got {new_nx}x{new_ny}"),
        });
    }
    let [x_lo, x_hi] = surface.meta().domains.x;
    let [y_lo, y_hi] = surface.meta().domains.y;
    let x = grid::linspace(x_lo, x_hi, new_nx)?;
    let y = grid::linspace(y_lo, y_hi, new_ny)?;
    let mut z = Vec::with_capacity(new_nx * new_ny);
    for &xv in &x {
        for &yv in &y {
            z.push(interpolate(surface, xv, yv, method));
        }
    }
    Surface::with_meta(x, y, z, surface.meta().clone())
}
