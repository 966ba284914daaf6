//! Slope field of a surface.
//!
//! Finite-difference gradient of `z` over the grid: central differences for
//! interior points, one-sided first-order differences at the boundaries.
//! Axis spacing may be non-uniform; each difference is divided by the actual
//! span it covers.

use serde::{Deserialize, Serialize};

use crate::surface::Surface;

/// Per-cell gradient of a surface, stored row-major like the surface itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlopeField {
    pub nx: usize,
    pub ny: usize,
    /// ∂z/∂x per cell.
    pub dz_dx: Vec<f64>,
    /// ∂z/∂y per cell.
    pub dz_dy: Vec<f64>,
    /// √(dz_dx² + dz_dy²) per cell.
    pub magnitude: Vec<f64>,
    /// atan2(dz_dy, dz_dx) per cell, radians.
    pub angle: Vec<f64>,
}

impl SlopeField {
    /// Number of cells.
    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    /// True when the field has no cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compute the slope field of a surface.
///
/// A degenerate axis (length 1) yields zero derivatives along it.
pub fn compute_slope(surface: &Surface) -> SlopeField {
    let nx = surface.nx();
    let ny = surface.ny();
    let x = surface.x();
    let y = surface.y();
    let n = nx * ny;

    let mut dz_dx = vec![0.0; n];
    let mut dz_dy = vec![0.0; n];
    let mut magnitude = vec![0.0; n];
    let mut angle = vec![0.0; n];

    for xi in 0..nx {
        for yi in 0..ny {
            let idx = xi * ny + yi;

            let dx = if nx > 1 {
                let (lo, hi) = neighbor_span(xi, nx);
                (surface.value(hi, yi) - surface.value(lo, yi)) / (x[hi] - x[lo])
            } else {
                0.0
            };

            let dy = if ny > 1 {
                let (lo, hi) = neighbor_span(yi, ny);
                (surface.value(xi, hi) - surface.value(xi, lo)) / (y[hi] - y[lo])
            } else {
                0.0
            };

            dz_dx[idx] = dx;
            dz_dy[idx] = dy;
            magnitude[idx] = (dx * dx + dy * dy).sqrt();
            angle[idx] = dy.atan2(dx);
        }
    }

    SlopeField {
        nx,
        ny,
        dz_dx,
        dz_dy,
        magnitude,
        angle,
    }
}

/// Index pair spanned by the difference stencil at position `i` of an axis
/// of length `n`: central for interior points, one-sided at the boundaries.
#[inline]
fn neighbor_span(i: usize, n: usize) -> (usize, usize) {
    if i == 0 {
        (0, 1)
    } else if i == n - 1 {
        (n - 2, n - 1)
    } else {
        (i - 1, i + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::AxisLabels;
    use approx::assert_abs_diff_eq;

    fn planar_surface() -> Surface {
        // z = 2x + 3y on a uniform grid
        Surface::from_fn(
            vec![0.0, 1.0, 2.0, 3.0],
            vec![0.0, 1.0, 2.0],
            AxisLabels::default(),
            |x, y| 2.0 * x + 3.0 * y,
        )
        .unwrap()
    }

    #[test]
    fn plane_has_constant_gradient() {
        let field = compute_slope(&planar_surface());
        for i in 0..field.len() {
            assert_abs_diff_eq!(field.dz_dx[i], 2.0, epsilon = 1e-12);
            assert_abs_diff_eq!(field.dz_dy[i], 3.0, epsilon = 1e-12);
            assert_abs_diff_eq!(field.magnitude[i], (13.0_f64).sqrt(), epsilon = 1e-12);
            assert_abs_diff_eq!(field.angle[i], 3.0_f64.atan2(2.0), epsilon = 1e-12);
        }
    }

    #[test]
    fn flat_surface_has_zero_slope() {
        let s = Surface::new(
            vec![0.5, 1.0, 2.0],
            vec![90.0, 100.0, 110.0],
            vec![0.2; 9],
            AxisLabels::default(),
        )
        .unwrap();
        let field = compute_slope(&s);
        assert!(field.dz_dx.iter().all(|&v| v == 0.0));
        assert!(field.dz_dy.iter().all(|&v| v == 0.0));
        assert!(field.magnitude.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn non_uniform_spacing_divides_by_actual_span() {
        // x spacing 1 then 3; z = x^2 so interior central difference uses
        // the full span x[2]-x[0] = 4.
        let s = Surface::from_fn(
            vec![0.0, 1.0, 4.0],
            vec![0.0, 1.0],
            AxisLabels::default(),
            |x, _| x * x,
        )
        .unwrap();
        let field = compute_slope(&s);
        // interior point xi=1: (16 - 0) / (4 - 0) = 4
        assert_abs_diff_eq!(field.dz_dx[s.index(1, 0)], 4.0, epsilon = 1e-12);
        // left boundary: (1 - 0) / (1 - 0) = 1
        assert_abs_diff_eq!(field.dz_dx[s.index(0, 0)], 1.0, epsilon = 1e-12);
        // right boundary: (16 - 1) / (4 - 1) = 5
        assert_abs_diff_eq!(field.dz_dx[s.index(2, 0)], 5.0, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_axis_yields_zero_derivative() {
        let s = Surface::new(
            vec![1.0],
            vec![0.0, 1.0, 2.0],
            vec![5.0, 6.0, 9.0],
            AxisLabels::default(),
        )
        .unwrap();
        let field = compute_slope(&s);
        assert!(field.dz_dx.iter().all(|&v| v == 0.0));
        assert_abs_diff_eq!(field.dz_dy[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(field.dz_dy[1], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(field.dz_dy[2], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn nan_cells_propagate() {
        let s = Surface::new(
            vec![0.0, 1.0, 2.0],
            vec![0.0, 1.0],
            vec![0.0, 0.0, f64::NAN, f64::NAN, 2.0, 2.0],
            AxisLabels::default(),
        )
        .unwrap();
        let field = compute_slope(&s);
        // Boundary stencils touch the NaN column
        assert!(field.dz_dx[s.index(0, 0)].is_nan());
        assert!(field.magnitude[s.index(0, 0)].is_nan());
        // Interior stencil at xi=1 skips over the NaN column entirely
        assert_abs_diff_eq!(field.dz_dx[s.index(1, 0)], 1.0, epsilon = 1e-12);
    }
}
