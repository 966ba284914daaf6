//! Scene construction: surface → depth-tagged 2D line segments.
//!
//! The surface is normalized into the `[-1, 1]³` cube, decorated with a
//! bounding wireframe, axes, and a bottom reference grid, then meshed into
//! horizontal and vertical segments between adjacent grid points. All
//! primitives are projected through the camera here; rasterization happens
//! in [`raster`](crate::render::raster).

use serde::{Deserialize, Serialize};

use crate::grid;
use crate::render::projection::{project_3d, Point3, Projection};
use crate::surface::Surface;

/// Light direction for the optional per-segment shading.
const LIGHT: (f64, f64, f64) = (2.0, -2.0, 3.0);
const AMBIENT: f64 = 0.15;
const SPECULAR_STRENGTH: f64 = 0.4;
const SHININESS: i32 = 16;
/// How far past an axis end its label sits, in cube units.
const LABEL_OVERSHOOT: f64 = 0.15;

/// Style of a rendered line, driving glyph and color choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    Wireframe,
    Axis,
    Grid,
    Surface,
}

/// A projected line segment with a single depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line2 {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    /// Mean of the endpoint depths.
    pub depth: f64,
    pub style: LineStyle,
    /// Normalized height in `[-1, 1]`, surface segments only.
    pub z_value: Option<f64>,
    /// Lambert + specular intensity in `[0, 1]`, when lighting is enabled.
    pub shade: Option<f64>,
}

/// A projected text label, painted above all lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label2 {
    pub x: f64,
    pub y: f64,
    pub depth: f64,
    pub text: String,
}

/// Everything the rasterizer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderFrame {
    pub lines: Vec<Line2>,
    pub labels: Vec<Label2>,
    /// Logical scene width (`2 · center_x`).
    pub scene_width: f64,
    /// Logical scene height (`2 · center_y`).
    pub scene_height: f64,
}

/// Scene construction options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneOptions {
    /// Lines per direction in the bottom grid is `divisions + 1`.
    pub grid_divisions: usize,
    /// Per-segment Lambert + specular shading for surface lines.
    pub lighting: bool,
}

impl Default for SceneOptions {
    fn default() -> Self {
        Self {
            grid_divisions: 4,
            lighting: false,
        }
    }
}

/// Normalize an axis value into `[-1, 1]` over `[lo, hi]`.
#[inline]
fn to_cube(v: f64, lo: f64, hi: f64) -> f64 {
    let range = hi - lo;
    if range <= 0.0 || !range.is_finite() {
        return 0.0;
    }
    2.0 * (v - lo) / range - 1.0
}

fn push_line(
    lines: &mut Vec<Line2>,
    a: Point3,
    b: Point3,
    proj: &Projection,
    style: LineStyle,
    z_value: Option<f64>,
    shade: Option<f64>,
) {
    let pa = project_3d(a, proj);
    let pb = project_3d(b, proj);
    lines.push(Line2 {
        x0: pa.x,
        y0: pa.y,
        x1: pb.x,
        y1: pb.y,
        depth: (pa.depth + pb.depth) / 2.0,
        style,
        z_value,
        shade,
    });
}

/// The 12 edges of the `[-1, 1]³` bounding cube.
fn cube_edges() -> [(Point3, Point3); 12] {
    let c = |x: f64, y: f64, z: f64| Point3::new(x, y, z);
    [
        // bottom face
        (c(-1.0, -1.0, -1.0), c(1.0, -1.0, -1.0)),
        (c(1.0, -1.0, -1.0), c(1.0, 1.0, -1.0)),
        (c(1.0, 1.0, -1.0), c(-1.0, 1.0, -1.0)),
        (c(-1.0, 1.0, -1.0), c(-1.0, -1.0, -1.0)),
        // top face
        (c(-1.0, -1.0, 1.0), c(1.0, -1.0, 1.0)),
        (c(1.0, -1.0, 1.0), c(1.0, 1.0, 1.0)),
        (c(1.0, 1.0, 1.0), c(-1.0, 1.0, 1.0)),
        (c(-1.0, 1.0, 1.0), c(-1.0, -1.0, 1.0)),
        // verticals
        (c(-1.0, -1.0, -1.0), c(-1.0, -1.0, 1.0)),
        (c(1.0, -1.0, -1.0), c(1.0, -1.0, 1.0)),
        (c(1.0, 1.0, -1.0), c(1.0, 1.0, 1.0)),
        (c(-1.0, 1.0, -1.0), c(-1.0, 1.0, 1.0)),
    ]
}

/// Lambert + specular intensity for a segment with surface normal `n`.
fn shade_segment(n: (f64, f64, f64)) -> f64 {
    let len = (LIGHT.0 * LIGHT.0 + LIGHT.1 * LIGHT.1 + LIGHT.2 * LIGHT.2).sqrt();
    let l = (LIGHT.0 / len, LIGHT.1 / len, LIGHT.2 / len);
    let n_len = (n.0 * n.0 + n.1 * n.1 + n.2 * n.2).sqrt();
    if n_len <= 0.0 || !n_len.is_finite() {
        return AMBIENT;
    }
    let n = (n.0 / n_len, n.1 / n_len, n.2 / n_len);
    let diffuse = (n.0 * l.0 + n.1 * l.1 + n.2 * l.2).max(0.0);
    // Viewer straight down +y; reflect l about n for the specular lobe.
    let r_dot_v = (2.0 * diffuse * n.1 - l.1).max(0.0);
    (AMBIENT + diffuse + SPECULAR_STRENGTH * r_dot_v.powi(SHININESS)).min(1.0)
}

/// Build the full render frame for a surface under the given camera.
///
/// Line order within each style follows grid order so equal-depth ties
/// resolve deterministically in the rasterizer.
pub fn build_render_frame(
    surface: &Surface,
    proj: &Projection,
    opts: &SceneOptions,
) -> RenderFrame {
    let mut lines = Vec::new();
    let mut labels = Vec::new();

    for (a, b) in cube_edges() {
        push_line(&mut lines, a, b, proj, LineStyle::Wireframe, None, None);
    }

    // Axes from the back-bottom-left corner, labels slightly past the ends.
    let origin = Point3::new(-1.0, -1.0, -1.0);
    let axes = [
        (Point3::new(1.0, -1.0, -1.0), &surface.meta().labels.x),
        (Point3::new(-1.0, 1.0, -1.0), &surface.meta().labels.y),
        (Point3::new(-1.0, -1.0, 1.0), &surface.meta().labels.z),
    ];
    for (end, text) in axes {
        push_line(&mut lines, origin, end, proj, LineStyle::Axis, None, None);
        let tip = Point3::new(
            end.x + (end.x - origin.x) * LABEL_OVERSHOOT,
            end.y + (end.y - origin.y) * LABEL_OVERSHOOT,
            end.z + (end.z - origin.z) * LABEL_OVERSHOOT,
        );
        let p = project_3d(tip, proj);
        labels.push(Label2 {
            x: p.x,
            y: p.y,
            depth: p.depth,
            text: text.clone(),
        });
    }

    // Bottom reference grid at z = -1.
    let divisions = opts.grid_divisions.max(1);
    for i in 0..=divisions {
        let t = -1.0 + 2.0 * i as f64 / divisions as f64;
        push_line(
            &mut lines,
            Point3::new(t, -1.0, -1.0),
            Point3::new(t, 1.0, -1.0),
            proj,
            LineStyle::Grid,
            None,
            None,
        );
        push_line(
            &mut lines,
            Point3::new(-1.0, t, -1.0),
            Point3::new(1.0, t, -1.0),
            proj,
            LineStyle::Grid,
            None,
            None,
        );
    }

    // Surface mesh.
    let nx = surface.nx();
    let ny = surface.ny();
    let [x_lo, x_hi] = surface.meta().domains.x;
    let [y_lo, y_hi] = surface.meta().domains.y;
    let (z_lo, z_hi) = grid::minmax(surface.z());

    let px: Vec<f64> = surface.x().iter().map(|&v| to_cube(v, x_lo, x_hi)).collect();
    let py: Vec<f64> = surface.y().iter().map(|&v| to_cube(v, y_lo, y_hi)).collect();
    let pz: Vec<f64> = surface
        .z()
        .iter()
        .map(|&v| to_cube(v, z_lo, z_hi))
        .collect();

    let point = |xi: usize, yi: usize| Point3::new(px[xi], py[yi], pz[xi * ny + yi]);

    let normal = |xi: usize, yi: usize| {
        let dzdx = if xi + 1 < nx {
            (pz[(xi + 1) * ny + yi] - pz[xi * ny + yi]) / (px[xi + 1] - px[xi]).max(1e-9)
        } else {
            0.0
        };
        let dzdy = if yi + 1 < ny {
            (pz[xi * ny + yi + 1] - pz[xi * ny + yi]) / (py[yi + 1] - py[yi]).max(1e-9)
        } else {
            0.0
        };
        (-dzdx, -dzdy, 1.0)
    };

    for xi in 0..nx {
        for yi in 0..ny {
            let a = point(xi, yi);
            if yi + 1 < ny {
                let b = point(xi, yi + 1);
                let shade = opts.lighting.then(|| shade_segment(normal(xi, yi)));
                push_line(
                    &mut lines,
                    a,
                    b,
                    proj,
                    LineStyle::Surface,
                    Some((a.z + b.z) / 2.0),
                    shade,
                );
            }
            if xi + 1 < nx {
                let b = point(xi + 1, yi);
                let shade = opts.lighting.then(|| shade_segment(normal(xi, yi)));
                push_line(
                    &mut lines,
                    a,
                    b,
                    proj,
                    LineStyle::Surface,
                    Some((a.z + b.z) / 2.0),
                    shade,
                );
            }
        }
    }

    RenderFrame {
        lines,
        labels,
        scene_width: 2.0 * proj.center_x,
        scene_height: 2.0 * proj.center_y,
    }
}
