//! Wireframe rendering pipeline.
//!
//! Surface → projected scene → character raster:
//!
//! - [`projection`] — camera state and 3D→2D mapping
//! - [`scene`] — wireframe, axes, grid, and surface-mesh line generation
//! - [`raster`] — depth-sorted Bresenham rasterization with height styling
//! - [`color`] — color tags and their ANSI SGR mapping
//!
//! Rendering is pure CPU: the same surface, camera, and buffer dimensions
//! always produce the same buffer.

pub mod color;
pub mod projection;
pub mod raster;
pub mod scene;

pub use color::ColorTag;
pub use projection::{project_3d, Point3, Projected, Projection};
pub use raster::{height_band, rasterize, Cell, RasterBuffer};
pub use scene::{build_render_frame, Label2, Line2, LineStyle, RenderFrame, SceneOptions};

use crate::surface::Surface;

/// Render a surface straight to a raster buffer.
///
/// Convenience composition of [`build_render_frame`] and [`rasterize`].
pub fn render_surface(
    surface: &Surface,
    proj: &Projection,
    opts: &SceneOptions,
    width: usize,
    height: usize,
) -> RasterBuffer {
    rasterize(&build_render_frame(surface, proj, opts), width, height)
}
