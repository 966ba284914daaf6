//! Camera state and 3D→2D projection.
//!
//! The camera orbits the scene: rotate about Z by azimuth, then about X by
//! elevation, then project orthographically. Depth is the rotated Y
//! coordinate — greater depth means closer to the camera.

use serde::{Deserialize, Serialize};

use crate::error::MarigraphError;
use crate::validate::validate_positive;

/// A point in scene space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A projected screen point with its depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projected {
    pub x: f64,
    pub y: f64,
    /// Rotated Y; greater is closer to the camera.
    pub depth: f64,
}

/// Orbiting camera state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProjectionRaw", into = "ProjectionRaw")]
pub struct Projection {
    /// Horizontal rotation, degrees in `[0, 360)`.
    azimuth: f64,
    /// Vertical rotation, degrees in `[-89, 89]`.
    elevation: f64,
    /// Scale factor, at least 1.
    zoom: f64,
    pub center_x: f64,
    pub center_y: f64,
    /// Character cell width/height compensation.
    pub aspect_ratio: f64,
}

#[derive(Serialize, Deserialize)]
struct ProjectionRaw {
    azimuth: f64,
    elevation: f64,
    zoom: f64,
    center_x: f64,
    center_y: f64,
    aspect_ratio: f64,
}

impl TryFrom<ProjectionRaw> for Projection {
    type Error = MarigraphError;
    fn try_from(raw: ProjectionRaw) -> Result<Self, Self::Error> {
        Projection::new(
            raw.azimuth,
            raw.elevation,
            raw.zoom,
            raw.center_x,
            raw.center_y,
            raw.aspect_ratio,
        )
    }
}

impl From<Projection> for ProjectionRaw {
    fn from(p: Projection) -> Self {
        Self {
            azimuth: p.azimuth,
            elevation: p.elevation,
            zoom: p.zoom,
            center_x: p.center_x,
            center_y: p.center_y,
            aspect_ratio: p.aspect_ratio,
        }
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            azimuth: 45.0,
            elevation: 30.0,
            zoom: 18.0,
            center_x: 40.0,
            center_y: 12.0,
            aspect_ratio: 0.5,
        }
    }
}

impl Projection {
    /// Create a camera, wrapping azimuth into `[0, 360)` and clamping
    /// elevation into `[-89, 89]`.
    ///
    /// # Errors
    /// Returns [`MarigraphError::InvalidInput`] for non-positive zoom or
    /// aspect ratio, or non-finite angles/centers.
    pub fn new(
        azimuth: f64,
        elevation: f64,
        zoom: f64,
        center_x: f64,
        center_y: f64,
        aspect_ratio: f64,
    ) -> crate::error::Result<Self> {
        crate::validate::validate_finite(azimuth, "azimuth")?;
        crate::validate::validate_finite(elevation, "elevation")?;
        crate::validate::validate_finite(center_x, "center_x")?;
        crate::validate::validate_finite(center_y, "center_y")?;
        validate_positive(zoom, "zoom")?;
        validate_positive(aspect_ratio, "aspect_ratio")?;
        Ok(Self {
            azimuth: azimuth.rem_euclid(360.0),
            elevation: elevation.clamp(-89.0, 89.0),
            zoom: zoom.max(1.0),
            center_x,
            center_y,
            aspect_ratio,
        })
    }

    pub fn azimuth(&self) -> f64 {
        self.azimuth
    }

    pub fn elevation(&self) -> f64 {
        self.elevation
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Rotate by `(Δazimuth, Δelevation)` degrees.
    ///
    /// Azimuth wraps modulo 360; elevation clamps to `[-89, 89]`.
    pub fn rotate(&self, d_azimuth: f64, d_elevation: f64) -> Self {
        Self {
            azimuth: (self.azimuth + d_azimuth).rem_euclid(360.0),
            elevation: (self.elevation + d_elevation).clamp(-89.0, 89.0),
            ..*self
        }
    }

    /// Multiply the zoom, clamped at a minimum of 1.
    pub fn zoom_by(&self, factor: f64) -> Self {
        Self {
            zoom: (self.zoom * factor).max(1.0),
            ..*self
        }
    }
}

/// Project a scene point through the camera.
///
/// 1. Rotate about Z by azimuth.
/// 2. Rotate about X by elevation.
/// 3. Orthographic: `screen_x = center_x + x₂·zoom`,
///    `screen_y = center_y − z₂·zoom·aspect_ratio`.
///
/// Depth is the rotated Y coordinate.
pub fn project_3d(p: Point3, proj: &Projection) -> Projected {
    let az = proj.azimuth.to_radians();
    let el = proj.elevation.to_radians();

    let (sin_az, cos_az) = az.sin_cos();
    let x1 = p.x * cos_az - p.y * sin_az;
    let y1 = p.x * sin_az + p.y * cos_az;
    let z1 = p.z;

    let (sin_el, cos_el) = el.sin_cos();
    let x2 = x1;
    let y2 = y1 * cos_el - z1 * sin_el;
    let z2 = y1 * sin_el + z1 * cos_el;

    Projected {
        x: proj.center_x + x2 * proj.zoom,
        y: proj.center_y - z2 * proj.zoom * proj.aspect_ratio,
        depth: y2,
    }
}
