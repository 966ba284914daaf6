//! Depth-sorted line rasterization into a character grid.
//!
//! Painter's algorithm: lines are drawn back-to-front (ascending depth,
//! stable, so equal depths keep scene order) with Bresenham stepping and a
//! per-cell depth test that lets later equal-depth draws win. Labels are
//! painted last at `depth + 1` so they sit above every line.

use serde::{Deserialize, Serialize};

use crate::render::color::ColorTag;
use crate::render::scene::{Label2, Line2, LineStyle, RenderFrame};

/// Horizontal margin kept clear of the scene.
const MARGIN_X: usize = 4;
/// Vertical margin kept clear of the scene.
const MARGIN_Y: usize = 2;

/// One character cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub ch: char,
    pub color: ColorTag,
    /// `-INF` while unpainted.
    pub depth: f64,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            color: ColorTag::White,
            depth: f64::NEG_INFINITY,
        }
    }
}

/// A width×height grid of `(char, color, depth)` cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterBuffer {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl RasterBuffer {
    /// A cleared buffer of the given dimensions.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![Cell::default(); width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Cell at `(x, y)`; row-major top-to-bottom.
    pub fn get(&self, x: usize, y: usize) -> &Cell {
        &self.cells[y * self.width + x]
    }

    /// All cells, row-major.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Depth-tested write: paints only when `depth >= existing depth`.
    fn paint(&mut self, x: i64, y: i64, ch: char, color: ColorTag, depth: f64) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let cell = &mut self.cells[y as usize * self.width + x as usize];
        if depth >= cell.depth {
            *cell = Cell { ch, color, depth };
        }
    }

    /// Render to ANSI-colored text, one line per row, reset at each color
    /// change boundary and at the end of every row.
    pub fn to_ansi(&self) -> String {
        let mut out = String::with_capacity(self.cells.len() * 2);
        for y in 0..self.height {
            let mut current: Option<ColorTag> = None;
            for x in 0..self.width {
                let cell = self.get(x, y);
                if cell.ch == ' ' {
                    out.push(' ');
                    continue;
                }
                if current != Some(cell.color) {
                    out.push_str(&format!("\x1b[{}m", cell.color.sgr()));
                    current = Some(cell.color);
                }
                out.push(cell.ch);
            }
            if current.is_some() {
                out.push_str("\x1b[0m");
            }
            out.push('\n');
        }
        out
    }
}

/// Glyph and color for a surface segment from its normalized height.
///
/// `z_value ∈ [-1, 1]` is first mapped to `z' = (z_value + 1) / 2`.
pub fn height_band(z_value: f64) -> (char, ColorTag) {
    let z = ((z_value + 1.0) / 2.0).clamp(0.0, 1.0);
    match z {
        z if z < 0.08 => ('\u{00b7}', ColorTag::Gray),    // ·
        z if z < 0.20 => ('\u{2219}', ColorTag::Blue),    // ∙
        z if z < 0.35 => (':', ColorTag::Cyan),
        z if z < 0.50 => ('\u{2591}', ColorTag::Green),   // ░
        z if z < 0.65 => ('\u{2592}', ColorTag::Yellow),  // ▒
        z if z < 0.80 => ('\u{2593}', ColorTag::Magenta), // ▓
        z if z < 0.95 => ('\u{2588}', ColorTag::Red),     // █
        _ => ('\u{2580}', ColorTag::White),               // ▀
    }
}

/// Glyph and color for a fixed-style segment, chosen by screen-space angle.
fn style_glyph(style: LineStyle, dx: f64, dy: f64) -> (char, ColorTag) {
    let heavy = matches!(style, LineStyle::Wireframe | LineStyle::Axis);
    let ch = if dx.abs() >= 2.0 * dy.abs() {
        if heavy {
            '\u{2501}' // ━
        } else {
            '\u{2500}' // ─
        }
    } else if dy.abs() >= 2.0 * dx.abs() {
        if heavy {
            '\u{2503}' // ┃
        } else {
            '\u{2502}' // │
        }
    } else if (dx >= 0.0) == (dy >= 0.0) {
        // Screen y grows downward: same-sign slope runs down-right.
        '\u{2572}' // ╲
    } else {
        '\u{2571}' // ╱
    };
    let color = match style {
        LineStyle::Wireframe => ColorTag::White,
        LineStyle::Axis => ColorTag::Cyan,
        LineStyle::Grid => ColorTag::Gray,
        LineStyle::Surface => ColorTag::White,
    };
    (ch, color)
}

struct Mapping {
    scale: f64,
    off_x: f64,
    off_y: f64,
}

impl Mapping {
    /// Fit the logical scene into the buffer minus margins, centered,
    /// preserving aspect.
    fn fit(frame: &RenderFrame, width: usize, height: usize) -> Self {
        let usable_w = width.saturating_sub(MARGIN_X) as f64;
        let usable_h = height.saturating_sub(MARGIN_Y) as f64;
        let sw = frame.scene_width.max(1e-9);
        let sh = frame.scene_height.max(1e-9);
        let scale = (usable_w / sw).min(usable_h / sh).max(0.0);
        Self {
            scale,
            off_x: (width as f64 - sw * scale) / 2.0,
            off_y: (height as f64 - sh * scale) / 2.0,
        }
    }

    #[inline]
    fn apply(&self, x: f64, y: f64) -> (i64, i64) {
        (
            (x * self.scale + self.off_x).round() as i64,
            (y * self.scale + self.off_y).round() as i64,
        )
    }
}

fn draw_line(buffer: &mut RasterBuffer, line: &Line2, mapping: &Mapping) {
    let (x0, y0) = mapping.apply(line.x0, line.y0);
    let (x1, y1) = mapping.apply(line.x1, line.y1);

    let (ch, color) = match line.style {
        LineStyle::Surface => height_band(line.z_value.unwrap_or(0.0)),
        style => style_glyph(style, (x1 - x0) as f64, (y1 - y0) as f64),
    };

    // Bresenham
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);
    loop {
        buffer.paint(x, y, ch, color, line.depth);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn draw_label(buffer: &mut RasterBuffer, label: &Label2, mapping: &Mapping) {
    let (x, y) = mapping.apply(label.x, label.y);
    for (i, ch) in label.text.chars().enumerate() {
        buffer.paint(x + i as i64, y, ch, ColorTag::White, label.depth + 1.0);
    }
}

/// Rasterize a render frame into a fresh buffer.
///
/// Pure: identical inputs produce identical buffers.
pub fn rasterize(frame: &RenderFrame, width: usize, height: usize) -> RasterBuffer {
    let mut buffer = RasterBuffer::new(width, height);
    let mapping = Mapping::fit(frame, width, height);

    // Back-to-front; stable sort keeps scene order on depth ties.
    let mut order: Vec<&Line2> = frame.lines.iter().collect();
    order.sort_by(|a, b| {
        a.depth
            .partial_cmp(&b.depth)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for line in order {
        draw_line(&mut buffer, line, &mapping);
    }
    for label in &frame.labels {
        draw_label(&mut buffer, label, &mapping);
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::projection::Projection;
    use crate::render::scene::{build_render_frame, SceneOptions};
    use crate::surface::{AxisLabels, Surface};

    fn test_surface() -> Surface {
        Surface::from_fn(
            crate::grid::linspace(0.1, 2.0, 6).unwrap(),
            crate::grid::linspace(80.0, 120.0, 6).unwrap(),
            AxisLabels::default(),
            |x, y| 0.2 + 0.05 * x + 0.0005 * (y - 100.0).abs(),
        )
        .unwrap()
    }

    fn one_line_frame(depth: f64, style: LineStyle, z_value: Option<f64>) -> RenderFrame {
        RenderFrame {
            lines: vec![Line2 {
                x0: 0.0,
                y0: 10.0,
                x1: 79.0,
                y1: 10.0,
                depth,
                style,
                z_value,
                shade: None,
            }],
            labels: vec![],
            scene_width: 80.0,
            scene_height: 24.0,
        }
    }

    #[test]
    fn empty_buffer_is_unpainted() {
        let b = RasterBuffer::new(4, 3);
        assert_eq!(b.width(), 4);
        assert_eq!(b.height(), 3);
        for cell in b.cells() {
            assert_eq!(cell.ch, ' ');
            assert_eq!(cell.depth, f64::NEG_INFINITY);
        }
    }

    #[test]
    fn height_band_table_matches_contract() {
        // z' = (z+1)/2 band boundaries from the styling table
        assert_eq!(height_band(-1.0), ('\u{00b7}', ColorTag::Gray));
        assert_eq!(height_band(-0.8), ('\u{2219}', ColorTag::Blue)); // z'=0.1
        assert_eq!(height_band(-0.5), (':', ColorTag::Cyan)); // z'=0.25
        assert_eq!(height_band(-0.2), ('\u{2591}', ColorTag::Green)); // z'=0.4
        assert_eq!(height_band(0.2), ('\u{2592}', ColorTag::Yellow)); // z'=0.6
        assert_eq!(height_band(0.5), ('\u{2593}', ColorTag::Magenta)); // z'=0.75
        assert_eq!(height_band(0.8), ('\u{2588}', ColorTag::Red)); // z'=0.9
        assert_eq!(height_band(1.0), ('\u{2580}', ColorTag::White));
    }

    #[test]
    fn height_band_boundary_values() {
        // 0.08 boundary falls into the second band (half-open ranges)
        assert_eq!(height_band(2.0 * 0.08 - 1.0).1, ColorTag::Blue);
        assert_eq!(height_band(2.0 * 0.95 - 1.0).1, ColorTag::White);
    }

    #[test]
    fn closer_line_overdraws_farther() {
        let mut frame = one_line_frame(0.0, LineStyle::Grid, None);
        frame.lines.push(Line2 {
            depth: 5.0,
            ..frame.lines[0].clone()
        });
        // Far line drawn first (grid '─'), near line is identical geometry;
        // near wins every cell.
        let buffer = rasterize(&frame, 80, 24);
        let painted: Vec<&Cell> = buffer.cells().iter().filter(|c| c.ch != ' ').collect();
        assert!(!painted.is_empty());
        for cell in painted {
            assert_eq!(cell.depth, 5.0);
        }
    }

    #[test]
    fn equal_depth_resolves_by_draw_order() {
        let mut frame = one_line_frame(1.0, LineStyle::Grid, None);
        frame.lines.push(Line2 {
            style: LineStyle::Surface,
            z_value: Some(1.0),
            ..frame.lines[0].clone()
        });
        let buffer = rasterize(&frame, 80, 24);
        // The later surface line must win the tie.
        let painted: Vec<&Cell> = buffer.cells().iter().filter(|c| c.ch != ' ').collect();
        assert!(painted.iter().all(|c| c.ch == '\u{2580}'));
    }

    #[test]
    fn rasterization_is_deterministic() {
        let surface = test_surface();
        let proj = Projection::default();
        let frame = build_render_frame(&surface, &proj, &SceneOptions::default());
        let a = rasterize(&frame, 80, 24);
        let b = rasterize(&frame, 80, 24);
        assert_eq!(a, b);
    }

    #[test]
    fn full_scene_paints_inside_bounds() {
        let surface = test_surface();
        let frame = build_render_frame(&surface, &Projection::default(), &SceneOptions::default());
        let buffer = rasterize(&frame, 80, 24);
        let painted = buffer.cells().iter().filter(|c| c.ch != ' ').count();
        assert!(painted > 50, "expected a substantial scene, got {painted}");
    }

    #[test]
    fn labels_paint_over_lines() {
        let mut frame = one_line_frame(3.0, LineStyle::Grid, None);
        frame.labels.push(Label2 {
            x: 40.0,
            y: 10.0,
            depth: 3.0,
            text: "iv".into(),
        });
        let buffer = rasterize(&frame, 80, 24);
        let found = (0..24).any(|y| {
            let row: String = (0..80).map(|x| buffer.get(x, y).ch).collect();
            row.contains("iv")
        });
        assert!(found, "label should overwrite the line somewhere");
    }

    #[test]
    fn out_of_bounds_segments_are_clipped() {
        let frame = RenderFrame {
            lines: vec![Line2 {
                x0: -50.0,
                y0: -50.0,
                x1: 200.0,
                y1: 100.0,
                depth: 0.0,
                style: LineStyle::Grid,
                z_value: None,
                shade: None,
            }],
            labels: vec![],
            scene_width: 80.0,
            scene_height: 24.0,
        };
        // Must not panic; pixels outside the buffer are dropped.
        let buffer = rasterize(&frame, 20, 10);
        assert!(buffer.cells().iter().any(|c| c.ch != ' '));
    }

    #[test]
    fn to_ansi_emits_colors_and_reset() {
        let frame = one_line_frame(0.0, LineStyle::Surface, Some(1.0));
        let buffer = rasterize(&frame, 40, 12);
        let text = buffer.to_ansi();
        assert!(text.contains("\x1b[37m"), "white surface band expected");
        assert!(text.contains("\x1b[0m"));
        assert_eq!(text.lines().count(), 12);
    }

    #[test]
    fn glyph_angle_selection() {
        let (h, _) = style_glyph(LineStyle::Grid, 10.0, 1.0);
        assert_eq!(h, '\u{2500}');
        let (v, _) = style_glyph(LineStyle::Grid, 1.0, 10.0);
        assert_eq!(v, '\u{2502}');
        let (hw, _) = style_glyph(LineStyle::Wireframe, 10.0, 1.0);
        assert_eq!(hw, '\u{2501}');
        let (d1, _) = style_glyph(LineStyle::Grid, 5.0, 5.0);
        assert_eq!(d1, '\u{2572}');
        let (d2, _) = style_glyph(LineStyle::Grid, 5.0, -5.0);
        assert_eq!(d2, '\u{2571}');
    }
}
