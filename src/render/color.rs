//! Terminal color tags and their ANSI SGR mapping.

use serde::{Deserialize, Serialize};

/// The palette used by the rasterizer.
///
/// Tags are mapped to basic 8-color terminal foregrounds (plus bright
/// black for gray) only at the display boundary; everything upstream works
/// with the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTag {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    Gray,
}

impl ColorTag {
    /// ANSI SGR foreground code.
    pub fn sgr(self) -> u8 {
        match self {
            ColorTag::Black => 30,
            ColorTag::Red => 31,
            ColorTag::Green => 32,
            ColorTag::Yellow => 33,
            ColorTag::Blue => 34,
            ColorTag::Magenta => 35,
            ColorTag::Cyan => 36,
            ColorTag::White => 37,
            ColorTag::Gray => 90,
        }
    }
}
