//! Surface orientation handling for the canonical grid layout.
//!
//! The grid is always stored portrait-first: rows follow the longer surface
//! side and columns the shorter one. On a landscape surface touch coordinates
//! and block extents are transposed so the same grid shape serves both.

use std::fmt;

/// Orientation of the drawable surface, derived from its pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    /// Height >= width. Grid rows run down the screen.
    #[default]
    Portrait,
    /// Width > height. Grid rows run across the screen.
    Landscape,
}

impl Orientation {
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        if width > height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }

    /// Split surface dimensions into (long side, short side).
    pub fn canonical_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        match self {
            Orientation::Portrait => (height, width),
            Orientation::Landscape => (width, height),
        }
    }

    /// Transform a surface coordinate into canonical (column axis, row axis) space.
    pub fn transform_touch(&self, x: i32, y: i32) -> (i32, i32) {
        match self {
            Orientation::Portrait => (x, y),
            // Rows follow the long side, which is x in landscape.
            Orientation::Landscape => (y, x),
        }
    }

    /// Top-left surface pixel of the block at (row, col).
    pub fn block_origin(&self, row: u32, col: u32, block_size: u32) -> (u32, u32) {
        match self {
            Orientation::Portrait => (col * block_size, row * block_size),
            Orientation::Landscape => (row * block_size, col * block_size),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Portrait => write!(f, "portrait"),
            Orientation::Landscape => write!(f, "landscape"),
        }
    }
}
