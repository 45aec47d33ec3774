//! Pointer colors. Each touch slot gets a fixed ARGB color.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::config::MAX_TOUCHPOINTS;

/// Packed 0xAARRGGBB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
#[repr(transparent)]
pub struct Color(pub u32);

impl Color {
    pub const BLACK: Color = Color(0xFF00_0000);
    pub const BLUE: Color = Color(0xFF00_00FF);
    pub const RED: Color = Color(0xFFFF_0000);
    pub const GREEN: Color = Color(0xFF00_FF00);
    pub const YELLOW: Color = Color(0xFFFF_FF00);
    pub const CYAN: Color = Color(0xFF00_FFFF);
    pub const MAGENTA: Color = Color(0xFFFF_00FF);
    pub const DARK_GRAY: Color = Color(0xFF44_4444);
    pub const WHITE: Color = Color(0xFFFF_FFFF);
    pub const LIGHT_GRAY: Color = Color(0xFFCC_CCCC);
    pub const GRAY: Color = Color(0xFF88_8888);

    pub const fn argb(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08X}", self.0)
    }
}

impl FromStr for Color {
    type Err = String;

    /// Accepts a few color names, `#RRGGBB`, `#AARRGGBB` and `0xAARRGGBB`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let named = match lower.as_str() {
            "black" => Some(Color::BLACK),
            "blue" => Some(Color::BLUE),
            "red" => Some(Color::RED),
            "green" => Some(Color::GREEN),
            "yellow" => Some(Color::YELLOW),
            "cyan" => Some(Color::CYAN),
            "magenta" => Some(Color::MAGENTA),
            "dark-gray" | "dkgray" => Some(Color::DARK_GRAY),
            "white" => Some(Color::WHITE),
            "light-gray" | "ltgray" => Some(Color::LIGHT_GRAY),
            "gray" => Some(Color::GRAY),
            _ => None,
        };
        if let Some(color) = named {
            return Ok(color);
        }

        let hex = lower
            .strip_prefix('#')
            .or_else(|| lower.strip_prefix("0x"))
            .ok_or_else(|| format!("Invalid color '{}'. Use a name, #RRGGBB or #AARRGGBB", s))?;
        let value = u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid color '{}': {}", s, e))?;
        match hex.len() {
            6 => Ok(Color(0xFF00_0000 | value)),
            8 => Ok(Color(value)),
            _ => Err(format!("Invalid color '{}'. Expected 6 or 8 hex digits", s)),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Fixed mapping from pointer slot to display color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorTable {
    colors: [Color; MAX_TOUCHPOINTS],
}

impl ColorTable {
    pub const DEFAULT: ColorTable = ColorTable {
        colors: [
            Color::BLUE,
            Color::RED,
            Color::GREEN,
            Color::YELLOW,
            Color::CYAN,
            Color::MAGENTA,
            Color::DARK_GRAY,
            Color::WHITE,
            Color::LIGHT_GRAY,
            Color::GRAY,
        ],
    };

    /// Slot used for a pointer id. Ids past the table wrap around.
    pub fn slot_for(&self, touch_id: i32) -> usize {
        touch_id.rem_euclid(MAX_TOUCHPOINTS as i32) as usize
    }

    pub fn color_for(&self, touch_id: i32) -> Color {
        self.colors[self.slot_for(touch_id)]
    }

    /// Reverse lookup, used when reading a rendered frame back.
    pub fn slot_of(&self, color: Color) -> Option<usize> {
        self.colors.iter().position(|&c| c == color)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Color)> + '_ {
        self.colors.iter().copied().enumerate()
    }
}

impl Default for ColorTable {
    fn default() -> Self {
        Self::DEFAULT
    }
}
