//! Geometry and color types shared by layout and rendering

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rectangle with position and size (top-left origin, y grows downward)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }
}

/// Size with width and height
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Margins
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl Margins {
    pub fn new(top: f64, bottom: f64, left: f64, right: f64) -> Self {
        Self { top, bottom, left, right }
    }

    pub fn uniform(value: f64) -> Self {
        Self::new(value, value, value, value)
    }
}

impl Default for Margins {
    fn default() -> Self {
        // report template page margins plus the body margin, in points
        Self::new(48.0, 72.0, 28.0, 28.0)
    }
}

/// Named or explicit page size, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageSize {
    A4,
    A5,
    Letter,
    Legal,
    Custom(Size),
}

impl PageSize {
    pub fn size(&self) -> Size {
        match self {
            PageSize::A4 => Size::new(595.28, 841.89),
            PageSize::A5 => Size::new(419.53, 595.28),
            PageSize::Letter => Size::new(612.0, 792.0),
            PageSize::Legal => Size::new(612.0, 1008.0),
            PageSize::Custom(size) => *size,
        }
    }
}

impl Default for PageSize {
    fn default() -> Self {
        PageSize::A4
    }
}

impl FromStr for PageSize {
    type Err = String;

    /// Accepts `A4`, `A5`, `Letter`, `Legal` (any case) or `<width>x<height>` in points.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a4" => Ok(PageSize::A4),
            "a5" => Ok(PageSize::A5),
            "letter" => Ok(PageSize::Letter),
            "legal" => Ok(PageSize::Legal),
            other => {
                let (w, h) = other
                    .split_once('x')
                    .ok_or_else(|| format!("unknown page size '{}'", s))?;
                let width: f64 = w.trim().parse().map_err(|_| format!("invalid width in '{}'", s))?;
                let height: f64 = h.trim().parse().map_err(|_| format!("invalid height in '{}'", s))?;
                if !(width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite()) {
                    return Err(format!("page size must be positive: '{}'", s));
                }
                Ok(PageSize::Custom(Size::new(width, height)))
            }
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSize::A4 => f.write_str("A4"),
            PageSize::A5 => f.write_str("A5"),
            PageSize::Letter => f.write_str("Letter"),
            PageSize::Legal => f.write_str("Legal"),
            PageSize::Custom(size) => write!(f, "{}x{}", size.width, size.height),
        }
    }
}

impl Serialize for PageSize {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PageSize {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// RGB color, components in 0.0-1.0. Serialized as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    pub fn from_hex(hex: &str) -> Result<Self, String> {
        let hex = hex.trim().trim_start_matches('#');
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return Err(format!("invalid hex color '#{}'", hex)),
        };

        let channel = |range: std::ops::Range<usize>| {
            expanded
                .get(range)
                .and_then(|part| u8::from_str_radix(part, 16).ok())
                .map(|v| v as f64 / 255.0)
                .ok_or_else(|| format!("invalid hex color '#{}'", hex))
        };

        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }

    pub fn to_hex(&self) -> String {
        let to_byte = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!("#{:02x}{:02x}{:02x}", to_byte(self.r), to_byte(self.g), to_byte(self.b))
    }

    pub fn black() -> Self {
        Self { r: 0.0, g: 0.0, b: 0.0 }
    }

    pub fn white() -> Self {
        Self { r: 1.0, g: 1.0, b: 1.0 }
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// Horizontal alignment of text lines and images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl Alignment {
    /// X offset of a line of `used` width inside `available` width.
    pub fn offset(&self, available: f64, used: f64) -> f64 {
        let free = (available - used).max(0.0);
        match self {
            Alignment::Center => free / 2.0,
            Alignment::Right => free,
            Alignment::Left | Alignment::Justify => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_hex() {
        let color = Color::from_hex("#3498db").unwrap();
        assert_eq!(color.to_hex(), "#3498db");
        assert_eq!(Color::from_hex("#333").unwrap().to_hex(), "#333333");
        assert!(Color::from_hex("#12345").is_err());
        assert!(Color::from_hex("zzzzzz").is_err());
    }

    #[test]
    fn test_page_size_parse() {
        assert_eq!("a4".parse::<PageSize>().unwrap(), PageSize::A4);
        assert_eq!("Letter".parse::<PageSize>().unwrap(), PageSize::Letter);
        assert_eq!(
            "300x400".parse::<PageSize>().unwrap(),
            PageSize::Custom(Size::new(300.0, 400.0))
        );
        assert!("0x400".parse::<PageSize>().is_err());
        assert!("tabloid".parse::<PageSize>().is_err());
    }

    #[test]
    fn test_alignment_offset() {
        assert_eq!(Alignment::Left.offset(100.0, 40.0), 0.0);
        assert_eq!(Alignment::Center.offset(100.0, 40.0), 30.0);
        assert_eq!(Alignment::Right.offset(100.0, 40.0), 60.0);
        assert_eq!(Alignment::Right.offset(100.0, 140.0), 0.0);
    }
}
