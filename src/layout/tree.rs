//! The page tree: pages of positioned primitives
//!
//! Coordinates are points with the origin at the top-left corner of the page
//! and y growing downward. Text runs are positioned by their baseline.

use serde::Serialize;

use crate::assets::{FontHandle, ImageHandle};
use crate::types::{Color, Rect, Size};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageTree {
    pub page_size: Size,
    pub pages: Vec<Page>,
}

impl PageTree {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// All text runs in document order
    pub fn text_runs(&self) -> impl Iterator<Item = &TextRun> {
        self.pages.iter().flat_map(|page| page.text_runs())
    }

    /// Pretty JSON used by the debug dump
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    /// 1-based page number
    pub number: usize,
    pub primitives: Vec<PlacedPrimitive>,
}

impl Page {
    pub fn new(number: usize) -> Self {
        Self {
            number,
            primitives: Vec::new(),
        }
    }

    pub fn text_runs(&self) -> impl Iterator<Item = &TextRun> {
        self.primitives.iter().filter_map(|primitive| match primitive {
            PlacedPrimitive::Text(run) => Some(run),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PlacedPrimitive {
    Text(TextRun),
    Image(PlacedImage),
    Rule(Rule),
}

/// One line of shaped text in a single font
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRun {
    pub font: FontHandle,
    pub size: f64,
    pub color: Color,
    pub x: f64,
    /// Baseline position
    pub y: f64,
    pub text: String,
    /// Glyph ids, one per character of `text`
    pub glyphs: Vec<u16>,
    /// Advance width of the run in points, excluding word spacing
    pub width: f64,
    /// Extra space added after each space glyph (justified lines)
    pub word_spacing: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedImage {
    pub image: ImageHandle,
    pub rect: Rect,
    /// 1.0 is fully opaque
    pub opacity: f64,
}

/// A straight stroked line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub width: f64,
    pub color: Color,
}

impl Rule {
    pub fn horizontal(x: f64, y: f64, length: f64, width: f64, color: Color) -> Self {
        Self {
            x1: x,
            y1: y,
            x2: x + length,
            y2: y,
            width,
            color,
        }
    }

    pub fn vertical(x: f64, y: f64, length: f64, width: f64, color: Color) -> Self {
        Self {
            x1: x,
            y1: y,
            x2: x,
            y2: y + length,
            width,
            color,
        }
    }
}
