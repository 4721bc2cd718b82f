//! Drawing surface for one page
//!
//! Wraps a pdf-writer content stream and converts page tree coordinates
//! (top-left origin, y down) into PDF user space (bottom-left origin, y up).

use pdf_writer::{Content, Name, Str};

use crate::layout::{PlacedImage, Rule, TextRun};
use crate::types::Color;

/// How a font expects its text strings to be encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// One WinAnsi byte per glyph (standard Type1 fonts)
    WinAnsi,
    /// Two big-endian bytes per glyph id (Type0 fonts with Identity-H)
    IdentityH,
}

impl TextEncoding {
    fn push(&self, glyph: u16, out: &mut Vec<u8>) {
        match self {
            TextEncoding::WinAnsi => out.push(glyph as u8),
            TextEncoding::IdentityH => out.extend_from_slice(&glyph.to_be_bytes()),
        }
    }
}

pub struct PageCanvas {
    content: Content,
    page_height: f64,
}

impl PageCanvas {
    pub fn new(page_height: f64) -> Self {
        Self {
            content: Content::new(),
            page_height,
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.content.finish()
    }

    fn flip(&self, y: f64) -> f32 {
        (self.page_height - y) as f32
    }

    fn set_fill_color(&mut self, color: Color) {
        self.content
            .set_fill_rgb(color.r as f32, color.g as f32, color.b as f32);
    }

    fn set_stroke_color(&mut self, color: Color) {
        self.content
            .set_stroke_rgb(color.r as f32, color.g as f32, color.b as f32);
    }

    /// Run `draw` with a graphics state (opacity) applied
    pub fn with_graphics_state(&mut self, state: Option<&str>, draw: impl FnOnce(&mut Self)) {
        match state {
            Some(name) => {
                self.content.save_state();
                self.content.set_parameters(Name(name.as_bytes()));
                draw(self);
                self.content.restore_state();
            }
            None => draw(self),
        }
    }

    pub fn draw_rule(&mut self, rule: &Rule) {
        self.content.save_state();
        self.set_stroke_color(rule.color);
        self.content.set_line_width(rule.width as f32);
        self.content.move_to(rule.x1 as f32, self.flip(rule.y1));
        self.content.line_to(rule.x2 as f32, self.flip(rule.y2));
        self.content.stroke();
        self.content.restore_state();
    }

    pub fn draw_image(&mut self, resource: &str, image: &PlacedImage) {
        let rect = image.rect;
        self.content.save_state();
        self.content.transform([
            rect.width as f32,
            0.0,
            0.0,
            rect.height as f32,
            rect.x as f32,
            self.flip(rect.bottom()),
        ]);
        self.content.x_object(Name(resource.as_bytes()));
        self.content.restore_state();
    }

    /// Draw a text run. Justified runs are written as a TJ array with an
    /// adjustment after every space, which works for both encodings.
    pub fn draw_text(&mut self, resource: &str, encoding: TextEncoding, run: &TextRun) {
        self.content.begin_text();
        self.content
            .set_font(Name(resource.as_bytes()), run.size as f32);
        self.set_fill_color(run.color);
        self.content.next_line(run.x as f32, self.flip(run.y));

        if run.word_spacing == 0.0 {
            let mut bytes = Vec::with_capacity(run.glyphs.len() * 2);
            for glyph in &run.glyphs {
                encoding.push(*glyph, &mut bytes);
            }
            self.content.show(Str(&bytes));
        } else {
            // TJ adjustments are in thousandths of text space, positive moves left
            let adjust = -(run.word_spacing * 1000.0 / run.size) as f32;
            let mut segments: Vec<Vec<u8>> = vec![Vec::new()];
            for (ch, glyph) in run.text.chars().zip(&run.glyphs) {
                if let Some(segment) = segments.last_mut() {
                    encoding.push(*glyph, segment);
                }
                if ch == ' ' {
                    segments.push(Vec::new());
                }
            }

            let mut positioned = self.content.show_positioned();
            let mut items = positioned.items();
            let last = segments.len() - 1;
            for (index, segment) in segments.iter().enumerate() {
                if !segment.is_empty() {
                    items.show(Str(segment));
                }
                if index < last {
                    items.adjust(adjust);
                }
            }
        }

        self.content.end_text();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_h_encoding() {
        let mut out = Vec::new();
        TextEncoding::IdentityH.push(0x0123, &mut out);
        TextEncoding::WinAnsi.push(b'A' as u16, &mut out);
        assert_eq!(out, vec![0x01, 0x23, b'A']);
    }

    #[test]
    fn test_rule_is_flipped() {
        let mut canvas = PageCanvas::new(800.0);
        canvas.draw_rule(&Rule::horizontal(10.0, 100.0, 50.0, 1.0, Color::black()));
        let bytes = canvas.finish();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("10 700 m"), "{}", text);
        assert!(text.contains("60 700 l"), "{}", text);
    }
}
