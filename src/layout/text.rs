//! Line breaking and justification
//!
//! Greedy wrapping without hyphenation. Runs of whitespace collapse to one
//! space, `\n` starts a new paragraph, and a word wider than the line is
//! broken between glyphs.

use crate::assets::Shaper;

const WIDTH_EPSILON: f64 = 1e-6;

/// A wrapped line, shaped and measured
#[derive(Debug, Clone, PartialEq)]
pub struct ShapedLine {
    pub text: String,
    pub glyphs: Vec<u16>,
    /// Advance width in points
    pub width: f64,
    pub space_count: usize,
    /// Last line of a paragraph (never justified)
    pub ends_paragraph: bool,
}

#[derive(Default)]
struct LineBuf {
    text: String,
    glyphs: Vec<u16>,
    units: u32,
    space_count: usize,
}

impl LineBuf {
    fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    fn push(&mut self, ch: char, id: u16, advance: u16) {
        self.text.push(ch);
        self.glyphs.push(id);
        self.units += advance as u32;
        if ch == ' ' {
            self.space_count += 1;
        }
    }

    fn finish(&mut self, font_size: f64, ends_paragraph: bool) -> ShapedLine {
        let buf = std::mem::take(self);
        ShapedLine {
            width: units_to_points(buf.units, font_size),
            text: buf.text,
            glyphs: buf.glyphs,
            space_count: buf.space_count,
            ends_paragraph,
        }
    }
}

fn units_to_points(units: u32, font_size: f64) -> f64 {
    units as f64 * font_size / 1000.0
}

/// Wraps text for one font at one size
pub struct LineBreaker<'a, 'f> {
    shaper: &'a Shaper<'f>,
    font_size: f64,
    max_width: f64,
}

impl<'a, 'f> LineBreaker<'a, 'f> {
    pub fn new(shaper: &'a Shaper<'f>, font_size: f64, max_width: f64) -> Self {
        Self {
            shaper,
            font_size,
            max_width,
        }
    }

    fn max_units(&self) -> f64 {
        self.max_width * 1000.0 / self.font_size + WIDTH_EPSILON
    }

    pub fn break_text(&self, text: &str) -> Vec<ShapedLine> {
        let mut lines = Vec::new();
        for paragraph in text.split('\n') {
            self.break_paragraph(paragraph, &mut lines);
        }
        lines
    }

    fn break_paragraph(&self, paragraph: &str, lines: &mut Vec<ShapedLine>) {
        let max_units = self.max_units();
        let space = self.shaper.glyph(' ');
        let mut current = LineBuf::default();

        for word in paragraph.split_whitespace() {
            let shaped: Vec<(char, u16, u16)> = word
                .chars()
                .map(|ch| {
                    let glyph = self.shaper.glyph(ch);
                    (ch, glyph.id, glyph.advance)
                })
                .collect();
            let word_units: u32 = shaped.iter().map(|(_, _, adv)| *adv as u32).sum();

            if !current.is_empty() {
                let needed = current.units + space.advance as u32 + word_units;
                if needed as f64 <= max_units {
                    current.push(' ', space.id, space.advance);
                    for (ch, id, advance) in shaped {
                        current.push(ch, id, advance);
                    }
                    continue;
                }
                lines.push(current.finish(self.font_size, false));
            }

            if word_units as f64 <= max_units {
                for (ch, id, advance) in shaped {
                    current.push(ch, id, advance);
                }
                continue;
            }

            // overlong word: break between glyphs, keeping at least one per line
            for (ch, id, advance) in shaped {
                if !current.is_empty() && (current.units + advance as u32) as f64 > max_units {
                    lines.push(current.finish(self.font_size, false));
                }
                current.push(ch, id, advance);
            }
        }

        lines.push(current.finish(self.font_size, true));
    }
}

/// Extra space per space glyph that stretches `line` to `available` width.
/// Paragraph-final lines and lines without spaces are not stretched.
pub fn justify_spacing(line: &ShapedLine, available: f64) -> f64 {
    if line.ends_paragraph || line.space_count == 0 {
        return 0.0;
    }
    let extra = available - line.width;
    if extra <= 0.1 {
        return 0.0;
    }
    extra / line.space_count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::StandardFont;

    const COURIER: Shaper<'static> = Shaper::Standard(StandardFont::Courier);

    // Courier: every glyph is 600 units, so 6pt per glyph at 10pt
    fn wrap(text: &str, max_glyphs: usize) -> Vec<ShapedLine> {
        LineBreaker::new(&COURIER, 10.0, max_glyphs as f64 * 6.0).break_text(text)
    }

    fn texts(lines: &[ShapedLine]) -> Vec<&str> {
        lines.iter().map(|line| line.text.as_str()).collect()
    }

    #[test]
    fn test_greedy_wrap() {
        let lines = wrap("the quick brown fox jumps", 10);
        assert_eq!(texts(&lines), vec!["the quick", "brown fox", "jumps"]);
        assert_eq!(lines[0].width, 54.0);
        assert_eq!(lines[0].space_count, 1);
        assert!(!lines[0].ends_paragraph);
        assert!(lines[2].ends_paragraph);
    }

    #[test]
    fn test_exact_fit() {
        let lines = wrap("abcde fghij", 11);
        assert_eq!(texts(&lines), vec!["abcde fghij"]);
    }

    #[test]
    fn test_whitespace_collapses() {
        let lines = wrap("  a   b\t c  ", 40);
        assert_eq!(texts(&lines), vec!["a b c"]);
    }

    #[test]
    fn test_paragraphs_and_empty_lines() {
        let lines = wrap("one\n\ntwo", 40);
        assert_eq!(texts(&lines), vec!["one", "", "two"]);
        assert!(lines.iter().all(|line| line.ends_paragraph));
        assert_eq!(wrap("", 40).len(), 1);
    }

    #[test]
    fn test_overlong_word_breaks_between_glyphs() {
        let lines = wrap("ab abcdefghijkl cd", 5);
        assert_eq!(texts(&lines), vec!["ab", "abcde", "fghij", "kl cd"]);
        let rejoined: String = lines.iter().map(|line| line.text.replace(' ', "")).collect();
        assert_eq!(rejoined, "ababcdefghijklcd");
    }

    #[test]
    fn test_glyphs_match_text() {
        let lines = wrap("Hello world", 40);
        assert_eq!(lines[0].glyphs.len(), lines[0].text.chars().count());
        assert_eq!(lines[0].glyphs[0], b'H' as u16);
    }

    #[test]
    fn test_justify_spacing() {
        let lines = wrap("aa bb cc dd", 8);
        assert_eq!(texts(&lines), vec!["aa bb cc", "dd"]);
        // 8 glyphs fill 48pt exactly: nothing to stretch
        assert_eq!(justify_spacing(&lines[0], 48.0), 0.0);
        assert_eq!(justify_spacing(&lines[0], 60.0), 6.0);
        assert_eq!(justify_spacing(&lines[1], 60.0), 0.0);
    }
}
