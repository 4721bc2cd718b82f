//! Font assets: embedded TrueType/OpenType programs and the standard PDF fonts
//!
//! Layout measures text through a [`Shaper`], which maps characters to glyph
//! ids and advances. Advances are expressed in 1/1000 em, the unit PDF uses
//! for glyph widths.

use ttf_parser::{Face, GlyphId};

use crate::winansi;

/// Name id of the font family in the OpenType `name` table
const NAME_ID_FAMILY: u16 = 1;
/// Name id of the PostScript name in the OpenType `name` table
const NAME_ID_POSTSCRIPT: u16 = 6;

/// The built-in Type1 fonts every PDF reader provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    TimesRoman,
    Courier,
}

impl StandardFont {
    pub const ALL: [StandardFont; 5] = [
        StandardFont::Helvetica,
        StandardFont::HelveticaBold,
        StandardFont::HelveticaOblique,
        StandardFont::TimesRoman,
        StandardFont::Courier,
    ];

    /// PostScript base font name, also used as the asset name
    pub fn base_font(&self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::HelveticaOblique => "Helvetica-Oblique",
            StandardFont::TimesRoman => "Times-Roman",
            StandardFont::Courier => "Courier",
        }
    }

    fn widths(&self) -> Option<&'static [u16; 95]> {
        match self {
            StandardFont::Helvetica | StandardFont::HelveticaOblique => Some(&HELVETICA_WIDTHS),
            StandardFont::HelveticaBold => Some(&HELVETICA_BOLD_WIDTHS),
            StandardFont::TimesRoman => Some(&TIMES_ROMAN_WIDTHS),
            StandardFont::Courier => None,
        }
    }

    fn default_width(&self) -> u16 {
        match self {
            StandardFont::Helvetica
            | StandardFont::HelveticaBold
            | StandardFont::HelveticaOblique => 556,
            StandardFont::TimesRoman => 500,
            StandardFont::Courier => 600,
        }
    }

    /// Advance of a WinAnsi code in 1/1000 em, from the AFM width tables.
    /// Accented Latin-1 letters take the width of their base letter.
    pub fn advance(&self, ch: char) -> u16 {
        let Some(widths) = self.widths() else {
            return 600;
        };
        let ascii = match ch as u32 {
            0x20..=0x7E => Some(ch as u8),
            _ => match winansi::encode_char_lossy(ch) {
                winansi::REPLACEMENT => None,
                folded @ 0x20..=0x7E => Some(folded),
                _ => None,
            },
        };
        ascii
            .map(|b| widths[(b - 0x20) as usize])
            .unwrap_or_else(|| self.default_width())
    }

    pub fn metrics(&self) -> FontMetrics {
        match self {
            StandardFont::Helvetica
            | StandardFont::HelveticaBold
            | StandardFont::HelveticaOblique => FontMetrics::new(718.0, 207.0, 0.0),
            StandardFont::TimesRoman => FontMetrics::new(683.0, 217.0, 0.0),
            StandardFont::Courier => FontMetrics::new(629.0, 157.0, 0.0),
        }
    }
}

/// Vertical font metrics in 1/1000 em (descent is positive)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontMetrics {
    pub ascent: f64,
    pub descent: f64,
    pub line_gap: f64,
}

impl FontMetrics {
    pub fn new(ascent: f64, descent: f64, line_gap: f64) -> Self {
        Self { ascent, descent, line_gap }
    }

    /// Ascent in points at `font_size`
    pub fn ascent_at(&self, font_size: f64) -> f64 {
        self.ascent * font_size / 1000.0
    }

    /// Descent in points at `font_size`
    pub fn descent_at(&self, font_size: f64) -> f64 {
        self.descent * font_size / 1000.0
    }
}

/// A TrueType/OpenType font program and the header data read at load time.
#[derive(Debug)]
pub struct TrueTypeFont {
    data: Vec<u8>,
    family: String,
    postscript_name: String,
    units_per_em: u16,
    metrics: FontMetrics,
    bbox: [f64; 4],
}

impl TrueTypeFont {
    /// Validate and load a font program with ttf-parser
    pub fn from_bytes(data: Vec<u8>, fallback_name: &str) -> Result<Self, String> {
        let face = Face::parse(&data, 0).map_err(|e| e.to_string())?;

        let units_per_em = face.units_per_em();
        if units_per_em == 0 {
            return Err("font declares zero units per em".to_string());
        }
        let scale = 1000.0 / units_per_em as f64;

        let name_by_id = |id: u16| {
            face.names()
                .into_iter()
                .filter(|name| name.name_id == id)
                .find_map(|name| name.to_string())
        };
        let family = name_by_id(NAME_ID_FAMILY).unwrap_or_else(|| fallback_name.to_string());
        let postscript_name = name_by_id(NAME_ID_POSTSCRIPT)
            .unwrap_or_else(|| family.clone())
            .chars()
            .filter(|c| c.is_ascii_graphic() && !"()<>[]{}/%#".contains(*c))
            .collect::<String>();

        let metrics = FontMetrics::new(
            face.ascender() as f64 * scale,
            (face.descender() as f64).abs() * scale,
            face.line_gap() as f64 * scale,
        );
        let bbox = face.global_bounding_box();
        let bbox = [
            bbox.x_min as f64 * scale,
            bbox.y_min as f64 * scale,
            bbox.x_max as f64 * scale,
            bbox.y_max as f64 * scale,
        ];

        Ok(Self {
            data,
            family,
            postscript_name: if postscript_name.is_empty() {
                fallback_name.replace(' ', "")
            } else {
                postscript_name
            },
            units_per_em,
            metrics,
            bbox,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn postscript_name(&self) -> &str {
        &self.postscript_name
    }

    pub fn units_per_em(&self) -> u16 {
        self.units_per_em
    }

    /// Font bounding box in 1/1000 em: [x_min, y_min, x_max, y_max]
    pub fn bbox(&self) -> [f64; 4] {
        self.bbox
    }

    pub fn face(&self) -> Result<Face<'_>, String> {
        Face::parse(&self.data, 0).map_err(|e| e.to_string())
    }
}

#[derive(Debug)]
pub enum FontSource {
    Standard(StandardFont),
    TrueType(TrueTypeFont),
}

/// A loaded font registered in the asset store
#[derive(Debug)]
pub struct FontAsset {
    name: String,
    source: FontSource,
}

impl FontAsset {
    pub fn standard(font: StandardFont) -> Self {
        Self {
            name: font.base_font().to_string(),
            source: FontSource::Standard(font),
        }
    }

    pub fn truetype(name: impl Into<String>, data: Vec<u8>) -> Result<Self, String> {
        let name = name.into();
        let font = TrueTypeFont::from_bytes(data, &name)?;
        Ok(Self {
            name,
            source: FontSource::TrueType(font),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &FontSource {
        &self.source
    }

    pub fn is_standard(&self) -> bool {
        matches!(self.source, FontSource::Standard(_))
    }

    pub fn metrics(&self) -> FontMetrics {
        match &self.source {
            FontSource::Standard(font) => font.metrics(),
            FontSource::TrueType(font) => font.metrics,
        }
    }

    pub fn shaper(&self) -> Result<Shaper<'_>, String> {
        match &self.source {
            FontSource::Standard(font) => Ok(Shaper::Standard(*font)),
            FontSource::TrueType(font) => {
                let face = font.face()?;
                let scale = 1000.0 / font.units_per_em as f64;
                Ok(Shaper::TrueType { face, scale })
            }
        }
    }
}

/// One shaped glyph: its id in the font's encoding and its advance in 1/1000 em.
///
/// For standard fonts the id is the WinAnsi code; for TrueType fonts it is the
/// glyph index, which is also the CID written into the PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glyph {
    pub id: u16,
    pub advance: u16,
}

/// Maps characters to glyphs for one font
pub enum Shaper<'a> {
    Standard(StandardFont),
    TrueType { face: Face<'a>, scale: f64 },
}

impl Shaper<'_> {
    pub fn glyph(&self, ch: char) -> Glyph {
        let ch = if ch.is_whitespace() { ' ' } else { ch };
        match self {
            Shaper::Standard(font) => Glyph {
                id: winansi::encode_char_lossy(ch) as u16,
                advance: font.advance(ch),
            },
            Shaper::TrueType { face, scale } => {
                let gid = face.glyph_index(ch).unwrap_or(GlyphId(0));
                let advance = face
                    .glyph_hor_advance(gid)
                    .map(|adv| (adv as f64 * scale).round() as u16)
                    .unwrap_or(500);
                Glyph { id: gid.0, advance }
            }
        }
    }

    /// Width of `text` in points, measured on a single line.
    pub fn measure(&self, text: &str, font_size: f64) -> f64 {
        let units: u32 = text.chars().map(|ch| self.glyph(ch).advance as u32).sum();
        units as f64 * font_size / 1000.0
    }
}

#[rustfmt::skip]
static HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
static HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

#[rustfmt::skip]
static TIMES_ROMAN_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444,
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722,
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500,
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500,
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_widths() {
        let font = StandardFont::Helvetica;
        assert_eq!(font.advance(' '), 278);
        assert_eq!(font.advance('H'), 722);
        assert_eq!(font.advance('e'), 556);
        assert_eq!(font.advance('~'), 584);
        // accented letters measure like their base letter
        assert_eq!(font.advance('ş'), font.advance('s'));
        assert_eq!(StandardFont::Courier.advance('W'), 600);
    }

    #[test]
    fn test_standard_shaper_measure() {
        let asset = FontAsset::standard(StandardFont::Helvetica);
        let shaper = asset.shaper().unwrap();
        // H e l l o = 722 + 556 + 222 + 222 + 556
        let width = shaper.measure("Hello", 10.0);
        assert!((width - 22.78).abs() < 1e-9);
        assert_eq!(shaper.glyph('A').id, b'A' as u16);
        assert_eq!(shaper.glyph('\t'), shaper.glyph(' '));
    }

    #[test]
    fn test_invalid_truetype() {
        assert!(FontAsset::truetype("broken", vec![0, 1, 2, 3]).is_err());
    }
}
