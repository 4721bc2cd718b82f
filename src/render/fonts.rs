//! Font embedding
//!
//! Standard fonts are referenced as Type1 fonts with WinAnsiEncoding.
//! TrueType fonts are subset to the glyphs a document uses and embedded as
//! Type0/CIDFontType2 fonts with Identity-H encoding. Glyph ids are kept by
//! the subsetter, so CIDs equal glyph ids and the CIDToGIDMap is Identity.

use log::{debug, warn};
use pdf_writer::types::{CidFontType, FontFlags, SystemInfo};
use pdf_writer::{Filter, Name, Pdf, Rect, Ref, Str};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::canvas::TextEncoding;
use super::{deflate, RefAllocator};
use crate::assets::fonts::{FontSource, TrueTypeFont};
use crate::assets::FontHandle;
use crate::error::RenderError;

/// A font used by the document and the glyphs drawn with it
pub struct FontEntry {
    pub font: FontHandle,
    pub resource: String,
    pub id: Ref,
    /// Glyph id -> the character it was shaped from
    glyphs: BTreeMap<u16, char>,
}

impl FontEntry {
    pub fn new(font: FontHandle, resource: String, id: Ref) -> Self {
        Self {
            font,
            resource,
            id,
            glyphs: BTreeMap::new(),
        }
    }

    pub fn encoding(&self) -> TextEncoding {
        if self.font.is_standard() {
            TextEncoding::WinAnsi
        } else {
            TextEncoding::IdentityH
        }
    }

    pub fn record(&mut self, text: &str, glyphs: &[u16]) {
        for (ch, glyph) in text.chars().zip(glyphs) {
            self.glyphs.entry(*glyph).or_insert(ch);
        }
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    pub fn embed(&self, pdf: &mut Pdf, refs: &mut RefAllocator, compress: bool) -> Result<(), RenderError> {
        match self.font.source() {
            FontSource::Standard(standard) => {
                pdf.type1_font(self.id)
                    .base_font(Name(standard.base_font().as_bytes()))
                    .pair(Name(b"Encoding"), Name(b"WinAnsiEncoding"));
                Ok(())
            }
            FontSource::TrueType(font) => self.embed_truetype(pdf, refs, font, compress),
        }
    }

    fn embed_truetype(
        &self,
        pdf: &mut Pdf,
        refs: &mut RefAllocator,
        font: &TrueTypeFont,
        compress: bool,
    ) -> Result<(), RenderError> {
        let font_err = |reason: String| RenderError::Font {
            name: self.font.name().to_string(),
            reason,
        };
        let face = font.face().map_err(font_err)?;
        let scale = 1000.0 / font.units_per_em() as f64;

        let mut gids: Vec<u16> = self.glyphs.keys().copied().collect();
        if !gids.contains(&0) {
            gids.insert(0, 0);
        }

        let program = match subsetter::subset(font.data(), 0, subsetter::Profile::pdf(&gids)) {
            Ok(subset) => subset,
            Err(err) => {
                warn!(
                    "Subsetting font '{}' failed ({:?}), embedding the full font",
                    self.font.name(),
                    err
                );
                font.data().to_vec()
            }
        };
        debug!(
            "Embedding font '{}': {} glyphs, {} bytes",
            self.font.name(),
            gids.len(),
            program.len()
        );

        let descriptor_id = refs.next();
        let cid_font_id = refs.next();
        let font_file_id = refs.next();
        let to_unicode_id = refs.next();

        let base_font = format!("{}+{}", subset_tag(&gids), font.postscript_name());
        let base_font = Name(base_font.as_bytes());

        // font program
        if compress {
            let packed = deflate(&program).map_err(font_err)?;
            pdf.stream(font_file_id, &packed)
                .filter(Filter::FlateDecode)
                .pair(Name(b"Length1"), program.len() as i32);
        } else {
            pdf.stream(font_file_id, &program)
                .pair(Name(b"Length1"), program.len() as i32);
        }

        // descriptor
        let metrics = self.font.metrics();
        let bbox = font.bbox();
        pdf.font_descriptor(descriptor_id)
            .name(base_font)
            .flags(FontFlags::SYMBOLIC)
            .bbox(Rect::new(
                bbox[0] as f32,
                bbox[1] as f32,
                bbox[2] as f32,
                bbox[3] as f32,
            ))
            .italic_angle(0.0)
            .ascent(metrics.ascent as f32)
            .descent(-metrics.descent as f32)
            .cap_height(metrics.ascent as f32)
            .stem_v(80.0)
            .font_file2(font_file_id);

        // widths, grouped into runs of consecutive glyph ids
        let widths: Vec<(u16, f32)> = gids
            .iter()
            .map(|&gid| {
                let advance = face
                    .glyph_hor_advance(ttf_parser::GlyphId(gid))
                    .map(|adv| (adv as f64 * scale).round() as f32)
                    .unwrap_or(500.0);
                (gid, advance)
            })
            .collect();
        {
            let mut cid_font = pdf.cid_font(cid_font_id);
            cid_font
                .subtype(CidFontType::Type2)
                .base_font(base_font)
                .system_info(SystemInfo {
                    registry: Str(b"Adobe"),
                    ordering: Str(b"Identity"),
                    supplement: 0,
                })
                .font_descriptor(descriptor_id)
                .default_width(500.0)
                .cid_to_gid_map_predefined(Name(b"Identity"));

            let mut writer = cid_font.widths();
            let mut iter = widths.iter().peekable();
            while let Some(&(start, width)) = iter.next() {
                let mut run = vec![width];
                let mut last = start;
                while let Some(&&(next, next_width)) = iter.peek() {
                    if next != last.wrapping_add(1) {
                        break;
                    }
                    run.push(next_width);
                    last = next;
                    iter.next();
                }
                writer.consecutive(start, run);
            }
        }

        // text extraction
        let cmap = self.to_unicode_cmap();
        if compress {
            let packed = deflate(cmap.as_bytes()).map_err(font_err)?;
            pdf.stream(to_unicode_id, &packed).filter(Filter::FlateDecode);
        } else {
            pdf.stream(to_unicode_id, cmap.as_bytes());
        }

        pdf.type0_font(self.id)
            .base_font(base_font)
            .encoding_predefined(Name(b"Identity-H"))
            .descendant_font(cid_font_id)
            .to_unicode(to_unicode_id);
        Ok(())
    }

    fn to_unicode_cmap(&self) -> String {
        let pairs: Vec<(u16, char)> = self
            .glyphs
            .iter()
            .filter(|(gid, _)| **gid != 0)
            .map(|(gid, ch)| (*gid, *ch))
            .collect();

        let mut sections = String::new();
        for chunk in pairs.chunks(100) {
            let _ = writeln!(sections, "{} beginbfchar", chunk.len());
            for (gid, ch) in chunk {
                let mut units = [0u16; 2];
                let hex: String = ch
                    .encode_utf16(&mut units)
                    .iter()
                    .map(|unit| format!("{:04X}", unit))
                    .collect();
                let _ = writeln!(sections, "<{:04X}> <{}>", gid, hex);
            }
            sections.push_str("endbfchar\n");
        }

        format!(
            "/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CIDSystemInfo
<< /Registry (Adobe)
   /Ordering (UCS)
   /Supplement 0
>> def
/CMapName /Adobe-Identity-UCS def
/CMapType 2 def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
{}endcmap
CMapName currentdict /CMap defineresource pop
end
end
",
            sections
        )
    }
}

/// Six-letter subset tag derived from the glyph set
fn subset_tag(gids: &[u16]) -> String {
    // FNV-1a over the glyph ids
    let mut hash: u32 = 0x811c_9dc5;
    for gid in gids {
        for byte in gid.to_be_bytes() {
            hash ^= byte as u32;
            hash = hash.wrapping_mul(0x0100_0193);
        }
    }
    (0..6)
        .map(|_| {
            let letter = (b'A' + (hash % 26) as u8) as char;
            hash /= 26;
            letter
        })
        .collect()
}
