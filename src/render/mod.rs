//! Render backend: draws a page tree into a PDF document
//!
//! Rendering is a pure drawing pass: every page of the tree becomes one PDF
//! page in the same order and nothing is re-laid out. Output is
//! byte-deterministic for a given tree: resource names and object numbers
//! follow first use in the tree, and no timestamps or random ids are written.

pub mod canvas;
pub mod fonts;
pub mod images;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::debug;
use pdf_writer::{Filter, Finish, Name, Pdf, Rect, Ref, TextStr};
use std::collections::BTreeMap;
use std::io::Write;

use crate::error::RenderError;
use crate::layout::{PageTree, PlacedPrimitive};
use crate::types::Size;
use canvas::PageCanvas;
use fonts::FontEntry;
use images::ImageEntry;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
const PRODUCER: &str = "report-renderer";

#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Document title, written to the info dictionary and used for the filename
    pub title: Option<String>,
    /// Flate-compress content, font and image streams
    pub compress: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            title: None,
            compress: true,
        }
    }
}

/// A finished document
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub page_count: usize,
    /// Download file name, always ending in `.pdf`
    pub filename: String,
}

impl RenderedDocument {
    /// `Content-Disposition` header value with an ASCII fallback and an
    /// RFC 5987 encoded UTF-8 name
    pub fn content_disposition(&self) -> String {
        let fallback: String = self
            .filename
            .chars()
            .map(|c| if c.is_ascii() && c != '"' && c != '\\' { c } else { '_' })
            .collect();
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(&self.filename)
        )
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// File name for a document titled `title`
pub fn document_filename(title: Option<&str>) -> String {
    let stem: String = title
        .unwrap_or_default()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c if c.is_whitespace() => ' ',
            c => c,
        })
        .collect();
    let stem = stem.split_whitespace().collect::<Vec<_>>().join(" ");
    if stem.is_empty() {
        "report.pdf".to_string()
    } else {
        format!("{}.pdf", stem)
    }
}

/// Zlib-compress a stream for FlateDecode
pub(crate) fn deflate(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(|e| e.to_string())?;
    encoder.finish().map_err(|e| e.to_string())
}

/// Hands out PDF object ids in increasing order
pub struct RefAllocator {
    next: i32,
}

impl RefAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Ref {
        let id = Ref::new(self.next);
        self.next += 1;
        id
    }
}

impl Default for RefAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-page resources, kept ordered for deterministic output
#[derive(Default)]
struct PageResources {
    fonts: BTreeMap<String, Ref>,
    images: BTreeMap<String, Ref>,
    states: BTreeMap<String, Ref>,
}

/// The document being written. Owned by one `render` call and released
/// when it goes out of scope, on success and on every error path.
struct RenderSurface {
    pdf: Pdf,
    refs: RefAllocator,
    catalog_id: Ref,
    page_tree_id: Ref,
    fonts: Vec<FontEntry>,
    font_index: BTreeMap<String, usize>,
    images: Vec<ImageEntry>,
    image_index: BTreeMap<String, usize>,
    /// Opacity in thousandths -> (resource name, object id)
    states: BTreeMap<u32, (String, Ref)>,
    compress: bool,
}

impl RenderSurface {
    fn acquire(compress: bool) -> Self {
        let mut refs = RefAllocator::new();
        let catalog_id = refs.next();
        let page_tree_id = refs.next();
        debug!("Render surface acquired");
        Self {
            pdf: Pdf::new(),
            refs,
            catalog_id,
            page_tree_id,
            fonts: Vec::new(),
            font_index: BTreeMap::new(),
            images: Vec::new(),
            image_index: BTreeMap::new(),
            states: BTreeMap::new(),
            compress,
        }
    }

    /// Register every font, image and opacity the tree uses
    fn collect(&mut self, tree: &PageTree) {
        for page in &tree.pages {
            for primitive in &page.primitives {
                match primitive {
                    PlacedPrimitive::Text(run) => {
                        let name = run.font.name().to_string();
                        let index = match self.font_index.get(&name) {
                            Some(index) => *index,
                            None => {
                                let id = self.refs.next();
                                let resource = format!("F{}", self.fonts.len() + 1);
                                self.fonts.push(FontEntry::new(run.font.clone(), resource, id));
                                self.font_index.insert(name, self.fonts.len() - 1);
                                self.fonts.len() - 1
                            }
                        };
                        self.fonts[index].record(&run.text, &run.glyphs);
                    }
                    PlacedPrimitive::Image(placed) => {
                        let name = placed.image.name().to_string();
                        let index = match self.image_index.get(&name) {
                            Some(index) => *index,
                            None => {
                                let id = self.refs.next();
                                let resource = format!("Im{}", self.images.len() + 1);
                                self.images.push(ImageEntry::new(placed.image.clone(), resource, id));
                                self.image_index.insert(name, self.images.len() - 1);
                                self.images.len() - 1
                            }
                        };
                        self.images[index].record(Size::new(placed.rect.width, placed.rect.height));

                        if placed.opacity < 1.0 {
                            let key = opacity_key(placed.opacity);
                            if !self.states.contains_key(&key) {
                                let id = self.refs.next();
                                let resource = format!("GS{}", self.states.len() + 1);
                                self.states.insert(key, (resource, id));
                            }
                        }
                    }
                    PlacedPrimitive::Rule(_) => {}
                }
            }
        }
    }

    fn write_pages(&mut self, tree: &PageTree) -> Result<Vec<Ref>, RenderError> {
        let mut page_ids = Vec::with_capacity(tree.pages.len());
        let size = tree.page_size;

        for page in &tree.pages {
            let page_id = self.refs.next();
            let content_id = self.refs.next();
            let mut canvas = PageCanvas::new(size.height);
            let mut resources = PageResources::default();

            for primitive in &page.primitives {
                match primitive {
                    PlacedPrimitive::Text(run) => {
                        let Some(entry) = self.font_index.get(run.font.name()).map(|i| &self.fonts[*i]) else {
                            continue;
                        };
                        resources.fonts.insert(entry.resource.clone(), entry.id);
                        canvas.draw_text(&entry.resource, entry.encoding(), run);
                    }
                    PlacedPrimitive::Image(placed) => {
                        let Some(entry) = self.image_index.get(placed.image.name()).map(|i| &self.images[*i]) else {
                            continue;
                        };
                        resources.images.insert(entry.resource.clone(), entry.id);
                        let state = (placed.opacity < 1.0)
                            .then(|| self.states.get(&opacity_key(placed.opacity)))
                            .flatten();
                        if let Some((name, id)) = state {
                            resources.states.insert(name.clone(), *id);
                        }
                        canvas.with_graphics_state(state.map(|(name, _)| name.as_str()), |canvas| {
                            canvas.draw_image(&entry.resource, placed)
                        });
                    }
                    PlacedPrimitive::Rule(rule) => canvas.draw_rule(rule),
                }
            }

            let content = canvas.finish();
            if self.compress {
                let packed = deflate(&content).map_err(|reason| RenderError::Encoding {
                    what: "page content",
                    reason,
                })?;
                self.pdf.stream(content_id, &packed).filter(Filter::FlateDecode);
            } else {
                self.pdf.stream(content_id, &content);
            }

            let mut pdf_page = self.pdf.page(page_id);
            pdf_page
                .media_box(Rect::new(0.0, 0.0, size.width as f32, size.height as f32))
                .parent(self.page_tree_id)
                .contents(content_id);
            {
                let mut dict = pdf_page.resources();
                if !resources.fonts.is_empty() {
                    let mut fonts = dict.fonts();
                    for (name, id) in &resources.fonts {
                        fonts.pair(Name(name.as_bytes()), *id);
                    }
                }
                if !resources.images.is_empty() {
                    let mut x_objects = dict.x_objects();
                    for (name, id) in &resources.images {
                        x_objects.pair(Name(name.as_bytes()), *id);
                    }
                }
                if !resources.states.is_empty() {
                    let mut states = dict.ext_g_states();
                    for (name, id) in &resources.states {
                        states.pair(Name(name.as_bytes()), *id);
                    }
                }
            }
            pdf_page.finish();
            page_ids.push(page_id);
        }
        Ok(page_ids)
    }

    fn write_resources(&mut self) -> Result<(), RenderError> {
        for entry in &self.fonts {
            entry.embed(&mut self.pdf, &mut self.refs, self.compress)?;
        }
        for entry in &self.images {
            entry.embed(&mut self.pdf, &mut self.refs, self.compress)?;
        }
        for (key, (_, id)) in &self.states {
            let alpha = *key as f32 / 1000.0;
            self.pdf
                .ext_graphics(*id)
                .non_stroking_alpha(alpha)
                .stroking_alpha(alpha);
        }
        Ok(())
    }

    fn finish(mut self, page_ids: Vec<Ref>, title: Option<&str>) -> Vec<u8> {
        let page_count = page_ids.len() as i32;
        self.pdf
            .pages(self.page_tree_id)
            .kids(page_ids)
            .count(page_count);
        self.pdf.catalog(self.catalog_id).pages(self.page_tree_id);

        let info_id = self.refs.next();
        let mut info = self.pdf.document_info(info_id);
        if let Some(title) = title {
            info.title(TextStr(title));
        }
        info.producer(TextStr(PRODUCER));
        info.finish();

        std::mem::replace(&mut self.pdf, Pdf::new()).finish()
    }
}

impl Drop for RenderSurface {
    fn drop(&mut self) {
        debug!(
            "Render surface released ({} fonts, {} images)",
            self.fonts.len(),
            self.images.len()
        );
    }
}

fn opacity_key(opacity: f64) -> u32 {
    (opacity.clamp(0.0, 1.0) * 1000.0).round() as u32
}

/// Draw `tree` into a PDF document
pub fn render(tree: &PageTree, options: &RenderOptions) -> Result<RenderedDocument, RenderError> {
    let mut surface = RenderSurface::acquire(options.compress);
    surface.collect(tree);
    let page_ids = surface.write_pages(tree)?;
    surface.write_resources()?;
    let bytes = surface.finish(page_ids, options.title.as_deref());

    debug!("Rendered {} pages, {} bytes", tree.page_count(), bytes.len());
    Ok(RenderedDocument {
        bytes,
        content_type: PDF_CONTENT_TYPE,
        page_count: tree.page_count(),
        filename: document_filename(options.title.as_deref()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_filename() {
        assert_eq!(document_filename(None), "report.pdf");
        assert_eq!(document_filename(Some("  ")), "report.pdf");
        assert_eq!(
            document_filename(Some("Jane Doe - Interview: Q1/Q2")),
            "Jane Doe - Interview_ Q1_Q2.pdf"
        );
    }

    #[test]
    fn test_content_disposition() {
        let doc = RenderedDocument {
            bytes: Vec::new(),
            content_type: PDF_CONTENT_TYPE,
            page_count: 0,
            filename: "Ayşe Rapor.pdf".to_string(),
        };
        assert_eq!(
            doc.content_disposition(),
            "attachment; filename=\"Ay_e Rapor.pdf\"; filename*=UTF-8''Ay%C5%9Fe%20Rapor.pdf"
        );
    }

    #[test]
    fn test_deflate_roundtrip() {
        use flate2::read::ZlibDecoder;
        use std::io::Read;

        let packed = deflate(b"BT /F1 10 Tf ET").unwrap();
        let mut out = String::new();
        ZlibDecoder::new(&packed[..]).read_to_string(&mut out).unwrap();
        assert_eq!(out, "BT /F1 10 Tf ET");
    }

    #[test]
    fn test_opacity_key() {
        assert_eq!(opacity_key(0.08), 80);
        assert_eq!(opacity_key(2.0), 1000);
    }
}
