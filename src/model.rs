//! The report model: the content of one report before layout
//!
//! A model is built per request (usually by `request::ReportRequest`) and is
//! not modified after construction. Names in it (styles, fonts, images) are
//! resolved during layout.

use std::collections::BTreeMap;

use crate::assets::ImageHandle;
use crate::theme::{styles, DEFAULT_THEME};
use crate::types::Alignment;

#[derive(Debug, Clone, PartialEq)]
pub struct ReportModel {
    pub title: Option<String>,
    pub theme: String,
    pub sections: Vec<Section>,
    pub watermark: Option<Watermark>,
    pub footer: Option<Footer>,
    /// Request-local images, resolved before the asset store
    pub attachments: BTreeMap<String, ImageHandle>,
}

impl Default for ReportModel {
    fn default() -> Self {
        Self {
            title: None,
            theme: DEFAULT_THEME.to_string(),
            sections: Vec::new(),
            watermark: None,
            footer: None,
            attachments: BTreeMap::new(),
        }
    }
}

impl ReportModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = theme.into();
        self
    }

    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    pub fn with_watermark(mut self, watermark: Watermark) -> Self {
        self.watermark = Some(watermark);
        self
    }

    pub fn with_footer(mut self, footer: Footer) -> Self {
        self.footer = Some(footer);
        self
    }

    pub fn with_attachment(mut self, name: impl Into<String>, image: ImageHandle) -> Self {
        self.attachments.insert(name.into(), image);
        self
    }

    pub fn block_count(&self) -> usize {
        self.sections.iter().map(|section| section.blocks.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Section {
    pub blocks: Vec<Block>,
}

impl Section {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block(mut self, block: impl Into<Block>) -> Self {
        self.blocks.push(block.into());
        self
    }
}

/// One unit of content. Layout and rendering match on this exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Text(TextBlock),
    Image(ImageBlock),
    Table(TableBlock),
}

impl From<TextBlock> for Block {
    fn from(block: TextBlock) -> Self {
        Block::Text(block)
    }
}

impl From<ImageBlock> for Block {
    fn from(block: ImageBlock) -> Self {
        Block::Image(block)
    }
}

impl From<TableBlock> for Block {
    fn from(block: TableBlock) -> Self {
        Block::Table(block)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub content: String,
    pub style: String,
    /// Overrides the style's font with another asset store font
    pub font: Option<String>,
    pub align: Option<Alignment>,
}

impl TextBlock {
    pub fn new(content: impl Into<String>, style: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            style: style.into(),
            font: None,
            align: None,
        }
    }

    pub fn body(content: impl Into<String>) -> Self {
        Self::new(content, styles::BODY)
    }

    pub fn with_font(mut self, font: impl Into<String>) -> Self {
        self.font = Some(font.into());
        self
    }

    pub fn with_align(mut self, align: Alignment) -> Self {
        self.align = Some(align);
        self
    }
}

/// An image scaled to the given dimensions (points). A missing dimension is
/// derived from the image's aspect ratio; both missing means natural size
/// capped at the content width.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBlock {
    pub asset: String,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub align: Alignment,
    pub caption: Option<String>,
}

impl ImageBlock {
    pub fn new(asset: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            width: None,
            height: None,
            align: Alignment::Center,
            caption: None,
        }
    }

    pub fn with_size(mut self, width: Option<f64>, height: Option<f64>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_align(mut self, align: Alignment) -> Self {
        self.align = align;
        self
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableBlock {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub cell_style: String,
    pub header_style: String,
    pub show_header: bool,
}

impl TableBlock {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            cell_style: styles::TABLE_CELL.to_string(),
            header_style: styles::TABLE_HEADER.to_string(),
            show_header: true,
        }
    }

    pub fn with_row(mut self, row: Vec<String>) -> Self {
        self.rows.push(row);
        self
    }

    pub fn without_header(mut self) -> Self {
        self.show_header = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Watermark {
    pub asset: String,
    pub opacity: f64,
    /// Fraction of the page width the image spans
    pub width_ratio: f64,
    pub max_width: f64,
}

impl Watermark {
    pub fn new(asset: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            opacity: 0.08,
            width_ratio: 0.6,
            max_width: 375.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FooterLine {
    pub text: String,
    pub style: String,
}

impl FooterLine {
    pub fn new(text: impl Into<String>, style: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: style.into(),
        }
    }
}

/// Running footer drawn in the bottom margin of every page
#[derive(Debug, Clone, PartialEq)]
pub struct Footer {
    pub lines: Vec<FooterLine>,
    pub divider: bool,
    /// Append an `n / N` line
    pub page_numbers: bool,
}

impl Default for Footer {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            divider: true,
            page_numbers: false,
        }
    }
}

impl Footer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_line(mut self, line: FooterLine) -> Self {
        self.lines.push(line);
        self
    }

    pub fn with_page_numbers(mut self) -> Self {
        self.page_numbers = true;
        self
    }
}
