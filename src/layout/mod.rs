//! Layout engine: turns a report model into a page tree
//!
//! Blocks are placed top to bottom in model order. Text splits between
//! lines across pages; images and table rows are atomic and move to a fresh
//! page when they do not fit (an atomic unit taller than a whole page is
//! placed at the top of its own page and overflows). Watermark and footer
//! are added to every page once pagination is finished.
//!
//! Layout is a pure function of the model, the theme set, the asset store
//! and the page setup.

pub mod table;
pub mod text;
pub mod tree;

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::assets::{AssetStore, FontHandle, ImageHandle, Shaper};
use crate::error::LayoutError;
use crate::model::{Block, Footer, ImageBlock, ReportModel, TextBlock, Watermark};
use crate::theme::{styles, TextStyle, Theme, ThemeSet};
use crate::types::{Alignment, Color, Margins, PageSize, Rect, Size};

use text::{justify_spacing, LineBreaker, ShapedLine};
pub use tree::{Page, PageTree, PlacedImage, PlacedPrimitive, Rule, TextRun};

/// Distance between the footer block and the bottom edge of the page
const FOOTER_PADDING: f64 = 10.0;
/// Space between the footer divider and the first footer line
const FOOTER_DIVIDER_GAP: f64 = 4.0;
const FOOTER_DIVIDER_RATIO: f64 = 0.9;
const FOOTER_DIVIDER_WIDTH: f64 = 0.5;

/// Page geometry and pagination policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSetup {
    pub size: PageSize,
    pub margins: Margins,
    pub max_pages: usize,
}

impl Default for PageSetup {
    fn default() -> Self {
        Self {
            size: PageSize::A4,
            margins: Margins::default(),
            max_pages: 200,
        }
    }
}

impl PageSetup {
    pub fn new(size: PageSize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    pub fn with_margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// The area inside the margins
    pub fn content_area(&self) -> Result<Rect, LayoutError> {
        let page = self.size.size();
        let m = self.margins;
        let width = page.width - m.left - m.right;
        let height = page.height - m.top - m.bottom;
        if !(width > 0.0 && height > 0.0) {
            return Err(LayoutError::NoContentArea);
        }
        Ok(Rect::new(m.left, m.top, width, height))
    }
}

/// Resolves names against the request's attachments, then the asset store
pub(crate) struct Resolver<'a> {
    assets: &'a AssetStore,
    attachments: &'a BTreeMap<String, ImageHandle>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn font(&self, name: &str) -> Result<FontHandle, LayoutError> {
        self.assets.resolve_font(name)
    }

    pub(crate) fn image(&self, name: &str) -> Result<ImageHandle, LayoutError> {
        match self.attachments.get(name) {
            Some(image) => Ok(image.clone()),
            None => self.assets.resolve_image(name),
        }
    }
}

/// Tracks the current page and the vertical cursor
pub(crate) struct Paginator {
    pages: Vec<Page>,
    content: Rect,
    cursor: f64,
    at_top: bool,
    max_pages: usize,
}

impl Paginator {
    fn new(content: Rect, max_pages: usize) -> Result<Self, LayoutError> {
        if max_pages == 0 {
            return Err(LayoutError::PageLimitExceeded { limit: 0 });
        }
        Ok(Self {
            pages: vec![Page::new(1)],
            content,
            cursor: content.top(),
            at_top: true,
            max_pages,
        })
    }

    pub(crate) fn content(&self) -> Rect {
        self.content
    }

    pub(crate) fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Nothing has been placed on the current page yet
    pub(crate) fn at_top(&self) -> bool {
        self.at_top
    }

    pub(crate) fn fits(&self, height: f64) -> bool {
        self.cursor + height <= self.content.bottom() + 1e-6
    }

    pub(crate) fn new_page(&mut self) -> Result<(), LayoutError> {
        if self.pages.len() >= self.max_pages {
            return Err(LayoutError::PageLimitExceeded {
                limit: self.max_pages,
            });
        }
        let number = self.pages.len() + 1;
        self.pages.push(Page::new(number));
        self.cursor = self.content.top();
        self.at_top = true;
        Ok(())
    }

    /// Start a new page unless `height` fits below the cursor. A unit that
    /// does not fit an empty page stays where it is.
    pub(crate) fn ensure(&mut self, height: f64) -> Result<(), LayoutError> {
        if !self.fits(height) && !self.at_top {
            self.new_page()?;
        }
        Ok(())
    }

    /// Vertical gap; dropped at the top of a page
    pub(crate) fn space(&mut self, amount: f64) {
        if !self.at_top && amount > 0.0 {
            self.cursor += amount;
        }
    }

    pub(crate) fn advance(&mut self, amount: f64) {
        self.cursor += amount;
        self.at_top = false;
    }

    pub(crate) fn push(&mut self, primitive: PlacedPrimitive) {
        if let Some(page) = self.pages.last_mut() {
            page.primitives.push(primitive);
        }
        self.at_top = false;
    }

    fn finish(self) -> Vec<Page> {
        self.pages
    }
}

/// Horizontal extent lines are placed in
#[derive(Debug, Clone, Copy)]
pub(crate) struct LineBox {
    pub x: f64,
    pub width: f64,
}

/// Offset from the top of a line box to the baseline: the leading is split
/// evenly above and below the glyphs.
fn baseline_offset(font: &FontHandle, style: &TextStyle) -> f64 {
    let metrics = font.metrics();
    let ascent = metrics.ascent_at(style.size);
    let descent = metrics.descent_at(style.size);
    (style.line_pitch() - (ascent + descent)) / 2.0 + ascent
}

/// Position one wrapped line; empty lines produce no run.
pub(crate) fn place_line(
    font: &FontHandle,
    style: &TextStyle,
    align: Alignment,
    line: &ShapedLine,
    line_box: LineBox,
    line_top: f64,
) -> Option<TextRun> {
    if line.glyphs.is_empty() {
        return None;
    }
    let (x, word_spacing) = match align {
        Alignment::Justify => (line_box.x, justify_spacing(line, line_box.width)),
        other => (line_box.x + other.offset(line_box.width, line.width), 0.0),
    };
    Some(TextRun {
        font: font.clone(),
        size: style.size,
        color: style.color,
        x,
        y: line_top + baseline_offset(font, style),
        text: line.text.clone(),
        glyphs: line.glyphs.clone(),
        width: line.width,
        word_spacing,
    })
}

fn shaper_of(font: &FontHandle) -> Result<Shaper<'_>, LayoutError> {
    font.shaper().map_err(|reason| LayoutError::UnusableFont {
        name: font.name().to_string(),
        reason,
    })
}

/// Lays out report models against a fixed asset store, theme set and page setup
pub struct LayoutEngine<'a> {
    assets: &'a AssetStore,
    themes: &'a ThemeSet,
    setup: PageSetup,
}

impl<'a> LayoutEngine<'a> {
    pub fn new(assets: &'a AssetStore, themes: &'a ThemeSet, setup: PageSetup) -> Self {
        Self {
            assets,
            themes,
            setup,
        }
    }

    pub fn layout(&self, model: &ReportModel) -> Result<PageTree, LayoutError> {
        let theme = self.themes.get(&model.theme)?;
        layout(model, theme, self.assets, &self.setup)
    }
}

/// Lay out `model` with one theme
pub fn layout(
    model: &ReportModel,
    theme: &Theme,
    assets: &AssetStore,
    setup: &PageSetup,
) -> Result<PageTree, LayoutError> {
    let mut content = setup.content_area()?;
    let page_size = setup.size.size();
    let resolver = Resolver {
        assets,
        attachments: &model.attachments,
    };

    let footer = match &model.footer {
        Some(footer) => Some(plan_footer(footer, content, theme, &resolver)?),
        None => None,
    };
    if let Some(plan) = &footer {
        // the body ends where the footer begins
        let footer_top = page_size.height - FOOTER_PADDING - plan.height;
        if footer_top < content.bottom() {
            content.height = footer_top - content.top();
            if content.height <= 0.0 {
                return Err(LayoutError::FooterTooTall {
                    height: plan.height,
                });
            }
        }
    }

    let mut paginator = Paginator::new(content, setup.max_pages)?;

    if let Some(title) = &model.title {
        let block = TextBlock::new(title.clone(), styles::TITLE);
        place_text(&mut paginator, &block, theme, &resolver)?;
    }

    for section in &model.sections {
        for block in &section.blocks {
            match block {
                Block::Text(text) => place_text(&mut paginator, text, theme, &resolver)?,
                Block::Image(image) => place_image(&mut paginator, image, theme, &resolver)?,
                Block::Table(table) => table::place_table(&mut paginator, table, theme, &resolver)?,
            }
        }
    }

    let mut pages = paginator.finish();

    if let Some(watermark) = &model.watermark {
        apply_watermark(&mut pages, watermark, page_size, &resolver)?;
    }
    if let Some(plan) = &footer {
        apply_footer(&mut pages, plan, page_size, content, theme, &resolver)?;
    }

    debug!(
        "Laid out {} blocks on {} pages",
        model.block_count(),
        pages.len()
    );
    Ok(PageTree { page_size, pages })
}

fn place_text(
    paginator: &mut Paginator,
    block: &TextBlock,
    theme: &Theme,
    resolver: &Resolver<'_>,
) -> Result<(), LayoutError> {
    let style = theme.style(&block.style)?;
    let font = resolver.font(block.font.as_deref().unwrap_or(&style.font))?;
    let shaper = shaper_of(&font)?;
    let align = block.align.unwrap_or(style.align);
    let content = paginator.content();
    let line_box = LineBox {
        x: content.x,
        width: content.width,
    };
    let pitch = style.line_pitch();

    let lines = LineBreaker::new(&shaper, style.size, content.width).break_text(&block.content);
    if style.keep_with_next {
        let rule = style.rule_below.map_or(0.0, |rule| rule.gap + rule.width);
        let next_line = theme.style(styles::BODY).map_or(pitch, TextStyle::line_pitch);
        let keep = lines.len() as f64 * pitch + rule + style.space_after + next_line;
        paginator.ensure(style.space_before + keep)?;
    }

    paginator.space(style.space_before);
    for line in &lines {
        paginator.ensure(pitch)?;
        if let Some(run) = place_line(&font, style, align, line, line_box, paginator.cursor()) {
            paginator.push(PlacedPrimitive::Text(run));
        }
        paginator.advance(pitch);
    }

    if let Some(rule) = style.rule_below {
        paginator.ensure(rule.gap + rule.width)?;
        let y = paginator.cursor() + rule.gap + rule.width / 2.0;
        paginator.push(PlacedPrimitive::Rule(Rule::horizontal(
            content.x,
            y,
            content.width,
            rule.width,
            rule.color,
        )));
        paginator.advance(rule.gap + rule.width);
    }

    paginator.space(style.space_after);
    Ok(())
}

/// Display size of an image block: explicit dimensions win, a single
/// dimension keeps the aspect ratio, and the result never exceeds `max_width`.
fn image_size(block: &ImageBlock, image: &ImageHandle, max_width: f64) -> Size {
    let usable = |v: Option<f64>| v.filter(|v| v.is_finite() && *v > 0.0);
    let ratio = image.aspect_ratio();
    let size = match (usable(block.width), usable(block.height)) {
        (Some(w), Some(h)) => Size::new(w, h),
        (Some(w), None) => Size::new(w, w * ratio),
        (None, Some(h)) => Size::new(h / ratio, h),
        (None, None) => image.natural_size(),
    };
    if size.width > max_width {
        let scale = max_width / size.width;
        Size::new(max_width, size.height * scale)
    } else {
        size
    }
}

fn place_image(
    paginator: &mut Paginator,
    block: &ImageBlock,
    theme: &Theme,
    resolver: &Resolver<'_>,
) -> Result<(), LayoutError> {
    let image = resolver.image(&block.asset)?;
    let content = paginator.content();
    let size = image_size(block, &image, content.width);

    paginator.ensure(size.height)?;
    let x = content.x + block.align.offset(content.width, size.width);
    let rect = Rect::new(x, paginator.cursor(), size.width, size.height);
    paginator.push(PlacedPrimitive::Image(PlacedImage {
        image,
        rect,
        opacity: 1.0,
    }));
    paginator.advance(size.height);

    if let Some(caption) = &block.caption {
        let caption = TextBlock::new(caption.clone(), styles::CAPTION);
        place_text(paginator, &caption, theme, resolver)?;
    }
    Ok(())
}

fn apply_watermark(
    pages: &mut [Page],
    watermark: &Watermark,
    page_size: Size,
    resolver: &Resolver<'_>,
) -> Result<(), LayoutError> {
    let image = resolver.image(&watermark.asset)?;
    let width = (page_size.width * watermark.width_ratio).min(watermark.max_width);
    let height = width * image.aspect_ratio();
    let rect = Rect::new(
        (page_size.width - width) / 2.0,
        (page_size.height - height) / 2.0,
        width,
        height,
    );
    let opacity = watermark.opacity.clamp(0.0, 1.0);

    for page in pages.iter_mut() {
        // first, so it is drawn beneath the content
        page.primitives.insert(
            0,
            PlacedPrimitive::Image(PlacedImage {
                image: image.clone(),
                rect,
                opacity,
            }),
        );
    }
    Ok(())
}

struct FooterLineLayout<'t> {
    lines: Vec<ShapedLine>,
    style: &'t TextStyle,
    font: FontHandle,
}

impl FooterLineLayout<'_> {
    fn height(&self) -> f64 {
        self.lines.len() as f64 * self.style.line_pitch() + self.style.space_after
    }
}

/// Footer lines shaped once, plus the height reserved at the bottom of every page
struct FooterPlan<'t> {
    fixed: Vec<FooterLineLayout<'t>>,
    page_numbers: bool,
    divider: bool,
    height: f64,
}

fn shape_footer_line<'t>(
    text: &str,
    style_name: &str,
    width: f64,
    theme: &'t Theme,
    resolver: &Resolver<'_>,
) -> Result<FooterLineLayout<'t>, LayoutError> {
    let style = theme.style(style_name)?;
    let font = resolver.font(&style.font)?;
    let lines = {
        let shaper = shaper_of(&font)?;
        LineBreaker::new(&shaper, style.size, width).break_text(text)
    };
    Ok(FooterLineLayout { lines, style, font })
}

fn plan_footer<'t>(
    footer: &Footer,
    content: Rect,
    theme: &'t Theme,
    resolver: &Resolver<'_>,
) -> Result<FooterPlan<'t>, LayoutError> {
    let fixed = footer
        .lines
        .iter()
        .map(|line| shape_footer_line(&line.text, &line.style, content.width, theme, resolver))
        .collect::<Result<Vec<_>, _>>()?;

    let mut height: f64 = fixed.iter().map(FooterLineLayout::height).sum();
    if footer.page_numbers {
        // "n / total" always fits on one line
        let style = theme.style(styles::FOOTER)?;
        height += style.line_pitch() + style.space_after;
    }
    if footer.divider {
        height += FOOTER_DIVIDER_WIDTH + FOOTER_DIVIDER_GAP;
    }

    Ok(FooterPlan {
        fixed,
        page_numbers: footer.page_numbers,
        divider: footer.divider,
        height,
    })
}

fn apply_footer<'t>(
    pages: &mut [Page],
    plan: &FooterPlan<'t>,
    page_size: Size,
    content: Rect,
    theme: &'t Theme,
    resolver: &Resolver<'_>,
) -> Result<(), LayoutError> {
    let total_pages = pages.len();
    let line_box = LineBox {
        x: content.x,
        width: content.width,
    };
    let top = page_size.height - FOOTER_PADDING - plan.height;

    for page in pages.iter_mut() {
        let label = if plan.page_numbers {
            let text = format!("{} / {}", page.number, total_pages);
            Some(shape_footer_line(&text, styles::FOOTER, content.width, theme, resolver)?)
        } else {
            None
        };

        let mut y = top;
        if plan.divider {
            let length = content.width * FOOTER_DIVIDER_RATIO;
            page.primitives.push(PlacedPrimitive::Rule(Rule::horizontal(
                content.x + (content.width - length) / 2.0,
                y + FOOTER_DIVIDER_WIDTH / 2.0,
                length,
                FOOTER_DIVIDER_WIDTH,
                divider_color(),
            )));
            y += FOOTER_DIVIDER_WIDTH + FOOTER_DIVIDER_GAP;
        }

        for block in plan.fixed.iter().chain(label.as_ref()) {
            for line in &block.lines {
                if let Some(run) = place_line(&block.font, block.style, block.style.align, line, line_box, y) {
                    page.primitives.push(PlacedPrimitive::Text(run));
                }
                y += block.style.line_pitch();
            }
            y += block.style.space_after;
        }
    }
    Ok(())
}

fn divider_color() -> Color {
    Color::rgb(0.8, 0.8, 0.8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FooterLine, Section, TableBlock};

    fn engine_parts() -> (AssetStore, ThemeSet) {
        let assets = AssetStore::standard();
        let themes = ThemeSet::standard(&assets);
        (assets, themes)
    }

    fn run(model: &ReportModel, setup: PageSetup) -> Result<PageTree, LayoutError> {
        let (assets, themes) = engine_parts();
        LayoutEngine::new(&assets, &themes, setup).layout(model)
    }

    #[test]
    fn test_empty_model_yields_one_empty_page() {
        let tree = run(&ReportModel::new(), PageSetup::default()).unwrap();
        assert_eq!(tree.page_count(), 1);
        assert!(tree.pages[0].is_empty());
        assert_eq!(tree.pages[0].number, 1);
    }

    #[test]
    fn test_no_content_area() {
        let setup = PageSetup::new(PageSize::Custom(Size::new(50.0, 50.0)));
        assert_eq!(
            run(&ReportModel::new(), setup).unwrap_err(),
            LayoutError::NoContentArea
        );
    }

    #[test]
    fn test_title_has_rule_below() {
        let model = ReportModel::new().with_title("Quarterly report");
        let tree = run(&model, PageSetup::default()).unwrap();
        let page = &tree.pages[0];
        assert!(matches!(page.primitives[0], PlacedPrimitive::Text(ref run) if run.text == "Quarterly report"));
        assert!(matches!(page.primitives[1], PlacedPrimitive::Rule(_)));
    }

    #[test]
    fn test_center_alignment() {
        let model = ReportModel::new().with_section(
            Section::new().with_block(TextBlock::body("Hi").with_align(Alignment::Center)),
        );
        let setup = PageSetup::default();
        let content = setup.content_area().unwrap();
        let tree = run(&model, setup).unwrap();
        let run = tree.text_runs().next().unwrap();
        let center = run.x + run.width / 2.0;
        assert!((center - (content.x + content.width / 2.0)).abs() < 1e-6);
    }

    #[test]
    fn test_text_block_font_override() {
        let model = ReportModel::new()
            .with_section(Section::new().with_block(TextBlock::body("mono").with_font("Courier")));
        let tree = run(&model, PageSetup::default()).unwrap();
        assert_eq!(tree.text_runs().next().unwrap().font.name(), "Courier");
    }

    #[test]
    fn test_unknown_style() {
        let model = ReportModel::new()
            .with_section(Section::new().with_block(TextBlock::new("x", "shouting")));
        assert_eq!(
            run(&model, PageSetup::default()).unwrap_err(),
            LayoutError::UnknownStyle("shouting".into())
        );
    }

    #[test]
    fn test_footer_on_every_page_with_numbers() {
        let long = "word ".repeat(3000);
        let model = ReportModel::new()
            .with_section(Section::new().with_block(TextBlock::body(long)))
            .with_footer(
                Footer::new()
                    .with_line(FooterLine::new("Example Corp", styles::FOOTER_STRONG))
                    .with_page_numbers(),
            );
        let tree = run(&model, PageSetup::default()).unwrap();
        let total = tree.page_count();
        assert!(total > 1);
        for page in &tree.pages {
            let texts: Vec<&str> = page.text_runs().map(|run| run.text.as_str()).collect();
            assert!(texts.contains(&"Example Corp"));
            let label = format!("{} / {}", page.number, total);
            assert_eq!(texts.last(), Some(&label.as_str()));
        }
    }

    #[test]
    fn test_footer_sits_in_bottom_margin() {
        let setup = PageSetup::default();
        let content = setup.content_area().unwrap();
        let model = ReportModel::new()
            .with_footer(Footer::new().with_line(FooterLine::new("Example Corp", styles::FOOTER)));
        let tree = run(&model, setup).unwrap();
        let run = tree.text_runs().next().unwrap();
        assert!(run.y > content.bottom());
        assert!(run.y < tree.page_size.height);
    }

    #[test]
    fn test_ragged_table() {
        let table = TableBlock::new(vec!["a".into(), "b".into()])
            .with_row(vec!["1".into(), "2".into()])
            .with_row(vec!["3".into()]);
        let model = ReportModel::new().with_section(Section::new().with_block(table));
        assert_eq!(
            run(&model, PageSetup::default()).unwrap_err(),
            LayoutError::RaggedTable {
                row: 1,
                found: 1,
                expected: 2
            }
        );
    }

    #[test]
    fn test_empty_table() {
        let model = ReportModel::new().with_section(Section::new().with_block(TableBlock::new(vec![])));
        assert_eq!(
            run(&model, PageSetup::default()).unwrap_err(),
            LayoutError::EmptyTable
        );
    }

    #[test]
    fn test_table_header_repeats_across_pages() {
        let mut table = TableBlock::new(vec!["Question".into(), "Answer".into()]);
        for i in 0..120 {
            table = table.with_row(vec![format!("q{}", i), format!("a{}", i)]);
        }
        let model = ReportModel::new().with_section(Section::new().with_block(table));
        let tree = run(&model, PageSetup::default()).unwrap();
        assert!(tree.page_count() > 1);
        for page in &tree.pages {
            let first = page.text_runs().next().unwrap();
            assert_eq!(first.text, "Question");
        }
        let cells: Vec<&str> = tree
            .text_runs()
            .filter(|run| run.text.starts_with('q'))
            .map(|run| run.text.as_str())
            .collect();
        assert_eq!(cells.len(), 120);
        assert_eq!(cells[119], "q119");
    }

    #[test]
    fn test_page_limit() {
        let long = "word ".repeat(5000);
        let model = ReportModel::new().with_section(Section::new().with_block(TextBlock::body(long)));
        assert_eq!(
            run(&model, PageSetup::default().with_max_pages(2)).unwrap_err(),
            LayoutError::PageLimitExceeded { limit: 2 }
        );
    }
}
