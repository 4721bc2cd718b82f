use std::io::Cursor;

use image::{DynamicImage, ImageOutputFormat, RgbImage};
use report_renderer::assets::ImageAsset;
use report_renderer::model::{Footer, FooterLine, ImageBlock, TextBlock, Watermark};
use report_renderer::{
    AssetNotFound, AssetStore, Block, ImageHandle, LayoutEngine, LayoutError, PageSetup,
    PlacedPrimitive, ReportModel, Section, ThemeSet,
};

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageOutputFormat::Png).unwrap();
    out.into_inner()
}

fn store_with_logo() -> AssetStore {
    let mut builder = AssetStore::builder();
    builder.add_image("logo", png(200, 100)).unwrap();
    builder.add_image("chart", png(10, 10)).unwrap();
    builder.build()
}

fn long_text(words: usize) -> String {
    (0..words)
        .map(|i| format!("w{:05}", i))
        .collect::<Vec<_>>()
        .join(" ")
}

fn one_block(block: impl Into<Block>) -> ReportModel {
    ReportModel::new().with_section(Section::new().with_block(block))
}

#[test]
fn layout_is_deterministic() {
    let assets = store_with_logo();
    let themes = ThemeSet::standard(&assets);
    let engine = LayoutEngine::new(&assets, &themes, PageSetup::default());
    let model = one_block(TextBlock::body(long_text(3000)))
        .with_title("Determinism")
        .with_watermark(Watermark::new("logo"));

    let first = engine.layout(&model).unwrap();
    let second = engine.layout(&model).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

#[test]
fn long_text_splits_across_pages_without_losing_lines() {
    let assets = AssetStore::standard();
    let themes = ThemeSet::standard(&assets);
    let engine = LayoutEngine::new(&assets, &themes, PageSetup::default());
    let text = long_text(4000);
    let tree = engine.layout(&one_block(TextBlock::body(text.clone()))).unwrap();

    assert!(tree.page_count() > 1, "expected several pages");
    let words: Vec<String> = tree
        .text_runs()
        .flat_map(|run| run.text.split(' ').map(str::to_string).collect::<Vec<_>>())
        .collect();
    let expected: Vec<String> = text.split(' ').map(str::to_string).collect();
    assert_eq!(words, expected);

    // every page is filled top down and stays inside the content area
    let content = PageSetup::default().content_area().unwrap();
    for page in &tree.pages {
        let baselines: Vec<f64> = page.text_runs().map(|run| run.y).collect();
        assert!(!baselines.is_empty());
        assert!(baselines.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(baselines.iter().all(|y| *y > content.top() && *y < content.bottom()));
    }
}

#[test]
fn missing_font_is_an_unresolved_asset() {
    let assets = AssetStore::standard();
    let themes = ThemeSet::standard(&assets);
    let engine = LayoutEngine::new(&assets, &themes, PageSetup::default());
    let model = one_block(TextBlock::body("Hello").with_font("missing-font"));

    let err = engine.layout(&model).unwrap_err();
    assert_eq!(
        err,
        LayoutError::UnresolvedAsset(AssetNotFound::new("missing-font"))
    );
}

#[test]
fn missing_image_is_an_unresolved_asset() {
    let assets = AssetStore::standard();
    let themes = ThemeSet::standard(&assets);
    let engine = LayoutEngine::new(&assets, &themes, PageSetup::default());
    let err = engine.layout(&one_block(ImageBlock::new("logo"))).unwrap_err();
    assert!(matches!(err, LayoutError::UnresolvedAsset(ref e) if e.name == "logo"));
}

#[test]
fn resolving_a_name_yields_the_same_handle() {
    let assets = store_with_logo();
    let first = assets.resolve("logo").unwrap();
    let second = assets.resolve("logo").unwrap();
    assert_eq!(first, second);
    assert_eq!(first.kind(), "image");

    let themes = ThemeSet::standard(&assets);
    let engine = LayoutEngine::new(&assets, &themes, PageSetup::default());
    let tree = engine
        .layout(&one_block(TextBlock::body(long_text(50))))
        .unwrap();
    let fonts: Vec<_> = tree.text_runs().map(|run| run.font.clone()).collect();
    assert!(fonts.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn watermark_is_drawn_first_on_every_page() {
    let assets = store_with_logo();
    let themes = ThemeSet::standard(&assets);
    let engine = LayoutEngine::new(&assets, &themes, PageSetup::default());
    let model = one_block(TextBlock::body(long_text(3000))).with_watermark(Watermark::new("logo"));
    let tree = engine.layout(&model).unwrap();

    assert!(tree.page_count() > 1);
    for page in &tree.pages {
        match &page.primitives[0] {
            PlacedPrimitive::Image(image) => {
                assert_eq!(image.opacity, 0.08);
                // 60% of an A4 page stays under the 375pt cap
                assert!((image.rect.width - 357.168).abs() < 1e-6);
                assert!((image.rect.height - image.rect.width / 2.0).abs() < 1e-6);
            }
            other => panic!("expected watermark image, got {:?}", other),
        }
    }
}

#[test]
fn attachments_are_resolved_before_the_store() {
    let assets = store_with_logo();
    let themes = ThemeSet::standard(&assets);
    let engine = LayoutEngine::new(&assets, &themes, PageSetup::default());
    let attachment = ImageHandle::new(ImageAsset::from_bytes("chart", png(40, 20)).unwrap());
    let model = one_block(ImageBlock::new("chart")).with_attachment("chart", attachment.clone());

    let tree = engine.layout(&model).unwrap();
    let placed = tree.pages[0]
        .primitives
        .iter()
        .find_map(|primitive| match primitive {
            PlacedPrimitive::Image(image) => Some(image.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(placed.image, attachment);
    assert_eq!(placed.rect.width, 30.0);
    assert_eq!(placed.rect.height, 15.0);
}

#[test]
fn oversized_image_gets_its_own_page() {
    let assets = store_with_logo();
    let themes = ThemeSet::standard(&assets);
    let engine = LayoutEngine::new(&assets, &themes, PageSetup::default());
    let model = ReportModel::new().with_section(
        Section::new()
            .with_block(TextBlock::body("Before"))
            .with_block(ImageBlock::new("chart").with_size(Some(100.0), Some(2000.0)))
            .with_block(TextBlock::body("After")),
    );

    let tree = engine.layout(&model).unwrap();
    assert_eq!(tree.page_count(), 3);
    assert!(matches!(tree.pages[1].primitives[0], PlacedPrimitive::Image(_)));
    assert_eq!(tree.pages[2].text_runs().next().unwrap().text, "After");
}

#[test]
fn tall_footer_pushes_body_text_up() {
    let assets = AssetStore::standard();
    let themes = ThemeSet::standard(&assets);
    let engine = LayoutEngine::new(&assets, &themes, PageSetup::default());
    let mut footer = Footer::new().with_page_numbers();
    for i in 0..12 {
        footer = footer.with_line(FooterLine::new(format!("Footer line {}", i), "footer-strong"));
    }
    let tree = engine
        .layout(&one_block(TextBlock::body(long_text(3000))).with_footer(footer))
        .unwrap();

    assert!(tree.page_count() > 1);
    for page in &tree.pages {
        // body runs are 10pt, footer runs are smaller
        let (body, footer): (Vec<_>, Vec<_>) = page.text_runs().partition(|run| run.size >= 10.0);
        let last_body = body.iter().map(|run| run.y).fold(f64::MIN, f64::max);
        let first_footer = footer.iter().map(|run| run.y).fold(f64::MAX, f64::min);
        assert_eq!(footer.len(), 13);
        assert!(
            last_body < first_footer,
            "page {}: body at {} reaches footer at {}",
            page.number,
            last_body,
            first_footer
        );
        assert!(footer.iter().all(|run| run.y < tree.page_size.height));
    }
}

#[test]
fn long_footer_line_wraps_to_the_content_width() {
    let assets = AssetStore::standard();
    let themes = ThemeSet::standard(&assets);
    let engine = LayoutEngine::new(&assets, &themes, PageSetup::default());
    let footer = Footer::new().with_line(FooterLine::new(long_text(80), "footer"));
    let tree = engine.layout(&ReportModel::new().with_footer(footer)).unwrap();

    let content = PageSetup::default().content_area().unwrap();
    let runs: Vec<_> = tree.text_runs().collect();
    assert!(runs.len() > 1, "expected the footer line to wrap");
    for run in &runs {
        assert!(run.x >= content.left() - 1e-6);
        assert!(run.x + run.width <= content.right() + 1e-6);
    }
    let words: Vec<&str> = runs.iter().flat_map(|run| run.text.split(' ')).collect();
    assert_eq!(words.len(), 80);
}

#[test]
fn footer_taller_than_the_page_is_rejected() {
    let assets = AssetStore::standard();
    let themes = ThemeSet::standard(&assets);
    let engine = LayoutEngine::new(&assets, &themes, PageSetup::default());
    let mut footer = Footer::new();
    for i in 0..200 {
        footer = footer.with_line(FooterLine::new(format!("Footer line {}", i), "footer-strong"));
    }
    let err = engine
        .layout(&one_block(TextBlock::body("Hello")).with_footer(footer))
        .unwrap_err();
    assert!(matches!(err, LayoutError::FooterTooTall { .. }));
}

#[test]
fn heading_stays_with_the_following_text() {
    let assets = AssetStore::standard();
    let themes = ThemeSet::standard(&assets);
    let engine = LayoutEngine::new(&assets, &themes, PageSetup::default());

    // slide the heading through every position near the end of the first page
    for filler_lines in 30..50 {
        let filler = vec!["filler"; filler_lines].join("\n");
        let model = ReportModel::new().with_section(
            Section::new()
                .with_block(TextBlock::body(filler))
                .with_block(TextBlock::new("Next section", "heading"))
                .with_block(TextBlock::body("after")),
        );
        let tree = engine.layout(&model).unwrap();
        let page = tree
            .pages
            .iter()
            .find(|page| page.text_runs().any(|run| run.text == "Next section"))
            .unwrap();
        assert!(
            page.text_runs().any(|run| run.text == "after"),
            "heading left alone at the bottom of page {} with {} filler lines",
            page.number,
            filler_lines
        );
    }
}
