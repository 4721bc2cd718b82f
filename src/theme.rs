//! Themes: named text styles resolved against the asset store
//!
//! A [`ThemeSet`] is built once at startup and shared read-only by every
//! request. Style values are in points.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::assets::AssetStore;
use crate::error::{ConfigError, LayoutError};
use crate::types::{Alignment, Color};

pub const DEFAULT_THEME: &str = "default";

/// Style names every theme built by [`ThemeSet::standard`] provides
pub mod styles {
    pub const TITLE: &str = "title";
    pub const HEADING: &str = "heading";
    pub const SUBHEADING: &str = "subheading";
    pub const BODY: &str = "body";
    pub const QUESTION: &str = "question";
    pub const ANSWER: &str = "answer";
    pub const CAPTION: &str = "caption";
    pub const FOOTER: &str = "footer";
    pub const FOOTER_STRONG: &str = "footer-strong";
    pub const TABLE_HEADER: &str = "table-header";
    pub const TABLE_CELL: &str = "table-cell";
}

const PLEX_REGULAR: &str = "IBMPlexSans-Regular";
const PLEX_MEDIUM: &str = "IBMPlexSans-Medium";
const PLEX_BOLD: &str = "IBMPlexSans-Bold";

fn default_line_height() -> f64 {
    1.2
}

fn default_color() -> Color {
    Color::black()
}

/// Horizontal rule drawn under a block of text
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleStyle {
    pub width: f64,
    pub color: Color,
    /// Distance between the last line's descent and the rule
    #[serde(default)]
    pub gap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextStyle {
    /// Asset store name of the font
    pub font: String,
    pub size: f64,
    #[serde(default = "default_color")]
    pub color: Color,
    #[serde(default)]
    pub align: Alignment,
    /// Line pitch as a multiple of the font size
    #[serde(default = "default_line_height")]
    pub line_height: f64,
    #[serde(default)]
    pub space_before: f64,
    #[serde(default)]
    pub space_after: f64,
    #[serde(default)]
    pub rule_below: Option<RuleStyle>,
    /// Never end a page with this block; it moves down with the next line
    #[serde(default)]
    pub keep_with_next: bool,
}

impl TextStyle {
    pub fn new(font: impl Into<String>, size: f64) -> Self {
        Self {
            font: font.into(),
            size,
            color: Color::black(),
            align: Alignment::Left,
            line_height: default_line_height(),
            space_before: 0.0,
            space_after: 0.0,
            rule_below: None,
            keep_with_next: false,
        }
    }

    pub fn color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn align(mut self, align: Alignment) -> Self {
        self.align = align;
        self
    }

    pub fn line_height(mut self, line_height: f64) -> Self {
        self.line_height = line_height;
        self
    }

    pub fn spacing(mut self, before: f64, after: f64) -> Self {
        self.space_before = before;
        self.space_after = after;
        self
    }

    pub fn rule_below(mut self, rule: RuleStyle) -> Self {
        self.rule_below = Some(rule);
        self
    }

    pub fn keep_with_next(mut self) -> Self {
        self.keep_with_next = true;
        self
    }

    /// Distance between consecutive baselines
    pub fn line_pitch(&self) -> f64 {
        self.size * self.line_height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableStyle {
    pub border_width: f64,
    pub border_color: Color,
    pub cell_padding: f64,
    #[serde(default = "default_table_spacing")]
    pub space_before: f64,
    #[serde(default = "default_table_spacing")]
    pub space_after: f64,
}

fn default_table_spacing() -> f64 {
    8.0
}

impl Default for TableStyle {
    fn default() -> Self {
        Self {
            border_width: 0.75,
            border_color: hex("#e0e0e0"),
            cell_padding: 6.0,
            space_before: default_table_spacing(),
            space_after: default_table_spacing(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Theme {
    pub name: String,
    pub styles: BTreeMap<String, TextStyle>,
    #[serde(default)]
    pub table: TableStyle,
}

impl Theme {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            styles: BTreeMap::new(),
            table: TableStyle::default(),
        }
    }

    pub fn with_style(mut self, name: impl Into<String>, style: TextStyle) -> Self {
        self.styles.insert(name.into(), style);
        self
    }

    pub fn style(&self, name: &str) -> Result<&TextStyle, LayoutError> {
        self.styles
            .get(name)
            .ok_or_else(|| LayoutError::UnknownStyle(name.to_string()))
    }

    /// Check that every style is usable: positive sizes and fonts present in the store
    pub fn validate(&self, assets: &AssetStore) -> Result<(), ConfigError> {
        for (style_name, style) in &self.styles {
            let key = format!("themes.{}.{}", self.name, style_name);
            if !(style.size > 0.0 && style.size.is_finite()) {
                return Err(ConfigError::invalid(format!("{}.size", key), "must be positive"));
            }
            if !(style.line_height > 0.0 && style.line_height.is_finite()) {
                return Err(ConfigError::invalid(
                    format!("{}.line_height", key),
                    "must be positive",
                ));
            }
            assets
                .resolve_font(&style.font)
                .map_err(|e| ConfigError::invalid(format!("{}.font", key), e.to_string()))?;
        }
        Ok(())
    }
}

/// All themes known to the service, keyed by name
#[derive(Debug, Clone, Default)]
pub struct ThemeSet {
    themes: BTreeMap<String, Theme>,
}

impl ThemeSet {
    /// The `default` theme, using the bundled IBM Plex Sans fonts when the
    /// store has them and the standard Helvetica faces otherwise.
    pub fn standard(assets: &AssetStore) -> Self {
        let plex = [PLEX_REGULAR, PLEX_MEDIUM, PLEX_BOLD]
            .iter()
            .all(|name| assets.resolve_font(name).is_ok());
        let (regular, medium, bold) = if plex {
            (PLEX_REGULAR, PLEX_MEDIUM, PLEX_BOLD)
        } else {
            ("Helvetica", "Helvetica-Bold", "Helvetica-Bold")
        };
        debug!("Default theme uses {} / {} / {}", regular, medium, bold);

        let body_color = hex("#333333");
        let muted = hex("#555555");
        let theme = Theme::new(DEFAULT_THEME)
            .with_style(
                styles::TITLE,
                TextStyle::new(bold, 18.0)
                    .color(hex("#2c3e50"))
                    .align(Alignment::Center)
                    .spacing(0.0, 14.0)
                    .keep_with_next()
                    .rule_below(RuleStyle {
                        width: 1.5,
                        color: hex("#3498db"),
                        gap: 4.0,
                    }),
            )
            .with_style(
                styles::HEADING,
                TextStyle::new(medium, 15.0)
                    .color(hex("#34495e"))
                    .spacing(26.0, 10.0)
                    .keep_with_next()
                    .rule_below(RuleStyle {
                        width: 0.75,
                        color: hex("#bdc3c7"),
                        gap: 3.0,
                    }),
            )
            .with_style(
                styles::SUBHEADING,
                TextStyle::new(medium, 12.0)
                    .color(hex("#7f8c8d"))
                    .spacing(8.0, 11.0)
                    .keep_with_next(),
            )
            .with_style(
                styles::BODY,
                TextStyle::new(regular, 10.0)
                    .color(body_color)
                    .line_height(1.7)
                    .spacing(0.0, 8.0),
            )
            .with_style(
                styles::QUESTION,
                TextStyle::new(bold, 10.0)
                    .color(hex("#34495e"))
                    .line_height(1.5)
                    .spacing(6.0, 2.0)
                    .keep_with_next(),
            )
            .with_style(
                styles::ANSWER,
                TextStyle::new(regular, 10.0)
                    .color(muted)
                    .line_height(1.5)
                    .spacing(2.0, 10.0),
            )
            .with_style(
                styles::CAPTION,
                TextStyle::new(bold, 9.75)
                    .color(muted)
                    .align(Alignment::Center)
                    .spacing(2.0, 6.0),
            )
            .with_style(
                styles::FOOTER,
                TextStyle::new(regular, 5.25).color(muted).align(Alignment::Center),
            )
            .with_style(
                styles::FOOTER_STRONG,
                TextStyle::new(bold, 6.0)
                    .color(muted)
                    .align(Alignment::Center)
                    .spacing(0.0, 1.5),
            )
            .with_style(
                styles::TABLE_HEADER,
                TextStyle::new(bold, 9.0).color(hex("#34495e")).line_height(1.3),
            )
            .with_style(
                styles::TABLE_CELL,
                TextStyle::new(regular, 9.0).color(body_color).line_height(1.3),
            );

        let mut set = Self::default();
        set.insert(theme);
        set
    }

    /// The standard set plus every theme in a JSON file (an array of themes).
    /// A theme in the file replaces a standard theme of the same name.
    pub fn load_file(path: &Path, assets: &AssetStore) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let themes: Vec<Theme> = serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut set = Self::standard(assets);
        for theme in themes {
            theme.validate(assets)?;
            info!("Loaded theme '{}' ({} styles)", theme.name, theme.styles.len());
            set.insert(theme);
        }
        Ok(set)
    }

    pub fn insert(&mut self, theme: Theme) {
        self.themes.insert(theme.name.clone(), theme);
    }

    pub fn get(&self, name: &str) -> Result<&Theme, LayoutError> {
        self.themes
            .get(name)
            .ok_or_else(|| LayoutError::UnknownTheme(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.themes.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.themes.keys().map(String::as_str)
    }
}

fn hex(value: &str) -> Color {
    Color::from_hex(value).unwrap_or_else(|_| Color::black())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_standard_theme_falls_back_to_helvetica() {
        let assets = AssetStore::standard();
        let themes = ThemeSet::standard(&assets);
        let theme = themes.get(DEFAULT_THEME).unwrap();
        assert_eq!(theme.style(styles::BODY).unwrap().font, "Helvetica");
        assert_eq!(theme.style(styles::TITLE).unwrap().font, "Helvetica-Bold");
        assert!(theme.validate(&assets).is_ok());
        for name in [styles::QUESTION, styles::FOOTER_STRONG, styles::TABLE_CELL] {
            assert!(theme.style(name).is_ok(), "missing style {}", name);
        }
    }

    #[test]
    fn test_unknown_theme_and_style() {
        let themes = ThemeSet::standard(&AssetStore::standard());
        assert_eq!(
            themes.get("fancy").unwrap_err(),
            LayoutError::UnknownTheme("fancy".into())
        );
        let theme = themes.get(DEFAULT_THEME).unwrap();
        assert_eq!(
            theme.style("shout").unwrap_err(),
            LayoutError::UnknownStyle("shout".into())
        );
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r##"[{{"name": "mono", "styles": {{"body": {{"font": "Courier", "size": 9, "color": "#111"}}}}}}]"##
        )
        .unwrap();

        let assets = AssetStore::standard();
        let themes = ThemeSet::load_file(file.path(), &assets).unwrap();
        assert!(themes.contains(DEFAULT_THEME));
        let body = themes.get("mono").unwrap().style("body").unwrap();
        assert_eq!(body.font, "Courier");
        assert_eq!(body.line_height, 1.2);
        assert_eq!(body.color.to_hex(), "#111111");
    }

    #[test]
    fn test_load_file_rejects_missing_font() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name": "bad", "styles": {{"body": {{"font": "Comic", "size": 9}}}}}}]"#
        )
        .unwrap();

        let err = ThemeSet::load_file(file.path(), &AssetStore::standard()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "themes.bad.body.font"));
    }
}
