//! Report requests: the JSON payload and its validation into a [`ReportModel`]
//!
//! Parsing rejects unknown fields. Validation checks everything that can be
//! checked without laying the report out: the theme exists, dimensions and
//! opacities are in range, and attachments decode to images that do not
//! shadow asset store entries. Everything else (style names, asset
//! references, table shape) is left to layout.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::assets::{AssetStore, ImageAsset, ImageHandle};
use crate::error::ValidationError;
use crate::model::{
    Block, Footer, FooterLine, ImageBlock, ReportModel, Section, TableBlock, TextBlock, Watermark,
};
use crate::theme::{styles, ThemeSet, DEFAULT_THEME};
use crate::types::Alignment;

fn default_theme() -> String {
    DEFAULT_THEME.to_string()
}

fn default_body() -> String {
    styles::BODY.to_string()
}

fn default_footer_style() -> String {
    styles::FOOTER.to_string()
}

fn default_cell_style() -> String {
    styles::TABLE_CELL.to_string()
}

fn default_header_style() -> String {
    styles::TABLE_HEADER.to_string()
}

fn default_true() -> bool {
    true
}

fn default_align_center() -> Alignment {
    Alignment::Center
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default)]
    pub sections: Vec<SectionRequest>,
    #[serde(default)]
    pub watermark: Option<WatermarkRequest>,
    #[serde(default)]
    pub footer: Option<FooterRequest>,
    /// Base64 encoded images, by name
    #[serde(default)]
    pub attachments: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SectionRequest {
    #[serde(default)]
    pub heading: Option<String>,
    #[serde(default)]
    pub blocks: Vec<BlockRequest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum BlockRequest {
    Text {
        content: String,
        #[serde(default = "default_body")]
        style: String,
        #[serde(default)]
        font: Option<String>,
        #[serde(default)]
        align: Option<Alignment>,
    },
    Image {
        asset: String,
        #[serde(default)]
        width: Option<f64>,
        #[serde(default)]
        height: Option<f64>,
        #[serde(default = "default_align_center")]
        align: Alignment,
        #[serde(default)]
        caption: Option<String>,
    },
    Table {
        columns: Vec<String>,
        #[serde(default)]
        rows: Vec<Vec<String>>,
        #[serde(default = "default_cell_style")]
        cell_style: String,
        #[serde(default = "default_header_style")]
        header_style: String,
        #[serde(default = "default_true")]
        show_header: bool,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatermarkRequest {
    pub asset: String,
    #[serde(default)]
    pub opacity: Option<f64>,
    #[serde(default)]
    pub width_ratio: Option<f64>,
    #[serde(default)]
    pub max_width: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FooterLineRequest {
    pub text: String,
    #[serde(default = "default_footer_style")]
    pub style: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FooterRequest {
    #[serde(default)]
    pub lines: Vec<FooterLineRequest>,
    #[serde(default = "default_true")]
    pub divider: bool,
    #[serde(default)]
    pub page_numbers: bool,
}

/// What validation checks a request against
pub struct ValidationContext<'a> {
    pub assets: &'a AssetStore,
    pub themes: &'a ThemeSet,
}

impl ReportRequest {
    /// Parse a JSON payload of at most `limit` bytes
    pub fn from_json(payload: &[u8], limit: usize) -> Result<Self, ValidationError> {
        if payload.len() > limit {
            return Err(ValidationError::TooLarge {
                size: payload.len(),
                limit,
            });
        }
        serde_json::from_slice(payload).map_err(classify_json_error)
    }

    /// Validate and build the report model
    pub fn into_model(self, ctx: &ValidationContext<'_>) -> Result<ReportModel, ValidationError> {
        if !ctx.themes.contains(&self.theme) {
            return Err(ValidationError::invalid(
                "theme",
                format!("unknown theme '{}'", self.theme),
            ));
        }

        let attachments = decode_attachments(self.attachments, ctx.assets)?;

        let mut sections = Vec::with_capacity(self.sections.len());
        for (s, section) in self.sections.into_iter().enumerate() {
            let mut blocks = Vec::with_capacity(section.blocks.len() + 1);
            if let Some(heading) = section.heading {
                blocks.push(Block::Text(TextBlock::new(heading, styles::HEADING)));
            }
            for (b, block) in section.blocks.into_iter().enumerate() {
                let field = |name: &str| format!("sections[{}].blocks[{}].{}", s, b, name);
                blocks.push(convert_block(block, field)?);
            }
            sections.push(Section { blocks });
        }

        let watermark = self.watermark.map(convert_watermark).transpose()?;
        let footer = self.footer.map(|footer| Footer {
            lines: footer
                .lines
                .into_iter()
                .map(|line| FooterLine::new(line.text, line.style))
                .collect(),
            divider: footer.divider,
            page_numbers: footer.page_numbers,
        });

        Ok(ReportModel {
            title: self.title.filter(|title| !title.trim().is_empty()),
            theme: self.theme,
            sections,
            watermark,
            footer,
            attachments,
        })
    }
}

fn classify_json_error(err: serde_json::Error) -> ValidationError {
    let message = err.to_string();
    // serde reports "missing field `name` at line L column C"
    if let Some(rest) = message.strip_prefix("missing field `") {
        if let Some((field, _)) = rest.split_once('`') {
            return ValidationError::MissingField(field.to_string());
        }
    }
    ValidationError::Malformed(message)
}

fn positive(value: Option<f64>, field: String) -> Result<Option<f64>, ValidationError> {
    match value {
        Some(v) if !(v.is_finite() && v > 0.0) => {
            Err(ValidationError::invalid(field, "must be a positive number"))
        }
        other => Ok(other),
    }
}

fn convert_block(
    block: BlockRequest,
    field: impl Fn(&str) -> String,
) -> Result<Block, ValidationError> {
    let block = match block {
        BlockRequest::Text {
            content,
            style,
            font,
            align,
        } => Block::Text(TextBlock {
            content,
            style,
            font,
            align,
        }),
        BlockRequest::Image {
            asset,
            width,
            height,
            align,
            caption,
        } => {
            if asset.trim().is_empty() {
                return Err(ValidationError::MissingField(field("asset")));
            }
            Block::Image(ImageBlock {
                asset,
                width: positive(width, field("width"))?,
                height: positive(height, field("height"))?,
                align,
                caption,
            })
        }
        BlockRequest::Table {
            columns,
            rows,
            cell_style,
            header_style,
            show_header,
        } => Block::Table(TableBlock {
            columns,
            rows,
            cell_style,
            header_style,
            show_header,
        }),
    };
    Ok(block)
}

fn convert_watermark(request: WatermarkRequest) -> Result<Watermark, ValidationError> {
    let mut watermark = Watermark::new(request.asset);
    if let Some(opacity) = request.opacity {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(ValidationError::invalid(
                "watermark.opacity",
                "must be between 0 and 1",
            ));
        }
        watermark.opacity = opacity;
    }
    if let Some(ratio) = request.width_ratio {
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ValidationError::invalid(
                "watermark.width_ratio",
                "must be in (0, 1]",
            ));
        }
        watermark.width_ratio = ratio;
    }
    if let Some(max_width) = positive(request.max_width, "watermark.max_width".to_string())? {
        watermark.max_width = max_width;
    }
    Ok(watermark)
}

fn decode_attachments(
    raw: BTreeMap<String, String>,
    assets: &AssetStore,
) -> Result<BTreeMap<String, ImageHandle>, ValidationError> {
    let mut attachments = BTreeMap::new();
    for (name, encoded) in raw {
        let field = format!("attachments.{}", name);
        if name.trim().is_empty() {
            return Err(ValidationError::invalid("attachments", "empty attachment name"));
        }
        if assets.contains(&name) {
            return Err(ValidationError::invalid(
                field,
                "name is already used by a loaded asset",
            ));
        }
        let encoded = encoded
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(";base64,").map(|(_, data)| data))
            .unwrap_or(encoded.as_str());
        let data = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ValidationError::invalid(field.clone(), format!("invalid base64: {}", e)))?;
        let image = ImageAsset::from_bytes(name.clone(), data)
            .map_err(|reason| ValidationError::invalid(field, reason))?;
        attachments.insert(name, ImageHandle::new(image));
    }
    Ok(attachments)
}
