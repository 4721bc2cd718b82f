//! Image assets
//!
//! Images are probed when they are registered (format and pixel size) but
//! decoded only by the render backend. A file with a valid header and a
//! corrupt body is therefore accepted here and fails at render time.

use image::io::Reader as ImageReader;
use image::ImageFormat;
use usvg::{Options, Tree};
use std::io::Cursor;

use crate::types::Size;

/// Points per CSS pixel (96 dpi)
pub const POINTS_PER_PIXEL: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Svg,
    /// Any other raster format the `image` crate can decode
    Raster(ImageFormat),
}

impl ImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpeg",
            ImageKind::Svg => "svg",
            ImageKind::Raster(_) => "raster",
        }
    }
}

#[derive(Debug)]
pub struct ImageAsset {
    name: String,
    data: Vec<u8>,
    kind: ImageKind,
    pixel_width: u32,
    pixel_height: u32,
}

impl ImageAsset {
    /// Probe `data` and register it under `name`.
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Result<Self, String> {
        let name = name.into();
        let (kind, pixel_width, pixel_height) = if looks_like_svg(&data) {
            let (w, h) = probe_svg(&data)?;
            (ImageKind::Svg, w, h)
        } else {
            probe_raster(&data)?
        };

        if pixel_width == 0 || pixel_height == 0 {
            return Err(format!("image has zero size ({}x{})", pixel_width, pixel_height));
        }

        Ok(Self {
            name,
            data,
            kind,
            pixel_width,
            pixel_height,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        (self.pixel_width, self.pixel_height)
    }

    /// Size the image takes when no explicit dimensions are given
    pub fn natural_size(&self) -> Size {
        Size::new(
            self.pixel_width as f64 * POINTS_PER_PIXEL,
            self.pixel_height as f64 * POINTS_PER_PIXEL,
        )
    }

    /// Height / width
    pub fn aspect_ratio(&self) -> f64 {
        self.pixel_height as f64 / self.pixel_width as f64
    }
}

fn looks_like_svg(data: &[u8]) -> bool {
    let head = &data[..data.len().min(512)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg"))
}

fn probe_svg(data: &[u8]) -> Result<(u32, u32), String> {
    let text = std::str::from_utf8(data).map_err(|e| format!("SVG is not UTF-8: {}", e))?;
    let fontdb = usvg::fontdb::Database::new();
    let tree = Tree::from_str(text, &Options::default(), &fontdb)
        .map_err(|e| format!("failed to parse SVG: {}", e))?;
    let size = tree.size();
    Ok((size.width().ceil() as u32, size.height().ceil() as u32))
}

fn probe_raster(data: &[u8]) -> Result<(ImageKind, u32, u32), String> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| format!("failed to read image header: {}", e))?;
    let format = reader
        .format()
        .ok_or_else(|| "unrecognised image format".to_string())?;
    let kind = match format {
        ImageFormat::Png => ImageKind::Png,
        ImageFormat::Jpeg => ImageKind::Jpeg,
        other => ImageKind::Raster(other),
    };
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| format!("failed to read image dimensions: {}", e))?;
    Ok((kind, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageOutputFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_probe_png() {
        let asset = ImageAsset::from_bytes("chart", png_bytes(40, 20)).unwrap();
        assert_eq!(asset.kind(), ImageKind::Png);
        assert_eq!(asset.pixel_size(), (40, 20));
        assert_eq!(asset.natural_size(), Size::new(30.0, 15.0));
        assert_eq!(asset.aspect_ratio(), 0.5);
    }

    #[test]
    fn test_probe_svg() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="50">
            <rect width="100" height="50" fill="red"/></svg>"#;
        let asset = ImageAsset::from_bytes("logo", svg.to_vec()).unwrap();
        assert_eq!(asset.kind(), ImageKind::Svg);
        assert_eq!(asset.pixel_size(), (100, 50));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(ImageAsset::from_bytes("junk", b"not an image".to_vec()).is_err());
    }
}
