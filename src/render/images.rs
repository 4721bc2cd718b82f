//! Image embedding
//!
//! JPEG data is checked by a full decode and passed through with DCTDecode. Other raster formats are
//! decoded with `image` and written as 8-bit RGB (or gray) with an SMask when
//! they carry alpha. SVG is rasterised with resvg at print resolution.

use image::{DynamicImage, GenericImageView};
use jpeg_decoder::PixelFormat;
use log::debug;
use pdf_writer::{Filter, Pdf, Ref};
use resvg::tiny_skia::{Pixmap, Transform};
use usvg::{Options, Tree};
use std::io::Cursor;

use super::{deflate, RefAllocator};
use crate::assets::{ImageHandle, ImageKind};
use crate::error::RenderError;
use crate::types::Size;

/// Resolution SVG images are rasterised at
const SVG_DPI: f64 = 300.0;
/// Largest raster edge produced from an SVG
const SVG_MAX_PIXELS: f64 = 4096.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorSpace {
    Gray,
    Rgb,
}

/// Decoded samples ready to be written as an image XObject
struct Raster {
    width: u32,
    height: u32,
    color: ColorSpace,
    samples: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

/// An image used by the document
pub struct ImageEntry {
    pub image: ImageHandle,
    pub resource: String,
    pub id: Ref,
    /// Largest size the image is drawn at, in points
    pub max_display: Size,
}

impl ImageEntry {
    pub fn new(image: ImageHandle, resource: String, id: Ref) -> Self {
        Self {
            image,
            resource,
            id,
            max_display: Size::new(0.0, 0.0),
        }
    }

    pub fn record(&mut self, display: Size) {
        self.max_display.width = self.max_display.width.max(display.width);
        self.max_display.height = self.max_display.height.max(display.height);
    }

    fn error(&self, reason: impl Into<String>) -> RenderError {
        RenderError::Image {
            name: self.image.name().to_string(),
            reason: reason.into(),
        }
    }

    pub fn embed(&self, pdf: &mut Pdf, refs: &mut RefAllocator, compress: bool) -> Result<(), RenderError> {
        match self.image.kind() {
            ImageKind::Jpeg => {
                if self.embed_jpeg(pdf)? {
                    return Ok(());
                }
                let decoded = image::load_from_memory(self.image.data())
                    .map_err(|e| self.error(e.to_string()))?;
                self.write_raster(pdf, refs, raster_from(decoded), compress)
            }
            ImageKind::Svg => {
                let raster = self.rasterise_svg()?;
                self.write_raster(pdf, refs, raster, compress)
            }
            ImageKind::Png | ImageKind::Raster(_) => {
                let decoded = image::load_from_memory(self.image.data())
                    .map_err(|e| self.error(e.to_string()))?;
                self.write_raster(pdf, refs, raster_from(decoded), compress)
            }
        }
    }

    /// Write JPEG data untouched once the whole scan decodes. Returns false
    /// for pixel formats that need re-encoding (CMYK, 16-bit gray).
    fn embed_jpeg(&self, pdf: &mut Pdf) -> Result<bool, RenderError> {
        let data = self.image.data();
        let mut decoder = jpeg_decoder::Decoder::new(Cursor::new(data));
        decoder
            .decode()
            .map_err(|e| self.error(e.to_string()))?;
        let info = decoder
            .info()
            .ok_or_else(|| self.error("JPEG header has no frame"))?;

        let color = match info.pixel_format {
            PixelFormat::L8 => ColorSpace::Gray,
            PixelFormat::RGB24 => ColorSpace::Rgb,
            _ => return Ok(false),
        };

        let mut xobject = pdf.image_xobject(self.id, data);
        xobject.filter(Filter::DctDecode);
        xobject.width(info.width as i32);
        xobject.height(info.height as i32);
        match color {
            ColorSpace::Gray => xobject.color_space().device_gray(),
            ColorSpace::Rgb => xobject.color_space().device_rgb(),
        };
        xobject.bits_per_component(8);
        debug!(
            "Embedded JPEG '{}' as passthrough ({}x{})",
            self.image.name(),
            info.width,
            info.height
        );
        Ok(true)
    }

    fn rasterise_svg(&self) -> Result<Raster, RenderError> {
        let text = std::str::from_utf8(self.image.data()).map_err(|e| self.error(e.to_string()))?;
        let fontdb = usvg::fontdb::Database::new();
        let tree = Tree::from_str(text, &Options::default(), &fontdb)
            .map_err(|e| self.error(e.to_string()))?;

        let svg_size = tree.size();
        let (svg_width, svg_height) = (svg_size.width() as f64, svg_size.height() as f64);
        let display = if self.max_display.width > 0.0 {
            self.max_display
        } else {
            Size::new(svg_width, svg_height)
        };
        let pixels_per_point = SVG_DPI / 72.0;
        let mut width = (display.width * pixels_per_point).max(1.0);
        let mut height = (display.height * pixels_per_point).max(1.0);
        let longest = width.max(height);
        if longest > SVG_MAX_PIXELS {
            width *= SVG_MAX_PIXELS / longest;
            height *= SVG_MAX_PIXELS / longest;
        }
        let (width, height) = (width.round() as u32, height.round() as u32);

        let mut pixmap = Pixmap::new(width, height)
            .ok_or_else(|| self.error(format!("cannot allocate {}x{} pixmap", width, height)))?;
        let transform = Transform::from_scale(
            (width as f64 / svg_width) as f32,
            (height as f64 / svg_height) as f32,
        );
        resvg::render(&tree, transform, &mut pixmap.as_mut());

        let mut samples = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        for pixel in pixmap.pixels() {
            let color = pixel.demultiply();
            samples.extend_from_slice(&[color.red(), color.green(), color.blue()]);
            alpha.push(color.alpha());
        }
        debug!(
            "Rasterised SVG '{}' to {}x{} px",
            self.image.name(),
            width,
            height
        );

        Ok(Raster {
            width,
            height,
            color: ColorSpace::Rgb,
            samples,
            alpha: Some(alpha),
        })
    }

    fn write_raster(
        &self,
        pdf: &mut Pdf,
        refs: &mut RefAllocator,
        raster: Raster,
        compress: bool,
    ) -> Result<(), RenderError> {
        let encode = |data: Vec<u8>| -> Result<Vec<u8>, RenderError> {
            if compress {
                deflate(&data).map_err(|reason| self.error(reason))
            } else {
                Ok(data)
            }
        };

        let mask_id = match raster.alpha {
            Some(alpha) => {
                let id = refs.next();
                let data = encode(alpha)?;
                let mut mask = pdf.image_xobject(id, &data);
                if compress {
                    mask.filter(Filter::FlateDecode);
                }
                mask.width(raster.width as i32);
                mask.height(raster.height as i32);
                mask.color_space().device_gray();
                mask.bits_per_component(8);
                Some(id)
            }
            None => None,
        };

        let data = encode(raster.samples)?;
        let mut xobject = pdf.image_xobject(self.id, &data);
        if compress {
            xobject.filter(Filter::FlateDecode);
        }
        xobject.width(raster.width as i32);
        xobject.height(raster.height as i32);
        match raster.color {
            ColorSpace::Gray => xobject.color_space().device_gray(),
            ColorSpace::Rgb => xobject.color_space().device_rgb(),
        };
        xobject.bits_per_component(8);
        if let Some(mask_id) = mask_id {
            xobject.s_mask(mask_id);
        }
        Ok(())
    }
}

/// Split a decoded image into color samples and an optional alpha channel
fn raster_from(image: DynamicImage) -> Raster {
    let (width, height) = image.dimensions();
    let has_alpha = image.color().has_alpha();
    let gray = !image.color().has_color();

    match (gray, has_alpha) {
        (true, false) => Raster {
            width,
            height,
            color: ColorSpace::Gray,
            samples: image.to_luma8().into_raw(),
            alpha: None,
        },
        (false, false) => Raster {
            width,
            height,
            color: ColorSpace::Rgb,
            samples: image.to_rgb8().into_raw(),
            alpha: None,
        },
        (_, true) => {
            let rgba = image.to_rgba8().into_raw();
            let mut samples = Vec::with_capacity(rgba.len() / 4 * 3);
            let mut alpha = Vec::with_capacity(rgba.len() / 4);
            for chunk in rgba.chunks_exact(4) {
                samples.extend_from_slice(&chunk[..3]);
                alpha.push(chunk[3]);
            }
            Raster {
                width,
                height,
                color: ColorSpace::Rgb,
                samples,
                alpha: Some(alpha),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    #[test]
    fn test_raster_from_gray() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([7])));
        let raster = raster_from(img);
        assert_eq!(raster.color, ColorSpace::Gray);
        assert_eq!(raster.samples, vec![7; 4]);
        assert!(raster.alpha.is_none());
    }

    #[test]
    fn test_raster_from_rgba_splits_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 2, Rgba([1, 2, 3, 128])));
        let raster = raster_from(img);
        assert_eq!(raster.color, ColorSpace::Rgb);
        assert_eq!(raster.samples, vec![1, 2, 3, 1, 2, 3]);
        assert_eq!(raster.alpha, Some(vec![128, 128]));
    }
}
