//! Asset store: the read-only registry of fonts and images
//!
//! The store is loaded once at startup and shared by every request. Lookups
//! hand out reference-counted handles, so resolving the same name twice
//! yields handles to the same loaded asset.

pub mod fonts;
pub mod images;

use log::{debug, info, warn};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{AssetLoadError, AssetNotFound, LayoutError};
pub use fonts::{FontAsset, FontMetrics, Glyph, Shaper, StandardFont};
pub use images::{ImageAsset, ImageKind};

/// Name the configured logo file is registered under
pub const LOGO_ASSET: &str = "logo";

const FONT_EXTENSIONS: [&str; 2] = ["ttf", "otf"];

/// Shared handle to a loaded font
#[derive(Debug, Clone)]
pub struct FontHandle(Arc<FontAsset>);

impl FontHandle {
    pub fn new(font: FontAsset) -> Self {
        Self(Arc::new(font))
    }
}

impl Deref for FontHandle {
    type Target = FontAsset;

    fn deref(&self) -> &FontAsset {
        &self.0
    }
}

impl PartialEq for FontHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Serialize for FontHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Shared handle to a loaded image
#[derive(Debug, Clone)]
pub struct ImageHandle(Arc<ImageAsset>);

impl ImageHandle {
    pub fn new(image: ImageAsset) -> Self {
        Self(Arc::new(image))
    }
}

impl Deref for ImageHandle {
    type Target = ImageAsset;

    fn deref(&self) -> &ImageAsset {
        &self.0
    }
}

impl PartialEq for ImageHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Serialize for ImageHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Resolved reference to a loaded font or image
#[derive(Debug, Clone, PartialEq)]
pub enum AssetHandle {
    Font(FontHandle),
    Image(ImageHandle),
}

impl AssetHandle {
    pub fn name(&self) -> &str {
        match self {
            AssetHandle::Font(font) => font.name(),
            AssetHandle::Image(image) => image.name(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AssetHandle::Font(_) => "font",
            AssetHandle::Image(_) => "image",
        }
    }
}

/// Filesystem locations the store is loaded from
#[derive(Debug, Clone, Default)]
pub struct AssetSources {
    pub fonts_dir: Option<PathBuf>,
    pub logo: Option<PathBuf>,
    pub images: Vec<PathBuf>,
    /// Names that must be present once loading finishes
    pub required: Vec<String>,
}

#[derive(Debug, Default)]
pub struct AssetStore {
    entries: BTreeMap<String, AssetHandle>,
}

impl AssetStore {
    /// Store holding only the standard PDF fonts
    pub fn standard() -> Self {
        AssetStoreBuilder::new().build()
    }

    pub fn builder() -> AssetStoreBuilder {
        AssetStoreBuilder::new()
    }

    /// Load fonts and images from the filesystem.
    ///
    /// Fonts are registered under their file stem, the logo under `logo`,
    /// extra images under their file stem. Any unreadable file or missing
    /// required name fails the whole load.
    pub fn load(sources: &AssetSources) -> Result<Self, AssetLoadError> {
        let mut builder = AssetStoreBuilder::new();

        if let Some(dir) = &sources.fonts_dir {
            for path in font_files(dir)? {
                let name = file_stem(&path);
                let data = read_file(&path)?;
                builder.add_font_at(&name, data, &path)?;
            }
        }

        if let Some(logo) = &sources.logo {
            let data = read_file(logo)?;
            builder.add_image_at(LOGO_ASSET, data, logo)?;
        }

        for path in &sources.images {
            let data = read_file(path)?;
            builder.add_image_at(&file_stem(path), data, path)?;
        }

        let store = builder.build();
        for name in &sources.required {
            if !store.contains(name) {
                return Err(AssetLoadError::MissingRequired(name.clone()));
            }
        }

        info!(
            "Asset store loaded: {} fonts, {} images",
            store.fonts().count(),
            store.images().count()
        );
        Ok(store)
    }

    pub fn resolve(&self, name: &str) -> Result<AssetHandle, AssetNotFound> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| AssetNotFound::new(name))
    }

    pub fn resolve_font(&self, name: &str) -> Result<FontHandle, LayoutError> {
        match self.resolve(name)? {
            AssetHandle::Font(font) => Ok(font),
            AssetHandle::Image(_) => Err(LayoutError::WrongAssetKind {
                name: name.to_string(),
                expected: "font",
            }),
        }
    }

    pub fn resolve_image(&self, name: &str) -> Result<ImageHandle, LayoutError> {
        match self.resolve(name)? {
            AssetHandle::Image(image) => Ok(image),
            AssetHandle::Font(_) => Err(LayoutError::WrongAssetKind {
                name: name.to_string(),
                expected: "image",
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AssetHandle)> {
        self.entries.iter().map(|(name, handle)| (name.as_str(), handle))
    }

    pub fn fonts(&self) -> impl Iterator<Item = &FontHandle> {
        self.entries.values().filter_map(|handle| match handle {
            AssetHandle::Font(font) => Some(font),
            AssetHandle::Image(_) => None,
        })
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageHandle> {
        self.entries.values().filter_map(|handle| match handle {
            AssetHandle::Image(image) => Some(image),
            AssetHandle::Font(_) => None,
        })
    }
}

/// Builds an [`AssetStore`]; the standard PDF fonts are always registered.
#[derive(Debug)]
pub struct AssetStoreBuilder {
    entries: BTreeMap<String, AssetHandle>,
}

impl Default for AssetStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetStoreBuilder {
    pub fn new() -> Self {
        let entries = StandardFont::ALL
            .iter()
            .map(|font| {
                (
                    font.base_font().to_string(),
                    AssetHandle::Font(FontHandle::new(FontAsset::standard(*font))),
                )
            })
            .collect();
        Self { entries }
    }

    pub fn add_font(&mut self, name: &str, data: Vec<u8>) -> Result<&mut Self, AssetLoadError> {
        self.add_font_at(name, data, Path::new(name))
    }

    pub fn add_image(&mut self, name: &str, data: Vec<u8>) -> Result<&mut Self, AssetLoadError> {
        self.add_image_at(name, data, Path::new(name))
    }

    fn add_font_at(
        &mut self,
        name: &str,
        data: Vec<u8>,
        path: &Path,
    ) -> Result<&mut Self, AssetLoadError> {
        let font = FontAsset::truetype(name, data).map_err(|reason| AssetLoadError::InvalidFont {
            path: path.to_path_buf(),
            reason,
        })?;
        debug!("Registered font '{}' from {}", name, path.display());
        self.insert(name, AssetHandle::Font(FontHandle::new(font)))
    }

    fn add_image_at(
        &mut self,
        name: &str,
        data: Vec<u8>,
        path: &Path,
    ) -> Result<&mut Self, AssetLoadError> {
        let image = ImageAsset::from_bytes(name, data).map_err(|reason| {
            AssetLoadError::InvalidImage {
                path: path.to_path_buf(),
                reason,
            }
        })?;
        debug!(
            "Registered {} image '{}' ({}x{} px)",
            image.kind().as_str(),
            name,
            image.pixel_size().0,
            image.pixel_size().1
        );
        self.insert(name, AssetHandle::Image(ImageHandle::new(image)))
    }

    fn insert(&mut self, name: &str, handle: AssetHandle) -> Result<&mut Self, AssetLoadError> {
        if self.entries.contains_key(name) {
            return Err(AssetLoadError::Duplicate(name.to_string()));
        }
        self.entries.insert(name.to_string(), handle);
        Ok(self)
    }

    pub fn build(self) -> AssetStore {
        AssetStore {
            entries: self.entries,
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, AssetLoadError> {
    std::fs::read(path).map_err(|source| AssetLoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Font files directly inside `dir`, sorted by path
fn font_files(dir: &Path) -> Result<Vec<PathBuf>, AssetLoadError> {
    let io_err = |source| AssetLoadError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_font = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| FONT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_font && path.is_file() {
            files.push(path);
        } else if path.is_file() {
            warn!("Skipping non-font file in fonts directory: {}", path.display());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_fonts_registered() {
        let store = AssetStore::standard();
        assert_eq!(store.len(), StandardFont::ALL.len());
        for font in StandardFont::ALL {
            assert!(store.contains(font.base_font()));
        }
    }

    #[test]
    fn test_resolve_returns_same_handle() {
        let store = AssetStore::standard();
        let first = store.resolve("Helvetica").unwrap();
        let second = store.resolve("Helvetica").unwrap();
        assert_eq!(first, second);
        assert_ne!(first, store.resolve("Courier").unwrap());
    }

    #[test]
    fn test_resolve_missing() {
        let store = AssetStore::standard();
        let err = store.resolve("missing-font").unwrap_err();
        assert_eq!(err, AssetNotFound::new("missing-font"));
        assert_eq!(
            store.resolve_font("missing-font").unwrap_err(),
            LayoutError::UnresolvedAsset(AssetNotFound::new("missing-font"))
        );
    }

    #[test]
    fn test_wrong_kind() {
        let store = AssetStore::standard();
        assert!(matches!(
            store.resolve_image("Helvetica"),
            Err(LayoutError::WrongAssetKind { expected: "image", .. })
        ));
    }

    #[test]
    fn test_duplicate_rejected() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"/>"#;
        let mut builder = AssetStore::builder();
        builder.add_image("logo", svg.to_vec()).unwrap();
        assert!(matches!(
            builder.add_image("logo", svg.to_vec()),
            Err(AssetLoadError::Duplicate(_))
        ));
    }
}
