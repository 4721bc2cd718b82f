//! Service configuration
//!
//! Loaded from an optional JSON file, then overridden by `REPORT_*`
//! environment variables. The binary applies command-line flags last.

use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::assets::AssetSources;
use crate::error::ConfigError;
use crate::layout::PageSetup;
use crate::types::{Margins, PageSize};

pub const ENV_FONTS_DIR: &str = "REPORT_FONTS_DIR";
pub const ENV_LOGO: &str = "REPORT_LOGO";
pub const ENV_PAGE_SIZE: &str = "REPORT_PAGE_SIZE";
pub const ENV_MAX_PAGES: &str = "REPORT_MAX_PAGES";
pub const ENV_WORKERS: &str = "REPORT_WORKERS";
pub const ENV_DEBUG_DIR: &str = "REPORT_DEBUG_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Directory scanned for `.ttf`/`.otf` fonts
    pub fonts_dir: Option<PathBuf>,
    /// Image registered as `logo`
    pub logo: Option<PathBuf>,
    /// Extra images, registered under their file stem
    pub images: Vec<PathBuf>,
    /// Asset names whose absence aborts startup
    pub required_assets: Vec<String>,
    pub page_size: PageSize,
    pub margins: Margins,
    pub max_pages: usize,
    pub max_payload_bytes: usize,
    /// Worker threads; 0 uses one per CPU
    pub workers: usize,
    /// Reports accepted at once (queued or running)
    pub queue_depth: usize,
    /// JSON file with additional themes
    pub theme_file: Option<PathBuf>,
    /// Directory the laid out page tree of every request is written to
    pub debug_dump_dir: Option<PathBuf>,
    pub compress: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            fonts_dir: None,
            logo: None,
            images: Vec::new(),
            required_assets: Vec::new(),
            page_size: PageSize::A4,
            margins: Margins::default(),
            max_pages: 200,
            max_payload_bytes: 10 * 1024 * 1024,
            workers: 0,
            queue_depth: 64,
            theme_file: None,
            debug_dump_dir: None,
            compress: true,
        }
    }
}

impl ServiceConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any variable source
    pub fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let var = |key: &str| var(key).filter(|value| !value.trim().is_empty());

        if let Some(dir) = var(ENV_FONTS_DIR) {
            self.fonts_dir = Some(PathBuf::from(dir));
        }
        if let Some(logo) = var(ENV_LOGO) {
            self.logo = Some(PathBuf::from(logo));
        }
        if let Some(size) = var(ENV_PAGE_SIZE) {
            self.page_size = size
                .parse()
                .map_err(|reason: String| ConfigError::invalid(ENV_PAGE_SIZE, reason))?;
        }
        if let Some(max_pages) = var(ENV_MAX_PAGES) {
            self.max_pages = parse_number(ENV_MAX_PAGES, &max_pages)?;
        }
        if let Some(workers) = var(ENV_WORKERS) {
            self.workers = parse_number(ENV_WORKERS, &workers)?;
        }
        if let Some(dir) = var(ENV_DEBUG_DIR) {
            self.debug_dump_dir = Some(PathBuf::from(dir));
        }
        debug!("Configuration after environment overrides: {:?}", self);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let page = self.page_size.size();
        if !(page.width > 0.0 && page.height > 0.0) {
            return Err(ConfigError::invalid("page_size", "must be positive"));
        }
        let m = self.margins;
        if [m.top, m.bottom, m.left, m.right]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(ConfigError::invalid("margins", "must be non-negative"));
        }
        if self.page_setup().content_area().is_err() {
            return Err(ConfigError::invalid(
                "margins",
                format!("leave no content area on a {} page", self.page_size),
            ));
        }
        if self.max_pages == 0 {
            return Err(ConfigError::invalid("max_pages", "must be at least 1"));
        }
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::invalid("max_payload_bytes", "must be at least 1"));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::invalid("queue_depth", "must be at least 1"));
        }
        Ok(())
    }

    pub fn asset_sources(&self) -> AssetSources {
        AssetSources {
            fonts_dir: self.fonts_dir.clone(),
            logo: self.logo.clone(),
            images: self.images.clone(),
            required: self.required_assets.clone(),
        }
    }

    pub fn page_setup(&self) -> PageSetup {
        PageSetup::new(self.page_size)
            .with_margins(self.margins)
            .with_max_pages(self.max_pages)
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, format!("'{}' is not a number", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.page_setup(), PageSetup::default());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"page_size": "Letter", "max_pages": 5}"#).unwrap();
        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.page_size, PageSize::Letter);
        assert_eq!(config.max_pages, 5);
        assert_eq!(config.queue_depth, 64);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"pagesize": "Letter"}"#).unwrap();
        assert!(matches!(
            ServiceConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_PAGE_SIZE, "500x700"),
            (ENV_MAX_PAGES, "12"),
            (ENV_FONTS_DIR, "/opt/fonts"),
            (ENV_WORKERS, " "),
        ]
        .into_iter()
        .collect();
        let mut config = ServiceConfig::default();
        config
            .apply_vars(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.page_size.to_string(), "500x700");
        assert_eq!(config.max_pages, 12);
        assert_eq!(config.fonts_dir, Some(PathBuf::from("/opt/fonts")));
        assert_eq!(config.workers, 0);

        let err = config
            .apply_vars(|key| (key == ENV_MAX_PAGES).then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == ENV_MAX_PAGES));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ServiceConfig {
            max_pages: 0,
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ServiceConfig {
            margins: Margins::uniform(400.0),
            ..ServiceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { ref key, .. }) if key == "margins"
        ));
    }
}
