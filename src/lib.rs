//! Report renderer
//!
//! Turns structured report descriptions into paginated PDF documents.
//! The pipeline is request → [`ReportModel`] → [`layout`] → [`render`] →
//! [`RenderedDocument`], driven by the [`ReportService`] on a bounded worker
//! pool. Fonts, images and themes are loaded once at startup and shared
//! read-only by every request.

pub mod assets;
pub mod config;
pub mod error;
pub mod layout;
pub mod model;
pub mod render;
pub mod request;
pub mod service;
pub mod theme;
pub mod types;
pub mod winansi;

pub use assets::{AssetHandle, AssetSources, AssetStore, FontHandle, ImageHandle};
pub use config::ServiceConfig;
pub use error::{
    AssetLoadError, AssetNotFound, ConfigError, LayoutError, RenderError, ReportError,
    ReportResult, StartupError, ValidationError,
};
pub use layout::{layout, LayoutEngine, PageSetup, PageTree, PlacedPrimitive};
pub use model::{Block, ReportModel, Section};
pub use render::{render, RenderOptions, RenderedDocument};
pub use request::ReportRequest;
pub use service::{ErrorResponse, PendingReport, RenderContext, ReportService, RequestStage};
pub use theme::{Theme, ThemeSet};
pub use types::{Alignment, Color, Margins, PageSize};
