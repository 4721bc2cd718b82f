//! Error types for the report pipeline
//!
//! Each stage fails with its own typed error. Only the report service turns
//! these into user-facing responses (see `service::ErrorResponse`).

use std::path::PathBuf;
use thiserror::Error;

/// A name was looked up in the asset store (or a request's attachments) and
/// nothing was registered under it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("asset not found: {name}")]
pub struct AssetNotFound {
    pub name: String,
}

impl AssetNotFound {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Startup-time failure while loading fonts and images.
#[derive(Error, Debug)]
pub enum AssetLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid font file {path}: {reason}")]
    InvalidFont { path: PathBuf, reason: String },

    #[error("invalid image file {path}: {reason}")]
    InvalidImage { path: PathBuf, reason: String },

    #[error("duplicate asset name '{0}'")]
    Duplicate(String),

    #[error("required asset '{0}' was not loaded")]
    MissingRequired(String),
}

/// Content that cannot be laid out under the configured policy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("unresolved asset reference: {0}")]
    UnresolvedAsset(#[from] AssetNotFound),

    #[error("asset '{name}' is not a {expected}")]
    WrongAssetKind { name: String, expected: &'static str },

    #[error("unknown theme '{0}'")]
    UnknownTheme(String),

    #[error("unknown style '{0}'")]
    UnknownStyle(String),

    #[error("font '{name}' cannot be used: {reason}")]
    UnusableFont { name: String, reason: String },

    #[error("content needs more than {limit} pages")]
    PageLimitExceeded { limit: usize },

    #[error("table declares no columns")]
    EmptyTable,

    #[error("table row {row} has {found} cells, expected {expected}")]
    RaggedTable {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("page leaves no room for content")]
    NoContentArea,

    #[error("footer is {height:.1}pt tall and leaves no room for content")]
    FooterTooTall { height: f64 },
}

/// Failure while drawing an already laid out page tree.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to embed font '{name}': {reason}")]
    Font { name: String, reason: String },

    #[error("failed to embed image '{name}': {reason}")]
    Image { name: String, reason: String },

    #[error("failed to encode {what}: {reason}")]
    Encoding { what: &'static str, reason: String },
}

/// Malformed or incomplete report payload.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("malformed report payload: {0}")]
    Malformed(String),

    #[error("report payload is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        ValidationError::Malformed(err.to_string())
    }
}

/// Invalid service configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid value for '{key}': {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Anything that prevents the service from starting.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Assets(#[from] AssetLoadError),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),
}

/// Pipeline-level error for one report request.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("service is at capacity ({in_flight} reports in flight)")]
    Busy { in_flight: usize },

    #[error("request was cancelled")]
    Cancelled,

    #[error("worker stopped before producing a result")]
    WorkerLost,
}

/// Result type alias for pipeline operations
pub type ReportResult<T> = Result<T, ReportError>;
