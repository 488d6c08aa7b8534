//! Error types for configuration loading and validation.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

/// Fatal configuration errors. A process must not start with one of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field: {field}\n\nHint: add '{field}' to your kiln config")]
    MissingField { field: String },

    #[error("path for '{field}' is not absolute-resolvable: {path:?}\n\nHint: {hint}")]
    InvalidPath {
        field: String,
        path: PathBuf,
        hint: String,
    },

    #[error("port {port} is out of range\n\nHint: use a port between 1 and 65535")]
    InvalidPort { port: i64 },

    #[error("route '{uri}' points to a file that does not exist: {}", .path.display())]
    RouteFileNotFound { uri: String, path: PathBuf },

    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidRoutePattern { pattern: String, reason: String },

    #[error(
        "hot module replacement is enabled but no entry bundle is designated\n\nHint: set 'devServer.hotModuleBuild' or disable 'useHotModuleReplacement'"
    )]
    HmrEntryMissing,

    #[error("invalid config value for '{field}'{}", hint.as_ref().map(|h| format!(": {h}")).unwrap_or_default())]
    InvalidValue { field: String, hint: Option<String> },

    #[error("config not found in {}\n\nHint: create a kiln.json or kiln.toml file", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}
