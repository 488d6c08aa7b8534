//! Error types for the kiln binary.
//!
//! `CliError` is what commands return. It wraps the library errors
//! (`ConfigError`, `CompileError`) and the dev-loop errors defined here:
//! [`WatchError`] is transient (the watcher restarts and every pipeline is
//! rebuilt) and [`ChannelError`] is scoped to one HMR session.

mod miette;

use std::path::PathBuf;

use kiln_config::ConfigError;
use kiln_pipeline::CompileError;
use thiserror::Error;

pub use self::miette::cli_error_to_miette;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be found, parsed or validated
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A pipeline failed to compile
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// `kiln build` finished with failing pipelines
    #[error("{failed} of {total} pipelines failed\n\nHint: Fix the errors above and run the build again")]
    BuildFailed { failed: usize, total: usize },

    /// `kiln dev` was pointed at a config without a dev server
    #[error("Configuration has no devServer section\n\nHint: Add a devServer block with hostname, port and publicDir")]
    NoDevServer,

    /// The HTTP server failed to start or stopped unexpectedly
    #[error("Server error: {0}")]
    Server(String),

    #[error("File watcher error: {0}")]
    Watch(#[from] WatchError),

    #[error("HMR channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Custom(String),
}

/// File watcher failures. Never fatal in `kiln dev`.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to watch {}: {source}\n\nHint: Check that the directory exists and is readable", .path.display())]
    Init {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("watch event stream failed: {0}")]
    Stream(#[from] notify::Error),
}

/// Failures of a single HMR session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("malformed client message: {0}")]
    Malformed(String),

    #[error("session {0} is closed")]
    SessionClosed(u64),

    #[error("client acknowledged revision {revision} but the latest is {latest}")]
    UnknownRevision { revision: u64, latest: u64 },
}

/// Result type alias using `CliError` as the default error type.
pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Attach context to errors on their way up to the command.
pub trait ResultExt<T> {
    /// Map `NotFound` I/O errors to [`CliError::FileNotFound`].
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T>;

    /// Prefix the error with `msg`.
    fn context(self, msg: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<CliError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T> {
        self.map_err(|e| match e.into() {
            CliError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                CliError::FileNotFound(path.as_ref().to_path_buf())
            }
            other => other,
        })
    }

    fn context(self, msg: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{msg}: {err}"))
        })
    }
}
