//! Miette diagnostic conversion for CLI errors.

use ::miette::{miette, Report};
use kiln_pipeline::CompileError;

use crate::error::CliError;

/// Convert a `CliError` into a report for the terminal.
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Compile(e) => compile_error_to_miette(&e),
        CliError::Config(e) => miette!("Configuration error: {}", e),
        other => miette!("{}", other),
    }
}

/// Compile errors carry their own location line.
pub fn compile_error_to_miette(err: &CompileError) -> Report {
    match &err.location {
        Some(location) => miette!(
            "Pipeline '{}' failed: {}\n  --> {}",
            err.pipeline_id,
            err.message,
            location
        ),
        None => miette!("Pipeline '{}' failed: {}", err.pipeline_id, err.message),
    }
}
