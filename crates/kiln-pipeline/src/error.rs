//! Pipeline-scoped compile errors.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use kiln_config::PipelineId;
use thiserror::Error;

pub type Result<T, E = CompileError> = std::result::Result<T, E>;

/// Position in a source file. `line` and `column` are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// Location of byte `offset` in `source`.
    pub fn from_offset(file: impl Into<PathBuf>, source: &str, offset: u32) -> Self {
        let (line, column) = line_column(source, offset as usize);
        Self::new(file, line, column)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

/// A pipeline failed to build.
///
/// Recoverable: the previous output of the pipeline stays in place and
/// other pipelines are unaffected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "[{pipeline_id}] {message}{}",
    location.as_ref().map(|l| format!("\n  --> {l}")).unwrap_or_default()
)]
pub struct CompileError {
    pub pipeline_id: PipelineId,
    pub message: String,
    pub location: Option<SourceLocation>,
    /// Files the build had reached before failing, the failing one
    /// included. Watching these lets an edit that fixes the error
    /// trigger the next build.
    pub partial_manifest: BTreeSet<PathBuf>,
}

impl CompileError {
    pub fn new(pipeline_id: &PipelineId, message: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.clone(),
            message: message.into(),
            location: None,
            partial_manifest: BTreeSet::new(),
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_manifest(mut self, files: impl IntoIterator<Item = PathBuf>) -> Self {
        self.partial_manifest.extend(files);
        self
    }

    pub(crate) fn read(pipeline_id: &PipelineId, path: &Path, err: std::io::Error) -> Self {
        Self::new(
            pipeline_id,
            format!("failed to read '{}': {err}", path.display()),
        )
    }

    pub(crate) fn write(pipeline_id: &PipelineId, message: impl Into<String>) -> Self {
        Self::new(pipeline_id, message)
    }
}

/// 1-based line and column of a byte offset. Columns count characters.
pub(crate) fn line_column(source: &str, offset: usize) -> (u32, u32) {
    let mut offset = offset.min(source.len());
    while !source.is_char_boundary(offset) {
        offset -= 1;
    }
    let before = &source[..offset];
    let line = before.matches('\n').count() as u32 + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = before[line_start..].chars().count() as u32 + 1;
    (line, column)
}
