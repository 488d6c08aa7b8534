//! What a pipeline run produces.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use kiln_config::PipelineId;
use kiln_graph::{ModuleId, ModuleSnapshot};

use crate::error::SourceLocation;

/// One file written by a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }

    /// Media type derived from the file extension.
    pub fn content_type(&self) -> &'static str {
        content_type_for(&self.path)
    }
}

/// Media type for a path, by extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("js" | "mjs" | "cjs") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("map" | "json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Non-fatal message produced during a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

/// Per-module view of a script bundle, kept for hot module replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleModules {
    pub snapshot: ModuleSnapshot,
    /// Factory body of every module, as emitted into the bundle
    pub code: BTreeMap<ModuleId, String>,
}

/// Result of a successful pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub pipeline_id: PipelineId,
    /// Every file written, primary output first
    pub artifacts: Vec<Artifact>,
    /// Every source file read while building
    pub dependency_manifest: BTreeSet<PathBuf>,
    pub diagnostics: Vec<Diagnostic>,
    /// Present for script bundles only
    pub modules: Option<BundleModules>,
}

impl BuildOutput {
    pub fn new(pipeline_id: PipelineId) -> Self {
        Self {
            pipeline_id,
            artifacts: Vec::new(),
            dependency_manifest: BTreeSet::new(),
            diagnostics: Vec::new(),
            modules: None,
        }
    }

    pub fn artifact_paths(&self) -> Vec<PathBuf> {
        self.artifacts.iter().map(|a| a.path.clone()).collect()
    }

    pub fn artifact(&self, path: &Path) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.path == path)
    }

    /// Total bytes across all artifacts.
    pub fn total_size(&self) -> usize {
        self.artifacts.iter().map(|a| a.contents.len()).sum()
    }
}
