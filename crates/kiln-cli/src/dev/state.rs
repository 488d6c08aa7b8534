//! In-memory copy of the latest successful artifacts.
//!
//! The dev server answers from here first so a request never observes a
//! half-written file. Entries are replaced per pipeline, only on success.

use std::path::{Path, PathBuf};

use axum::body::Bytes;
use kiln_config::PipelineId;
use kiln_pipeline::BuildOutput;
use rustc_hash::FxHashMap as HashMap;

/// One cached artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub contents: Bytes,
    pub content_type: &'static str,
}

/// Artifacts keyed by absolute output path.
#[derive(Debug, Default)]
pub struct OutputCache {
    files: HashMap<PathBuf, CachedFile>,
    owners: HashMap<PipelineId, Vec<PathBuf>>,
}

impl OutputCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything `output.pipeline_id` previously contributed.
    pub fn replace(&mut self, output: &BuildOutput) {
        if let Some(previous) = self.owners.remove(&output.pipeline_id) {
            for path in previous {
                self.files.remove(&path);
            }
        }

        let mut paths = Vec::with_capacity(output.artifacts.len());
        for artifact in &output.artifacts {
            self.files.insert(
                artifact.path.clone(),
                CachedFile {
                    contents: Bytes::from(artifact.contents.clone()),
                    content_type: artifact.content_type(),
                },
            );
            paths.push(artifact.path.clone());
        }
        self.owners.insert(output.pipeline_id.clone(), paths);
    }

    pub fn get(&self, path: &Path) -> Option<CachedFile> {
        self.files.get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
