//! Pipeline → source file tracking used for invalidation.
//!
//! A forward map (pipeline → files) and an inverted index (file → pipelines)
//! are kept in lockstep. A pipeline's file set is only ever replaced
//! wholesale, so imports removed from the source stop triggering rebuilds.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use kiln_config::PipelineId;
use path_clean::PathClean;
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

/// Per-pipeline dependency sets with an inverted index.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    forward: HashMap<PipelineId, HashSet<PathBuf>>,
    inverse: HashMap<PathBuf, HashSet<PipelineId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the dependency set of `pipeline`.
    ///
    /// Stale entries from the previous set are removed from the inverted
    /// index before the new set is inserted.
    pub fn update<I, P>(&mut self, pipeline: &PipelineId, files: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.unlink(pipeline);

        let files: HashSet<PathBuf> = files.into_iter().map(|p| p.as_ref().clean()).collect();
        for file in &files {
            self.inverse
                .entry(file.clone())
                .or_default()
                .insert(pipeline.clone());
        }
        self.forward.insert(pipeline.clone(), files);
    }

    /// Forget everything about `pipeline`.
    pub fn remove(&mut self, pipeline: &PipelineId) {
        self.unlink(pipeline);
        self.forward.remove(pipeline);
    }

    fn unlink(&mut self, pipeline: &PipelineId) {
        let Some(previous) = self.forward.get(pipeline) else {
            return;
        };

        for file in previous {
            if let Some(owners) = self.inverse.get_mut(file) {
                owners.remove(pipeline);
                if owners.is_empty() {
                    self.inverse.remove(file);
                }
            }
        }
    }

    /// Every pipeline whose current dependency set contains `changed`.
    ///
    /// Returned in sorted order so callers schedule deterministically.
    pub fn affected_pipelines(&self, changed: impl AsRef<Path>) -> BTreeSet<PipelineId> {
        let changed = changed.as_ref().clean();
        self.inverse
            .get(&changed)
            .map(|owners| owners.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn dependencies(&self, pipeline: &PipelineId) -> Option<&HashSet<PathBuf>> {
        self.forward.get(pipeline)
    }

    pub fn contains_file(&self, file: impl AsRef<Path>) -> bool {
        self.inverse.contains_key(&file.as_ref().clean())
    }

    pub fn pipeline_count(&self) -> usize {
        self.forward.len()
    }

    /// Number of distinct files tracked across all pipelines.
    pub fn file_count(&self) -> usize {
        self.inverse.len()
    }

    /// Sorted list of every tracked file, e.g. to derive watch roots.
    pub fn files(&self) -> BTreeSet<PathBuf> {
        self.inverse.keys().cloned().collect()
    }
}
