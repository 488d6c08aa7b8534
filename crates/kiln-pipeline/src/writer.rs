//! Atomic artifact writing.
//!
//! Every artifact of a run is first written to a temporary sibling file and
//! only renamed into place once all of them were written. A failed run
//! therefore never leaves a half-written output behind, and a reader such as
//! the dev server sees either the old file or the new one.
//!
//! Artifacts whose bytes are unchanged on disk are left untouched so their
//! modification times stay stable between identical builds.

use std::fs;
use std::path::{Component, Path, PathBuf};

use kiln_config::PipelineId;
use tracing::{debug, warn};

use crate::error::{CompileError, Result};
use crate::output::Artifact;

/// Write `artifacts` with all-or-nothing semantics.
pub fn write_artifacts(pipeline_id: &PipelineId, artifacts: &[Artifact]) -> Result<()> {
    let mut operations = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        validate_output_path(pipeline_id, &artifact.path)?;

        if fs::read(&artifact.path).is_ok_and(|existing| existing == artifact.contents) {
            debug!(path = %artifact.path.display(), "artifact unchanged, skipping write");
            continue;
        }
        operations.push((artifact.path.as_path(), artifact.contents.as_slice()));
    }

    write_files_atomic(pipeline_id, &operations)
}

/// Output paths come from validated config and must be absolute and
/// already normalized.
fn validate_output_path(pipeline_id: &PipelineId, path: &Path) -> Result<()> {
    if path.as_os_str().to_string_lossy().contains('\0') {
        return Err(CompileError::write(
            pipeline_id,
            format!("output path contains a null byte: {path:?}"),
        ));
    }
    if !path.is_absolute() {
        return Err(CompileError::write(
            pipeline_id,
            format!("output path is not absolute: '{}'", path.display()),
        ));
    }
    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
    {
        return Err(CompileError::write(
            pipeline_id,
            format!("output path is not normalized: '{}'", path.display()),
        ));
    }
    if path.file_name().is_none() {
        return Err(CompileError::write(
            pipeline_id,
            format!("output path has no file name: '{}'", path.display()),
        ));
    }
    Ok(())
}

fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.kiln-tmp"))
}

/// Two-phase write: temp files first, then renames.
fn write_files_atomic(pipeline_id: &PipelineId, operations: &[(&Path, &[u8])]) -> Result<()> {
    let mut temp_files: Vec<(PathBuf, &Path)> = Vec::with_capacity(operations.len());

    for (target, contents) in operations {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                cleanup_temp_files(&temp_files);
                CompileError::write(
                    pipeline_id,
                    format!("failed to create directory '{}': {e}", parent.display()),
                )
            })?;
        }

        let temp = temp_path_for(target);
        fs::write(&temp, contents).map_err(|e| {
            cleanup_temp_files(&temp_files);
            CompileError::write(
                pipeline_id,
                format!("failed to write temporary file '{}': {e}", temp.display()),
            )
        })?;
        temp_files.push((temp, *target));
    }

    for (temp, target) in &temp_files {
        fs::rename(temp, target).map_err(|e| {
            cleanup_temp_files(&temp_files);
            CompileError::write(
                pipeline_id,
                format!(
                    "failed to rename '{}' to '{}': {e}",
                    temp.display(),
                    target.display()
                ),
            )
        })?;
    }

    Ok(())
}

fn cleanup_temp_files(temp_files: &[(PathBuf, &Path)]) {
    for (temp, _) in temp_files {
        if temp.exists() {
            if let Err(e) = fs::remove_file(temp) {
                warn!(path = %temp.display(), error = %e, "failed to remove temporary file");
            }
        }
    }
}
