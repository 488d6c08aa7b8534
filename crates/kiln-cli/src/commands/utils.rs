//! Shared helpers for command implementations.

use std::path::{Path, PathBuf};

use kiln_config::{load_file, ConfigDiscovery, ConfigError, KilnConfig};

use crate::cli::ConfigArgs;
use crate::error::{Result, ResultExt};

/// A configuration together with where it was found.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub path: PathBuf,
    /// Directory of the config file; relative paths resolved against it
    pub root: PathBuf,
    pub config: KilnConfig,
}

/// Resolve a path relative to a working directory.
pub fn resolve_path(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

pub fn get_cwd() -> Result<PathBuf> {
    std::env::current_dir().context("failed to read the current directory")
}

/// Load `--config`, or discover a config file in `--cwd` or the current
/// directory.
pub fn load_config(args: &ConfigArgs) -> Result<LoadedConfig> {
    let cwd = get_cwd()?;

    let path = match &args.config {
        Some(path) => {
            let path = resolve_path(path, &cwd);
            std::fs::metadata(&path).with_path(&path)?;
            path
        }
        None => {
            let dir = args
                .cwd
                .as_deref()
                .map(|dir| resolve_path(dir, &cwd))
                .unwrap_or(cwd);
            ConfigDiscovery::new(&dir)
                .find()
                .ok_or(ConfigError::NotFound(dir))?
        }
    };

    let config = load_file(&path)?;
    let root = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));

    Ok(LoadedConfig { path, root, config })
}

/// Path shown to users: relative to `root` when possible.
pub fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}
