//! File-based config discovery for CLI use.
//!
//! Finds a `kiln.json` or `kiln.toml` in a directory, layers `KILN_`-prefixed
//! environment variables over it, and loads the result relative to the
//! directory holding the file.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format as _, Json, Toml},
    Figment,
};

use crate::error::{ConfigError, Result};
use crate::load::ConfigLoader;
use crate::model::KilnConfig;
use crate::raw::RawConfig;

/// Config file names, in lookup order.
pub const CONFIG_FILE_NAMES: &[&str] = &["kiln.json", "kiln.toml"];

/// Environment variable prefix merged over the config file.
pub const ENV_PREFIX: &str = "KILN_";

/// File-based configuration discovery.
///
/// # Example
///
/// ```no_run
/// use kiln_config::ConfigDiscovery;
///
/// let discovery = ConfigDiscovery::new("/path/to/project");
/// let config = discovery.load().unwrap();
/// ```
pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Find a config file in the root directory.
    pub fn find(&self) -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| self.root.join(name))
            .find(|path| path.is_file())
    }

    /// Load the discovered config file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if no config file is found.
    pub fn load(&self) -> Result<KilnConfig> {
        let path = self
            .find()
            .ok_or_else(|| ConfigError::NotFound(self.root.clone()))?;
        load_file(&path)
    }
}

/// Read a config file into its raw form, with environment overrides applied.
pub fn read_raw(path: &Path) -> Result<RawConfig> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let figment = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Figment::new().merge(Toml::file(path)),
        Some("json") => Figment::new().merge(Json::file(path)),
        other => {
            return Err(ConfigError::InvalidValue {
                field: "config file".to_string(),
                hint: Some(format!(
                    "unsupported extension {:?}, use .json or .toml",
                    other.unwrap_or("")
                )),
            });
        }
    };

    // KILN_DEVSERVER__PORT=4000 -> devServer.port
    let figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__").map(|key| {
        key.as_str()
            .replace("devserver", "devServer")
            .replace("publicdir", "publicDir")
            .replace("publicpath", "publicPath")
            .into()
    }));

    figment.extract().map_err(|e| ConfigError::InvalidValue {
        field: path.display().to_string(),
        hint: Some(e.to_string()),
    })
}

/// Load and validate a config file. Relative paths resolve against its directory.
pub fn load_file(path: &Path) -> Result<KilnConfig> {
    let raw = read_raw(path)?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));
    let base_dir = if base_dir.is_absolute() {
        base_dir
    } else {
        std::env::current_dir()?.join(base_dir)
    };

    tracing::debug!(config = %path.display(), "loading config file");
    ConfigLoader::new(base_dir).load(&raw)
}
