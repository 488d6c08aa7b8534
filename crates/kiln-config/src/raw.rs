//! Raw configuration schema, as written by users.
//!
//! These types mirror the declarative config file one-to-one. Nothing here is
//! validated: required fields are `Option` so the loader can report exactly
//! which one is missing, and paths may still be relative.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level declarative configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    /// `development` or `production`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    /// Upper bound on pipelines building at the same time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Script bundle pipelines
    #[serde(default)]
    pub js: Vec<RawScriptPipeline>,

    /// Standalone stylesheet pipelines
    #[serde(default)]
    pub css: Vec<RawStylePipeline>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_server: Option<RawDevServer>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawScriptPipeline {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    #[serde(default)]
    pub sourcemap: bool,

    /// HTML documents generated next to the bundle
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub html: Vec<RawHtmlTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawHtmlTarget {
    /// Resolved relative to the directory of the pipeline output
    pub filename: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStylePipeline {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    #[serde(default)]
    pub sourcemap: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDevServer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Kept wide so out-of-range values surface as `InvalidPort`, not a parse error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_path: Option<String>,

    #[serde(default)]
    pub routes: Vec<RawRoute>,

    #[serde(default)]
    pub use_hot_module_replacement: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hot_module_build: Option<RawScriptPipeline>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch: Option<RawWatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRoute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore: Option<Vec<String>>,
}

impl RawConfig {
    /// Parse from a `serde_json::Value`. Unknown fields are ignored.
    pub fn from_value(value: serde_json::Value) -> crate::Result<Self> {
        serde_json::from_value(value).map_err(|e| crate::ConfigError::InvalidValue {
            field: "config".to_string(),
            hint: Some(e.to_string()),
        })
    }

    pub fn to_value(&self) -> crate::Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| crate::ConfigError::InvalidValue {
            field: "config".to_string(),
            hint: Some(e.to_string()),
        })
    }
}
