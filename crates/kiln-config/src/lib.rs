//! # kiln-config
//!
//! Declarative configuration for Kiln: one or more compilation pipelines plus
//! an optional development server.
//!
//! Raw declarations ([`RawConfig`]) are validated by [`ConfigLoader`] into an
//! immutable [`KilnConfig`], split into a compile-time [`BuildSpec`] and a
//! runtime [`DevServerSpec`]. All paths in the validated model are absolute.
//!
//! ```
//! use kiln_config::{load, RawConfig};
//! use serde_json::json;
//!
//! let raw = RawConfig::from_value(json!({
//!     "css": [{ "input": "src/styles.css", "output": "public/styles.css" }]
//! })).unwrap();
//!
//! let config = load(&raw, "/project").unwrap();
//! assert_eq!(config.build.pipelines[0].output.to_str(), Some("/project/public/styles.css"));
//! ```

pub mod discovery;
pub mod error;
pub mod load;
pub mod model;
pub mod raw;

pub use discovery::{load_file, read_raw, ConfigDiscovery};
pub use error::{ConfigError, Result};
pub use load::{load, normalize_public_path, ConfigLoader, HMR_PIPELINE_ID};
pub use model::*;
pub use raw::*;
