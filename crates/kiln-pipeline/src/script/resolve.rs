//! Module specifier resolution.
//!
//! Node.js built-ins are rejected up front. Everything else goes through
//! `oxc_resolver`: relative and absolute paths with extension and `index`
//! lookup, bare specifiers from `node_modules` honoring `exports` with
//! browser conditions, then the `browser`, `module` and `main` fields.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use oxc_resolver::ResolveOptions;
use thiserror::Error;

/// Extensions tried, in order, when a specifier names no existing file.
pub const EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "ts", "tsx", "jsx", "mts", "cts", "json"];

const NODE_BUILTINS: &[&str] = &[
    "assert", "buffer", "child_process", "crypto", "events", "fs", "http", "https", "net", "os",
    "path", "process", "stream", "url", "util", "zlib",
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("cannot resolve '{specifier}'")]
    NotFound { specifier: String },

    #[error(
        "'{specifier}' is a Node.js built-in module\n\nHint: browser bundles cannot import Node.js built-ins"
    )]
    Builtin { specifier: String },

    #[error("cannot resolve '{specifier}': {reason}")]
    Failed { specifier: String, reason: String },
}

#[derive(Clone)]
pub struct Resolver {
    inner: Arc<oxc_resolver::Resolver>,
}

impl Default for Resolver {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let resolver = oxc_resolver::Resolver::new(ResolveOptions {
            condition_names: strings(&["browser", "import", "module", "default"]),
            extensions: EXTENSIONS.iter().map(|ext| format!(".{ext}")).collect(),
            // `./util.js` may name a TypeScript source
            extension_alias: vec![(".js".to_string(), strings(&[".js", ".ts", ".tsx"]))],
            main_fields: strings(&["browser", "module", "main"]),
            alias_fields: vec![strings(&["browser"])],
            // Manifest paths have to match what the watcher reports.
            symlinks: false,
            ..ResolveOptions::default()
        });
        Self {
            inner: Arc::new(resolver),
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

impl Resolver {
    pub fn resolve(&self, specifier: &str, importer: &Path) -> Result<PathBuf, ResolveError> {
        if is_builtin(specifier) {
            return Err(ResolveError::Builtin {
                specifier: specifier.to_string(),
            });
        }

        let base = importer.parent().unwrap_or_else(|| Path::new("/"));
        self.inner
            .resolve(base, specifier)
            .map(|resolution| resolution.path().to_path_buf())
            .map_err(|err| match err {
                oxc_resolver::ResolveError::NotFound(_) => ResolveError::NotFound {
                    specifier: specifier.to_string(),
                },
                other => ResolveError::Failed {
                    specifier: specifier.to_string(),
                    reason: other.to_string(),
                },
            })
    }

    /// Forget cached file and `package.json` lookups. Called once per build
    /// so files created since the last build are found.
    pub fn clear_cache(&self) {
        self.inner.clear_cache();
    }
}

fn is_builtin(specifier: &str) -> bool {
    if specifier.starts_with("node:") {
        return true;
    }
    let package = specifier.split('/').next().unwrap_or(specifier);
    NODE_BUILTINS.contains(&package)
}
