//! Validated, immutable configuration model.
//!
//! Compile-time settings ([`BuildSpec`]) and runtime server settings
//! ([`DevServerSpec`]) are separate models. They are only joined when an
//! orchestrator is constructed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Stable identifier of a pipeline (`js:0`, `css:1`, `hmr`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(String);

impl PipelineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PipelineId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    Script,
    Stylesheet,
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineKind::Script => f.write_str("script"),
            PipelineKind::Stylesheet => f.write_str("stylesheet"),
        }
    }
}

/// Build environment. Production minifies stylesheets and leaves the hot
/// reload hooks out of script bundles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "development" => Ok(Environment::Development),
            "production" => Ok(Environment::Production),
            other => Err(ConfigError::InvalidValue {
                field: "environment".to_string(),
                hint: Some(format!(
                    "'{other}' is not supported, use 'development' or 'production'"
                )),
            }),
        }
    }
}

/// One declared compilation unit.
///
/// `input` and `output` are absolute and normalized; HTML targets are absolute
/// as well, already resolved against the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSpec {
    pub id: PipelineId,
    pub kind: PipelineKind,
    pub input: PathBuf,
    pub output: PathBuf,
    pub source_map: bool,
    pub html_targets: Vec<PathBuf>,
}

impl PipelineSpec {
    /// Path of the source map written next to the output.
    pub fn source_map_path(&self) -> PathBuf {
        let mut name = self.output.as_os_str().to_os_string();
        name.push(".map");
        PathBuf::from(name)
    }

    /// File name of the output artifact, as referenced from HTML.
    pub fn output_file_name(&self) -> String {
        self.output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Every path this pipeline writes on success.
    pub fn artifact_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.output.clone()];
        if self.source_map {
            paths.push(self.source_map_path());
        }
        paths.extend(self.html_targets.iter().cloned());
        paths
    }
}

/// Compile-time half of the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    pub environment: Environment,
    pub workers: usize,
    pub pipelines: Vec<PipelineSpec>,
}

/// A single segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternSegment {
    Literal(String),
    /// Matches one or more path segments
    Wildcard,
}

/// Parsed route pattern, such as `/app/*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriPattern {
    raw: String,
    segments: Vec<PatternSegment>,
}

impl UriPattern {
    pub fn parse(raw: &str) -> Result<Self> {
        if !raw.starts_with('/') {
            return Err(ConfigError::InvalidRoutePattern {
                pattern: raw.to_string(),
                reason: "patterns must start with '/'".to_string(),
            });
        }

        let mut segments = Vec::new();
        for part in split_segments(raw) {
            if part == "*" {
                segments.push(PatternSegment::Wildcard);
            } else if part.contains('*') {
                return Err(ConfigError::InvalidRoutePattern {
                    pattern: raw.to_string(),
                    reason: format!("'{part}' mixes text and '*'; a wildcard must be a whole segment"),
                });
            } else {
                segments.push(PatternSegment::Literal(part.to_string()));
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[PatternSegment] {
        &self.segments
    }

    pub fn has_wildcard(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, PatternSegment::Wildcard))
    }

    /// Match already-split request path segments against this pattern.
    pub fn matches(&self, path: &[&str]) -> bool {
        match_segments(&self.segments, path)
    }
}

fn match_segments(pattern: &[PatternSegment], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((PatternSegment::Literal(lit), rest)) => match path.split_first() {
            Some((head, tail)) if head == lit => match_segments(rest, tail),
            _ => false,
        },
        Some((PatternSegment::Wildcard, rest)) => {
            // one or more segments, shortest first
            (1..=path.len()).any(|taken| match_segments(rest, &path[taken..]))
        }
    }
}

/// Split a URI path into its non-empty segments.
pub fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// A declared route. Each route serves exactly one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteSpec {
    /// Exact URI match
    StaticFile { uri: UriPattern, file: PathBuf },
    /// SPA-style fallback: any URI matching the pattern serves `file`
    WildcardFallback { pattern: UriPattern, file: PathBuf },
}

impl RouteSpec {
    pub fn new(uri: &str, file: PathBuf) -> Result<Self> {
        let pattern = UriPattern::parse(uri)?;
        if pattern.has_wildcard() {
            Ok(RouteSpec::WildcardFallback { pattern, file })
        } else {
            Ok(RouteSpec::StaticFile { uri: pattern, file })
        }
    }

    pub fn pattern(&self) -> &UriPattern {
        match self {
            RouteSpec::StaticFile { uri, .. } => uri,
            RouteSpec::WildcardFallback { pattern, .. } => pattern,
        }
    }

    pub fn file(&self) -> &Path {
        match self {
            RouteSpec::StaticFile { file, .. } | RouteSpec::WildcardFallback { file, .. } => file,
        }
    }
}

/// Hot module replacement wiring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HmrSpec {
    pub enabled: bool,
    /// The single hot-reloadable entry bundle
    pub entry: Option<PipelineSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSpec {
    pub debounce_ms: u64,
    pub ignore: Vec<String>,
}

impl Default for WatchSpec {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            ignore: vec![
                "node_modules".to_string(),
                ".git".to_string(),
                "*.log".to_string(),
                "*.tmp".to_string(),
            ],
        }
    }
}

/// Runtime half of the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevServerSpec {
    pub hostname: String,
    pub port: u16,
    pub public_dir: PathBuf,
    /// Always starts and ends with `/`
    pub public_path: String,
    pub routes: Vec<RouteSpec>,
    pub hmr: HmrSpec,
    pub watch: WatchSpec,
}

impl DevServerSpec {
    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.hostname, self.port)
    }
}

/// Fully validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KilnConfig {
    pub build: BuildSpec,
    /// Absent when the config declares no dev server (build-only use)
    pub dev_server: Option<DevServerSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(path: &str) -> Vec<&str> {
        split_segments(path).collect()
    }

    #[test]
    fn literal_pattern_matches_exactly() {
        let pattern = UriPattern::parse("/about").unwrap();
        assert!(pattern.matches(&segs("/about")));
        assert!(pattern.matches(&segs("/about/")));
        assert!(!pattern.matches(&segs("/about/team")));
        assert!(!pattern.matches(&segs("/")));
    }

    #[test]
    fn root_pattern_matches_only_root() {
        let pattern = UriPattern::parse("/").unwrap();
        assert!(pattern.matches(&segs("/")));
        assert!(!pattern.matches(&segs("/missing")));
    }

    #[test]
    fn wildcard_needs_at_least_one_segment() {
        let pattern = UriPattern::parse("/app/*").unwrap();
        assert!(pattern.matches(&segs("/app/dashboard")));
        assert!(pattern.matches(&segs("/app/users/42/edit")));
        assert!(!pattern.matches(&segs("/app")));
        assert!(!pattern.matches(&segs("/other/dashboard")));
    }

    #[test]
    fn wildcard_in_the_middle_backtracks() {
        let pattern = UriPattern::parse("/docs/*/index").unwrap();
        assert!(pattern.matches(&segs("/docs/a/index")));
        assert!(pattern.matches(&segs("/docs/a/b/index")));
        assert!(!pattern.matches(&segs("/docs/index")));
    }

    #[test]
    fn rejects_partial_wildcards() {
        assert!(matches!(
            UriPattern::parse("/files/*.html"),
            Err(ConfigError::InvalidRoutePattern { .. })
        ));
        assert!(UriPattern::parse("relative").is_err());
    }

    #[test]
    fn route_variant_is_decided_by_pattern() {
        let route = RouteSpec::new("/", PathBuf::from("/srv/index.html")).unwrap();
        assert!(matches!(route, RouteSpec::StaticFile { .. }));

        let route = RouteSpec::new("/*", PathBuf::from("/srv/index.html")).unwrap();
        assert!(matches!(route, RouteSpec::WildcardFallback { .. }));
    }

    #[test]
    fn source_map_path_appends_extension() {
        let spec = PipelineSpec {
            id: PipelineId::new("js:0"),
            kind: PipelineKind::Script,
            input: PathBuf::from("/p/src/app.js"),
            output: PathBuf::from("/p/public/app.js"),
            source_map: true,
            html_targets: vec![PathBuf::from("/p/index.html")],
        };
        assert_eq!(spec.source_map_path(), PathBuf::from("/p/public/app.js.map"));
        assert_eq!(spec.output_file_name(), "app.js");
        assert_eq!(spec.artifact_paths().len(), 3);
    }
}
