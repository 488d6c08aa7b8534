//! Request path resolution.
//!
//! Pure: maps a request path to a file without touching the filesystem.
//! Whether that file exists is the server's concern.

use std::path::PathBuf;

use kiln_config::{split_segments, DevServerSpec, RouteSpec};

/// Where a request path points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Under `publicPath`: the request path joined onto `publicDir`
    Asset(PathBuf),
    /// Matched a declared route
    Route(PathBuf),
    NotFound,
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    public_dir: PathBuf,
    public_path: String,
    routes: Vec<RouteSpec>,
}

impl RouteTable {
    pub fn new(public_dir: PathBuf, public_path: impl Into<String>, routes: Vec<RouteSpec>) -> Self {
        Self {
            public_dir,
            public_path: public_path.into(),
            routes,
        }
    }

    pub fn from_spec(spec: &DevServerSpec) -> Self {
        Self::new(
            spec.public_dir.clone(),
            spec.public_path.clone(),
            spec.routes.clone(),
        )
    }

    /// Resolve `path` (the URI path, without query). Segments are
    /// percent-decoded first.
    ///
    /// Assets under `publicPath` bypass the route table and map to the whole
    /// request path under `publicDir`, so `/assets/js/app.js` is
    /// `<publicDir>/assets/js/app.js`. With a `publicPath` of `/` every URI
    /// is under it, so routes are tried first there.
    pub fn resolve(&self, path: &str) -> Resolution {
        let Some(decoded) = decode_segments(path) else {
            return Resolution::NotFound;
        };
        let segments: Vec<&str> = decoded.iter().map(String::as_str).collect();

        let root_public_path = self.public_path == "/";
        if !root_public_path {
            if let Some(suffix) = path.strip_prefix(&self.public_path) {
                if split_segments(suffix).next().is_none() {
                    return Resolution::NotFound;
                }
                return self.asset(&segments);
            }
        }

        if let Some(route) = self.routes.iter().find(|r| r.pattern().matches(&segments)) {
            return Resolution::Route(route.file().to_path_buf());
        }

        if root_public_path {
            return self.asset(&segments);
        }
        Resolution::NotFound
    }

    fn asset(&self, segments: &[&str]) -> Resolution {
        if segments.is_empty() {
            return Resolution::NotFound;
        }
        let mut path = self.public_dir.clone();
        path.extend(segments);
        Resolution::Asset(path)
    }
}

/// `None` when a segment fails to decode or could escape `publicDir`.
fn decode_segments(path: &str) -> Option<Vec<String>> {
    split_segments(path)
        .map(|raw| {
            let segment = urlencoding::decode(raw).ok()?;
            let unsafe_segment = segment == ".."
                || segment == "."
                || segment.contains(['/', '\\', '\0']);
            (!unsafe_segment).then(|| segment.into_owned())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(public_path: &str, routes: &[(&str, &str)]) -> RouteTable {
        RouteTable::new(
            PathBuf::from("/p/public"),
            public_path,
            routes
                .iter()
                .map(|(uri, file)| RouteSpec::new(uri, PathBuf::from(file)).unwrap())
                .collect(),
        )
    }

    #[test]
    fn root_route_and_missing() {
        let routes = table("/assets/", &[("/", "/p/public/index.html")]);
        assert_eq!(
            routes.resolve("/"),
            Resolution::Route(PathBuf::from("/p/public/index.html"))
        );
        assert_eq!(routes.resolve("/missing"), Resolution::NotFound);
    }

    #[test]
    fn first_match_wins() {
        let routes = table(
            "/assets/",
            &[
                ("/app/settings", "/p/public/settings.html"),
                ("/app/*", "/p/public/app.html"),
            ],
        );
        assert_eq!(
            routes.resolve("/app/settings"),
            Resolution::Route(PathBuf::from("/p/public/settings.html"))
        );
        assert_eq!(
            routes.resolve("/app/users/42"),
            Resolution::Route(PathBuf::from("/p/public/app.html"))
        );
        // Wildcards need at least one segment.
        assert_eq!(routes.resolve("/app"), Resolution::NotFound);
    }

    #[test]
    fn assets_bypass_routes() {
        let routes = table("/assets/", &[("/*", "/p/public/index.html")]);
        assert_eq!(
            routes.resolve("/assets/js/app.js"),
            Resolution::Asset(PathBuf::from("/p/public/assets/js/app.js"))
        );
        assert_eq!(routes.resolve("/assets/"), Resolution::NotFound);
    }

    #[test]
    fn nested_public_path_keeps_full_request_path() {
        let routes = RouteTable::new(PathBuf::from("/proj/prod"), "/assets/js/", Vec::new());
        assert_eq!(
            routes.resolve("/assets/js/app.js"),
            Resolution::Asset(PathBuf::from("/proj/prod/assets/js/app.js"))
        );
        assert_eq!(
            routes.resolve("/assets/js/app.js.map"),
            Resolution::Asset(PathBuf::from("/proj/prod/assets/js/app.js.map"))
        );
        assert_eq!(routes.resolve("/assets/css/app.css"), Resolution::NotFound);
    }

    #[test]
    fn segments_are_percent_decoded() {
        let routes = table("/", &[]);
        assert_eq!(
            routes.resolve("/my%20file.css"),
            Resolution::Asset(PathBuf::from("/p/public/my file.css"))
        );
        assert_eq!(routes.resolve("/..%2fsecret"), Resolution::NotFound);
        assert_eq!(routes.resolve("/%2e%2e/secret"), Resolution::NotFound);
        assert_eq!(routes.resolve("/bad%ff"), Resolution::NotFound);
    }

    #[test]
    fn root_public_path_tries_routes_first() {
        let routes = table("/", &[("/", "/p/public/index.html"), ("/app/*", "/p/public/app.html")]);
        assert_eq!(
            routes.resolve("/app/x"),
            Resolution::Route(PathBuf::from("/p/public/app.html"))
        );
        assert_eq!(
            routes.resolve("/app.js"),
            Resolution::Asset(PathBuf::from("/p/public/app.js"))
        );
    }

    #[test]
    fn traversal_is_rejected() {
        let routes = table("/assets/", &[("/*", "/p/public/index.html")]);
        assert_eq!(routes.resolve("/assets/../secret"), Resolution::NotFound);
        assert_eq!(routes.resolve("/a/../b"), Resolution::NotFound);
    }
}
