//! `@import` scanning.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"@import\s+(?:url\(\s*(?:"([^"]*)"|'([^']*)'|([^)"'\s]*))\s*\)|"([^"]*)"|'([^']*)')\s*([^;]*);"#,
    )
    .expect("import pattern is valid")
});

static CONDITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(layer)(?:\(\s*([^)]*?)\s*\))?)?\s*(?:supports\(((?:[^()]|\([^()]*\))*)\))?\s*(.*)$",
    )
    .expect("condition pattern is valid")
});

/// One `@import` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssImport {
    pub url: String,
    /// Byte range of the whole statement, including the semicolon
    pub range: Range<usize>,
    pub conditions: ImportConditions,
}

impl CssImport {
    /// Remote and root-relative URLs are left for the browser to fetch.
    pub fn is_external(&self) -> bool {
        let url = self.url.as_str();
        url.starts_with("http://")
            || url.starts_with("https://")
            || url.starts_with("//")
            || url.starts_with("data:")
            || url.starts_with('/')
    }
}

/// Cascade layer, supports and media conditions of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportConditions {
    /// `Some("")` for an anonymous layer
    pub layer: Option<String>,
    pub supports: Option<String>,
    pub media: Option<String>,
}

impl ImportConditions {
    fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let Some(caps) = CONDITION_RE.captures(raw) else {
            return Self {
                media: Some(raw.to_string()),
                ..Self::default()
            };
        };

        let non_empty = |s: &str| (!s.trim().is_empty()).then(|| s.trim().to_string());
        Self {
            layer: caps
                .get(1)
                .map(|_| caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default()),
            supports: caps.get(3).and_then(|m| non_empty(m.as_str())),
            media: caps.get(4).and_then(|m| non_empty(m.as_str())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.layer.is_none() && self.supports.is_none() && self.media.is_none()
    }

    /// Opening wrappers for the inlined content, outermost first.
    pub fn open(&self) -> Vec<String> {
        let mut blocks = Vec::new();
        if let Some(layer) = &self.layer {
            if layer.is_empty() {
                blocks.push("@layer {".to_string());
            } else {
                blocks.push(format!("@layer {layer} {{"));
            }
        }
        if let Some(supports) = &self.supports {
            blocks.push(format!("@supports ({supports}) {{"));
        }
        if let Some(media) = &self.media {
            blocks.push(format!("@media {media} {{"));
        }
        blocks
    }
}

/// Replace comment bodies with spaces, keeping byte offsets and newlines.
pub fn blank_comments(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let mut quote: Option<u8> = None;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                out.push(b);
                if b == b'\\' && i + 1 < bytes.len() {
                    out.push(bytes[i + 1]);
                    i += 2;
                    continue;
                }
                if b == q {
                    quote = None;
                }
                i += 1;
            }
            None if b == b'"' || b == b'\'' => {
                quote = Some(b);
                out.push(b);
                i += 1;
            }
            None if b == b'/' && bytes.get(i + 1) == Some(&b'*') => {
                let end = source[i + 2..]
                    .find("*/")
                    .map(|p| i + 2 + p + 2)
                    .unwrap_or(bytes.len());
                for &c in &bytes[i..end] {
                    out.push(if c == b'\n' { b'\n' } else { b' ' });
                }
                i = end;
            }
            None => {
                out.push(b);
                i += 1;
            }
        }
    }

    // Comment bytes became ASCII spaces one for one, so this stays valid UTF-8.
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Find every `@import` in `source`, in order.
pub fn scan_imports(source: &str) -> Vec<CssImport> {
    let scannable = blank_comments(source);
    IMPORT_RE
        .captures_iter(&scannable)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let url = (1..=5).find_map(|i| caps.get(i))?.as_str().to_string();
            let conditions = caps
                .get(6)
                .map(|m| ImportConditions::parse(m.as_str()))
                .unwrap_or_default();
            Some(CssImport {
                url,
                range: whole.range(),
                conditions,
            })
        })
        .collect()
}

/// `source` with every import statement in `imports` replaced by spaces.
/// Line structure is kept so diagnostics still point at the right line.
pub fn strip_imports(source: &str, imports: &[CssImport]) -> String {
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for import in imports {
        out.push_str(&source[cursor..import.range.start]);
        for c in source[import.range.clone()].chars() {
            out.push(if c == '\n' { '\n' } else { ' ' });
        }
        cursor = import.range.end;
    }
    out.push_str(&source[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_quoted_and_url_forms() {
        let css = r#"@import "a.css";
@import url('b.css') screen;
@import url(c.css);
body { color: red }"#;
        let imports = scan_imports(css);
        let urls: Vec<_> = imports.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["a.css", "b.css", "c.css"]);
        assert_eq!(imports[1].conditions.media.as_deref(), Some("screen"));
        assert!(imports[0].conditions.is_empty());
    }

    #[test]
    fn ignores_commented_imports() {
        let css = "/* @import \"old.css\"; */\n@import \"new.css\";";
        let imports = scan_imports(css);
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].url, "new.css");
    }

    #[test]
    fn parses_layer_and_supports() {
        let css = r#"@import "theme.css" layer(base) supports(display: grid) print;"#;
        let conditions = &scan_imports(css)[0].conditions;
        assert_eq!(conditions.layer.as_deref(), Some("base"));
        assert_eq!(conditions.supports.as_deref(), Some("display: grid"));
        assert_eq!(conditions.media.as_deref(), Some("print"));
        assert_eq!(conditions.open().len(), 3);
    }

    #[test]
    fn external_urls_are_detected() {
        let css = r#"@import "https://fonts.example/css"; @import "/root.css"; @import "local.css";"#;
        let external: Vec<_> = scan_imports(css).iter().map(|i| i.is_external()).collect();
        assert_eq!(external, vec![true, true, false]);
    }

    #[test]
    fn strip_keeps_line_structure() {
        let css = "@import \"a.css\";\n.x { }\n";
        let stripped = strip_imports(css, &scan_imports(css));
        assert_eq!(stripped.lines().count(), css.lines().count());
        assert!(stripped.starts_with("                "));
        assert!(stripped.contains(".x { }"));
    }
}
