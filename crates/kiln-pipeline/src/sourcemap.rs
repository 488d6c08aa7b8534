//! Source map assembly for concatenated outputs.

use std::path::{Component, Path, PathBuf};

use oxc_sourcemap::{SourceMap, SourceMapBuilder};

/// Accumulates mappings while an output file is assembled line by line.
pub struct MapBuilder {
    builder: SourceMapBuilder,
    map_dir: PathBuf,
}

impl MapBuilder {
    /// `output` is the generated file the map describes. Source paths are
    /// recorded relative to its directory.
    pub fn new(output: &Path) -> Self {
        let mut builder = SourceMapBuilder::default();
        if let Some(name) = output.file_name() {
            builder.set_file(&name.to_string_lossy());
        }
        Self {
            builder,
            map_dir: output.parent().map(Path::to_path_buf).unwrap_or_default(),
        }
    }

    /// Register a source file and its original content.
    pub fn add_source(&mut self, path: &Path, content: &str) -> u32 {
        let name = relative_path(&self.map_dir, path);
        self.builder.add_source_and_content(&name, content)
    }

    /// Map generated `dst_line` to the start of `src_line` in `source`.
    pub fn add_line(&mut self, dst_line: u32, source: u32, src_line: u32) {
        self.builder
            .add_token(dst_line, 0, src_line, 0, Some(source), None);
    }

    /// Copy the tokens of a map produced for a single source, shifted down
    /// by `line_offset` generated lines.
    pub fn add_shifted(&mut self, map: &SourceMap, source: u32, line_offset: u32) {
        for token in map.get_tokens() {
            self.builder.add_token(
                token.get_dst_line() + line_offset,
                token.get_dst_col(),
                token.get_src_line(),
                token.get_src_col(),
                Some(source),
                None,
            );
        }
    }

    pub fn finish(self) -> String {
        self.builder.into_sourcemap().to_json_string()
    }
}

/// `target` relative to `base`, with forward slashes.
pub fn relative_path(base: &Path, target: &Path) -> String {
    let base: Vec<Component<'_>> = base.components().collect();
    let target_components: Vec<Component<'_>> = target.components().collect();

    let common = base
        .iter()
        .zip(target_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    if common == 0 {
        return target.to_string_lossy().replace('\\', "/");
    }

    let mut parts: Vec<String> = Vec::new();
    for _ in common..base.len() {
        parts.push("..".to_string());
    }
    for component in &target_components[common..] {
        parts.push(component.as_os_str().to_string_lossy().into_owned());
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_climb_out_of_output_dir() {
        assert_eq!(
            relative_path(Path::new("/p/public/js"), Path::new("/p/src/app.js")),
            "../../src/app.js"
        );
        assert_eq!(
            relative_path(Path::new("/p/public"), Path::new("/p/public/a.css")),
            "a.css"
        );
    }

    #[test]
    fn map_lists_sources_relative_to_output() {
        let mut map = MapBuilder::new(Path::new("/p/public/app.css"));
        let id = map.add_source(Path::new("/p/src/a.css"), "a {}\n");
        map.add_line(0, id, 0);
        let json: serde_json::Value = serde_json::from_str(&map.finish()).unwrap();

        assert_eq!(json["file"], "app.css");
        assert_eq!(json["sources"][0], "../src/a.css");
        assert_eq!(json["sourcesContent"][0], "a {}\n");
    }
}
