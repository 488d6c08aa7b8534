//! `kiln check`: validate the configuration without building.
//!
//! The normalized model goes to stdout so it can be piped; status lines go
//! to stderr.

use std::fmt::Write as _;

use kiln_config::{KilnConfig, PipelineKind, RouteSpec};

use crate::cli::CheckArgs;
use crate::commands::utils;
use crate::error::Result;
use crate::ui;

pub async fn execute(args: CheckArgs) -> Result<()> {
    let loaded = utils::load_config(&args.config)?;
    ui::success(&format!("{} is valid", loaded.path.display()));
    print!("{}", describe(&loaded.config));
    Ok(())
}

/// Plain-text rendering of the normalized configuration.
pub fn describe(config: &KilnConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "environment: {}", config.build.environment.as_str());
    let _ = writeln!(out, "workers: {}", config.build.workers);

    let _ = writeln!(out, "pipelines:");
    for spec in config.all_pipelines() {
        let kind = match spec.kind {
            PipelineKind::Script => "script",
            PipelineKind::Stylesheet => "stylesheet",
        };
        let _ = writeln!(out, "  {} ({kind})", spec.id);
        let _ = writeln!(out, "    input:  {}", spec.input.display());
        let _ = writeln!(out, "    output: {}", spec.output.display());
        if spec.source_map {
            let _ = writeln!(out, "    map:    {}", spec.source_map_path().display());
        }
        for html in &spec.html_targets {
            let _ = writeln!(out, "    html:   {}", html.display());
        }
    }

    if let Some(dev) = &config.dev_server {
        let _ = writeln!(out, "devServer: {}", dev.server_url());
        let _ = writeln!(out, "  publicDir:  {}", dev.public_dir.display());
        let _ = writeln!(out, "  publicPath: {}", dev.public_path);
        match config.hmr_entry() {
            Some(entry) => {
                let _ = writeln!(out, "  hmr: {}", entry.id);
            }
            None => {
                let _ = writeln!(out, "  hmr: off");
            }
        }
        let _ = writeln!(out, "  routes:");
        for route in &dev.routes {
            let kind = match route {
                RouteSpec::StaticFile { .. } => "static",
                RouteSpec::WildcardFallback { .. } => "fallback",
            };
            let _ = writeln!(
                out,
                "    {} -> {} ({kind})",
                route.pattern().as_str(),
                route.file().display()
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use kiln_config::{load, RawConfig};

    use super::*;

    #[test]
    fn describes_pipelines_and_routes() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "workers": 2,
                "js": [{ "input": "src/main.js", "output": "public/assets/app.js", "sourcemap": true }],
                "css": [{ "input": "src/main.css", "output": "public/assets/app.css" }],
                "devServer": {
                    "hostname": "localhost", "port": 3000,
                    "publicDir": "public", "publicPath": "/assets/",
                    "routes": [{ "uri": "/app/*", "file": "public/assets/app.js" }]
                }
            }"#,
        )
        .unwrap();
        let config = load(&raw, Path::new("/p")).unwrap();

        let text = describe(&config);
        assert!(text.contains("workers: 2"));
        assert!(text.contains("js:0 (script)"));
        assert!(text.contains("map:    /p/public/assets/app.js.map"));
        assert!(text.contains("css:0 (stylesheet)"));
        assert!(text.contains("devServer: http://localhost:3000"));
        assert!(text.contains("/app/* -> /p/public/assets/app.js (fallback)"));
        assert!(text.contains("hmr: off"));
    }
}
