//! HTML documents generated next to a script bundle.

use std::path::Path;

use kiln_config::PipelineSpec;
use minijinja::{context, Environment};

use crate::error::{CompileError, Result};
use crate::output::Artifact;

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{{ title }}</title>
</head>
<body>
  <div id="root"></div>
  <script src="{{ bundle_url }}"></script>
</body>
</html>
"#;

/// URL the generated pages use for the bundle.
pub fn bundle_url(spec: &PipelineSpec, public_path: &str) -> String {
    format!("{public_path}{}", spec.output_file_name())
}

/// One page per HTML target of `spec`.
pub fn render_html_targets(spec: &PipelineSpec, public_path: &str) -> Result<Vec<Artifact>> {
    if spec.html_targets.is_empty() {
        return Ok(Vec::new());
    }

    let mut env = Environment::new();
    // Template name has no extension, so nothing is auto-escaped.
    env.add_template("page", PAGE_TEMPLATE)
        .map_err(|e| template_error(spec, e))?;
    let template = env.get_template("page").map_err(|e| template_error(spec, e))?;

    let url = bundle_url(spec, public_path);
    let mut pages = Vec::with_capacity(spec.html_targets.len());
    for target in &spec.html_targets {
        let page = template
            .render(context! {
                title => title_for(&spec.output),
                bundle_url => url,
            })
            .map_err(|e| template_error(spec, e))?;
        pages.push(Artifact::new(target.clone(), page));
    }
    Ok(pages)
}

fn title_for(output: &Path) -> String {
    output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn template_error(spec: &PipelineSpec, err: minijinja::Error) -> CompileError {
    CompileError::new(&spec.id, format!("failed to render HTML target: {err}"))
}
