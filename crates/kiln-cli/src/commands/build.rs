//! `kiln build`: run every pipeline once.

use std::sync::Arc;
use std::time::Instant;

use kiln_config::{Environment, KilnConfig, PipelineSpec};
use kiln_pipeline::{Runner, RunnerContext};

use crate::cli::BuildArgs;
use crate::commands::utils::{self, display_path};
use crate::dev::{BuildReason, JobStatus, Orchestrator};
use crate::error::{CliError, Result};
use crate::ui::{self, SummaryRow};

/// Execute the build command.
///
/// Pipelines build in parallel up to `workers`. One failing pipeline does
/// not stop the others; the command fails once all have finished.
pub async fn execute(args: BuildArgs) -> Result<()> {
    let loaded = utils::load_config(&args.config)?;
    let mut config = loaded.config;
    if args.production {
        config.build.environment = Environment::Production;
    }

    let pipelines = build_pipelines(&config);
    if pipelines.is_empty() {
        ui::warning("No pipelines declared, nothing to build");
        return Ok(());
    }

    ui::info(&format!(
        "Building {} pipeline(s) for {}",
        pipelines.len(),
        config.build.environment.as_str()
    ));

    let started = Instant::now();
    let runner = Arc::new(Runner::new(RunnerContext::from_config(&config)));
    let orchestrator = Orchestrator::builder(runner)
        .pipelines(pipelines)
        .workers(config.build.workers)
        .build();

    orchestrator.rebuild_all(BuildReason::Initial);
    orchestrator.wait_idle().await;

    let rows = summary_rows(&orchestrator, &loaded.root);
    let failed = rows.iter().filter(|row| row.error.is_some()).count();

    for row in &rows {
        if let Some(error) = &row.error {
            ui::error(error);
        }
    }
    ui::print_build_summary(&rows);

    if failed > 0 {
        return Err(CliError::BuildFailed {
            failed,
            total: rows.len(),
        });
    }

    ui::success(&format!(
        "Built {} pipeline(s) in {}",
        rows.len(),
        ui::format_duration(started.elapsed())
    ));
    Ok(())
}

/// The HMR entry bundle is a development artifact.
fn build_pipelines(config: &KilnConfig) -> Vec<PipelineSpec> {
    match config.build.environment {
        Environment::Development => config.all_pipelines(),
        Environment::Production => config.build.pipelines.clone(),
    }
}

fn summary_rows(orchestrator: &Orchestrator, root: &std::path::Path) -> Vec<SummaryRow> {
    orchestrator
        .pipelines()
        .iter()
        .map(|spec| {
            let job = orchestrator.job(&spec.id);
            let output = orchestrator.last_output(&spec.id);
            let error = match &job {
                Some(job) if job.status == JobStatus::Succeeded => None,
                Some(job) => Some(
                    job.error
                        .clone()
                        .unwrap_or_else(|| format!("[{}] did not finish", spec.id)),
                ),
                None => Some(format!("[{}] never ran", spec.id)),
            };

            SummaryRow {
                pipeline: spec.id.to_string(),
                output: display_path(&spec.output, root),
                bytes: output.map(|o| o.total_size() as u64).unwrap_or(0),
                duration: job.and_then(|job| job.duration()).unwrap_or_default(),
                error,
            }
        })
        .collect()
}
