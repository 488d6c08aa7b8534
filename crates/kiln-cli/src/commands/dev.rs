//! `kiln dev`: build, watch, serve and hot-reload.
//!
//! Lifecycle:
//! - load the configuration and apply command-line overrides
//! - start the orchestrator and queue every pipeline
//! - bind the HTTP server (it serves the last good output while builds run)
//! - feed watcher events into the orchestrator until Ctrl+C

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use kiln_config::{ConfigError, DevServerSpec};
use kiln_pipeline::{Runner, RunnerContext};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::{signal, time};
use tracing::{debug, info};

use crate::cli::DevArgs;
use crate::commands::utils::{self, display_path};
use crate::dev::{
    BuildReason, DevServer, FileWatcher, HmrChannel, JobStatus, Orchestrator, RouteTable,
    StatusEvent, WatchEvent,
};
use crate::error::{CliError, Result};
use crate::ui;

const WATCH_RETRY: Duration = Duration::from_secs(1);

/// Execute the dev command.
///
/// A failing pipeline never stops the server; it keeps serving the previous
/// output and the browser shows the error.
pub async fn execute(args: DevArgs) -> Result<()> {
    let loaded = utils::load_config(&args.config)?;
    let mut config = loaded.config;

    let dev = {
        let dev = config.dev_server.as_mut().ok_or(CliError::NoDevServer)?;
        if let Some(port) = args.port {
            if port == 0 {
                return Err(ConfigError::InvalidPort {
                    port: i64::from(port),
                }
                .into());
            }
            dev.port = port;
        }
        if let Some(host) = args.host {
            dev.hostname = host;
        }
        dev.clone()
    };

    let context = RunnerContext::from_config(&config);
    let runner = Arc::new(Runner::new(context.clone()));
    let mut builder = Orchestrator::builder(runner)
        .pipelines(config.all_pipelines())
        .workers(config.build.workers);
    if let Some(id) = &context.hmr_pipeline {
        ui::info(&format!("Hot module replacement enabled for {id}"));
        builder = builder.hmr(id.clone(), HmrChannel::new());
    }
    let orchestrator = builder.build();

    let reporter = tokio::spawn(report_status(orchestrator.subscribe()));
    orchestrator.rebuild_all(BuildReason::Initial);

    let server = DevServer::new(
        dev.hostname.clone(),
        dev.port,
        RouteTable::from_spec(&dev),
        orchestrator.clone(),
    );
    let listener = server.bind().await?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut server_handle = tokio::spawn(server.serve(listener, async move {
        let _ = shutdown_rx.await;
    }));

    ui::success(&format!("Development server running at {}", dev.server_url()));
    ui::info(&format!("Watching {}", loaded.root.display()));
    ui::info("Press Ctrl+C to stop");

    let mut watcher = start_watcher(&loaded.root, &dev);
    let result = loop {
        tokio::select! {
            event = next_event(&mut watcher) => match event {
                Some(WatchEvent::Changed { path, kind }) => {
                    let affected = orchestrator.file_changed(&path);
                    if affected.is_empty() {
                        debug!(path = %path.display(), ?kind, "change affects no pipeline");
                    } else {
                        ui::info(&format!(
                            "{} changed, rebuilding {}",
                            display_path(&path, &loaded.root),
                            affected.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(", ")
                        ));
                    }
                }
                Some(WatchEvent::Error(err)) => {
                    ui::warning(&format!("{err}; restarting watcher"));
                    watcher = restart_watcher(&loaded.root, &dev, &orchestrator);
                }
                None => {
                    ui::warning("File watcher stopped; restarting watcher");
                    watcher = restart_watcher(&loaded.root, &dev, &orchestrator);
                }
            },

            _ = time::sleep(WATCH_RETRY), if watcher.is_none() => {
                watcher = restart_watcher(&loaded.root, &dev, &orchestrator);
            }

            _ = signal::ctrl_c() => {
                ui::info("Shutting down development server...");
                break Ok(());
            }

            joined = &mut server_handle => {
                break match joined {
                    Ok(Ok(())) => Err(CliError::Server("server stopped unexpectedly".to_string())),
                    Ok(Err(err)) => Err(err),
                    Err(join) => Err(CliError::Server(join.to_string())),
                };
            }
        }
    };

    let _ = shutdown_tx.send(());
    if !server_handle.is_finished() {
        let _ = server_handle.await;
    }
    reporter.abort();

    if result.is_ok() {
        ui::success("Development server stopped");
    }
    result
}

type Watch = Option<(FileWatcher, mpsc::UnboundedReceiver<WatchEvent>)>;

fn start_watcher(root: &Path, dev: &DevServerSpec) -> Watch {
    match FileWatcher::new(
        root.to_path_buf(),
        dev.watch.ignore.clone(),
        dev.watch.debounce_ms,
    ) {
        Ok(watch) => Some(watch),
        Err(err) => {
            ui::warning(&format!("{err}"));
            None
        }
    }
}

/// New watcher plus a full rebuild, since changes may have been missed.
fn restart_watcher(root: &Path, dev: &DevServerSpec, orchestrator: &Orchestrator) -> Watch {
    let watch = start_watcher(root, dev);
    if watch.is_some() {
        info!("file watcher restarted");
        orchestrator.rebuild_all(BuildReason::ManualTrigger);
    }
    watch
}

async fn next_event(watch: &mut Watch) -> Option<WatchEvent> {
    match watch {
        Some((_, rx)) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Print build status transitions as they happen.
async fn report_status(mut events: broadcast::Receiver<StatusEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match event.status {
                JobStatus::Pending => {}
                JobStatus::Running => ui::debug(&format!("Building {}", event.pipeline_id)),
                JobStatus::Succeeded => ui::success(&format!("{} built", event.pipeline_id)),
                JobStatus::Failed => ui::error(&format!(
                    "{} failed: {}",
                    event.pipeline_id,
                    event.error.as_deref().unwrap_or("unknown error")
                )),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "status reporter lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
