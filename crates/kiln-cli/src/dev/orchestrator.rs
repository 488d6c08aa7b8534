//! Build orchestrator.
//!
//! Owns every pipeline's job state, the dependency graph and the output
//! cache. Each pipeline has one logical queue:
//!
//! ```text
//! idle ──trigger──▶ queued ──permit──▶ running ──ok──▶ idle
//!                     ▲                   │
//!                     │                   └──err──▶ failed ──trigger──▶ queued
//!                     └── follow-up (triggers while running coalesce into one)
//! ```
//!
//! Pipelines build in parallel up to the worker limit; a pipeline never has
//! two jobs running. Builds run on the blocking pool so the server and the
//! watcher are never stalled by a compile.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use kiln_config::{PipelineId, PipelineSpec};
use kiln_graph::DependencyGraph;
use kiln_pipeline::{BuildOutput, CompileError, PipelineRunner};
use parking_lot::Mutex;
use rustc_hash::FxHashMap as HashMap;
use tokio::sync::{broadcast, watch, Semaphore};
use tracing::{debug, info, warn};

use crate::dev::hmr::HmrChannel;
use crate::dev::job::{BuildJob, BuildReason, JobStatus, StatusEvent};
use crate::dev::state::{CachedFile, OutputCache};

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Queued,
    Running { follow_up: Option<BuildReason> },
    Failed,
}

struct Slot {
    phase: Phase,
    /// Current job, or the last finished one
    job: Option<BuildJob>,
}

struct State {
    slots: HashMap<PipelineId, Slot>,
    graph: DependencyGraph,
    cache: OutputCache,
    outputs: HashMap<PipelineId, Arc<BuildOutput>>,
}

struct Inner {
    specs: Vec<PipelineSpec>,
    runner: Arc<dyn PipelineRunner>,
    workers: Arc<Semaphore>,
    state: Mutex<State>,
    events: broadcast::Sender<StatusEvent>,
    active: watch::Sender<usize>,
    hmr: Option<(PipelineId, HmrChannel)>,
}

impl Inner {
    fn spec(&self, id: &PipelineId) -> Option<&PipelineSpec> {
        self.specs.iter().find(|spec| &spec.id == id)
    }

    fn emit(&self, job: &BuildJob) {
        // No subscribers is fine.
        let _ = self.events.send(job.event());
    }

    fn hmr_for(&self, id: &PipelineId) -> Option<&HmrChannel> {
        match &self.hmr {
            Some((hmr_id, channel)) if hmr_id == id => Some(channel),
            _ => None,
        }
    }
}

/// Configures an [`Orchestrator`].
pub struct OrchestratorBuilder {
    pipelines: Vec<PipelineSpec>,
    runner: Arc<dyn PipelineRunner>,
    workers: usize,
    hmr: Option<(PipelineId, HmrChannel)>,
}

impl OrchestratorBuilder {
    pub fn new(runner: Arc<dyn PipelineRunner>) -> Self {
        Self {
            pipelines: Vec::new(),
            runner,
            workers: 1,
            hmr: None,
        }
    }

    pub fn pipelines(mut self, pipelines: impl IntoIterator<Item = PipelineSpec>) -> Self {
        self.pipelines.extend(pipelines);
        self
    }

    /// Maximum number of pipelines building at once. At least one.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Notify `channel` after every build of `pipeline`.
    pub fn hmr(mut self, pipeline: PipelineId, channel: HmrChannel) -> Self {
        self.hmr = Some((pipeline, channel));
        self
    }

    pub fn build(self) -> Orchestrator {
        let mut graph = DependencyGraph::new();
        let mut slots = HashMap::default();
        for spec in &self.pipelines {
            // Until the first success a pipeline depends on its input only.
            graph.update(&spec.id, [spec.input.clone()]);
            slots.insert(
                spec.id.clone(),
                Slot {
                    phase: Phase::Idle,
                    job: None,
                },
            );
        }

        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (active, _) = watch::channel(0);

        Orchestrator {
            inner: Arc::new(Inner {
                specs: self.pipelines,
                runner: self.runner,
                workers: Arc::new(Semaphore::new(self.workers)),
                state: Mutex::new(State {
                    slots,
                    graph,
                    cache: OutputCache::new(),
                    outputs: HashMap::default(),
                }),
                events,
                active,
                hmr: self.hmr,
            }),
        }
    }
}

/// Handle to a running orchestrator. Clones share state; separately built
/// orchestrators share nothing.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn builder(runner: Arc<dyn PipelineRunner>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(runner)
    }

    /// Request a build of `id`.
    ///
    /// Returns `false` for an unknown pipeline. A trigger for a pipeline
    /// that is already queued is absorbed; one for a running pipeline
    /// becomes its single follow-up job.
    ///
    /// Must be called from within a tokio runtime.
    pub fn trigger(&self, id: &PipelineId, reason: BuildReason) -> bool {
        let mut state = self.inner.state.lock();
        let Some(slot) = state.slots.get_mut(id) else {
            return false;
        };

        match &mut slot.phase {
            Phase::Queued => {
                debug!(pipeline = %id, "already queued");
                return true;
            }
            Phase::Running { follow_up } => {
                debug!(pipeline = %id, %reason, "coalescing into follow-up build");
                *follow_up = Some(reason);
                return true;
            }
            Phase::Idle | Phase::Failed => {}
        }

        let job = BuildJob::new(id.clone(), reason);
        self.inner.emit(&job);
        slot.job = Some(job);
        slot.phase = Phase::Queued;
        drop(state);

        self.inner.active.send_modify(|n| *n += 1);
        tokio::spawn(run_pipeline(Arc::clone(&self.inner), id.clone()));
        true
    }

    /// Trigger every pipeline.
    pub fn rebuild_all(&self, reason: BuildReason) {
        for spec in &self.inner.specs {
            self.trigger(&spec.id, reason.clone());
        }
    }

    /// Trigger every pipeline whose last dependency manifest lists `path`.
    pub fn file_changed(&self, path: &Path) -> BTreeSet<PipelineId> {
        let affected = self.inner.state.lock().graph.affected_pipelines(path);
        for id in &affected {
            self.trigger(id, BuildReason::FileChanged(path.to_path_buf()));
        }
        affected
    }

    /// Wait until no pipeline is queued or running.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.active.subscribe();
        // The sender lives as long as `self`.
        let _ = rx.wait_for(|active| *active == 0).await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.inner.events.subscribe()
    }

    pub fn pipelines(&self) -> &[PipelineSpec] {
        &self.inner.specs
    }

    /// Current or last job of `id`.
    pub fn job(&self, id: &PipelineId) -> Option<BuildJob> {
        self.inner.state.lock().slots.get(id).and_then(|slot| slot.job.clone())
    }

    /// Jobs of every pipeline, in declaration order.
    pub fn jobs(&self) -> Vec<BuildJob> {
        let state = self.inner.state.lock();
        self.inner
            .specs
            .iter()
            .filter_map(|spec| state.slots.get(&spec.id).and_then(|slot| slot.job.clone()))
            .collect()
    }

    pub fn status(&self, id: &PipelineId) -> Option<JobStatus> {
        self.job(id).map(|job| job.status)
    }

    /// Last successful output of `id`, kept across failed builds.
    pub fn last_output(&self, id: &PipelineId) -> Option<Arc<BuildOutput>> {
        self.inner.state.lock().outputs.get(id).cloned()
    }

    /// Latest successful artifact written to `path`.
    pub fn cached_file(&self, path: &Path) -> Option<CachedFile> {
        self.inner.state.lock().cache.get(path)
    }

    pub fn dependencies(&self, id: &PipelineId) -> BTreeSet<std::path::PathBuf> {
        self.inner
            .state
            .lock()
            .graph
            .dependencies(id)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn hmr(&self) -> Option<&HmrChannel> {
        self.inner.hmr.as_ref().map(|(_, channel)| channel)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("pipelines", &self.inner.specs.len())
            .field("workers", &self.inner.workers.available_permits())
            .finish()
    }
}

/// Drive one pipeline from `queued` until it settles in `idle` or `failed`.
async fn run_pipeline(inner: Arc<Inner>, id: PipelineId) {
    loop {
        let permit = Arc::clone(&inner.workers).acquire_owned().await;

        let spec = {
            let mut state = inner.state.lock();
            let Some(slot) = state.slots.get_mut(&id) else {
                break;
            };
            slot.phase = Phase::Running { follow_up: None };
            if let Some(job) = slot.job.as_mut() {
                job.start();
                inner.emit(job);
            }
            inner.spec(&id).cloned()
        };
        let Some(spec) = spec else {
            break;
        };

        let result = match permit {
            Ok(_permit) => {
                let runner = Arc::clone(&inner.runner);
                match tokio::task::spawn_blocking(move || runner.run(&spec)).await {
                    Ok(result) => result,
                    Err(join) => Err(CompileError::new(
                        &id,
                        format!("pipeline runner panicked: {join}"),
                    )),
                }
            }
            Err(_) => Err(CompileError::new(&id, "worker pool is closed")),
        };

        if !finish(&inner, &id, result) {
            break;
        }
    }

    inner.active.send_modify(|n| *n = n.saturating_sub(1));
}

/// Record a finished build. Returns `true` when a follow-up job was queued.
fn finish(inner: &Inner, id: &PipelineId, result: kiln_pipeline::Result<BuildOutput>) -> bool {
    let mut hmr_modules = None;
    let mut hmr_error = None;

    let follow_up = {
        let mut state = inner.state.lock();
        let State {
            slots,
            graph,
            cache,
            outputs,
        } = &mut *state;
        let Some(slot) = slots.get_mut(id) else {
            return false;
        };

        let failed = match result {
            Ok(output) => {
                graph.update(id, output.dependency_manifest.iter().cloned());
                cache.replace(&output);
                for diagnostic in &output.diagnostics {
                    match &diagnostic.location {
                        Some(location) => {
                            warn!(pipeline = %id, %location, "{}", diagnostic.message)
                        }
                        None => warn!(pipeline = %id, "{}", diagnostic.message),
                    }
                }
                if let Some(job) = slot.job.as_mut() {
                    job.succeed();
                    info!(
                        pipeline = %id,
                        reason = %job.reason,
                        files = output.dependency_manifest.len(),
                        duration_ms = job.duration().map(|d| d.as_millis() as u64).unwrap_or(0),
                        "build succeeded"
                    );
                }
                if inner.hmr_for(id).is_some() {
                    hmr_modules = output.modules.clone();
                }
                outputs.insert(id.clone(), Arc::new(output));
                false
            }
            Err(err) => {
                // Keep watching what the previous build read plus whatever
                // this one reached before failing.
                if !err.partial_manifest.is_empty() {
                    let mut files = err.partial_manifest.clone();
                    if let Some(previous) = graph.dependencies(id) {
                        files.extend(previous.iter().cloned());
                    }
                    graph.update(id, files);
                }
                let message = err.to_string();
                warn!(pipeline = %id, error = %message, "build failed");
                if inner.hmr_for(id).is_some() {
                    hmr_error = Some(message.clone());
                }
                if let Some(job) = slot.job.as_mut() {
                    job.fail(message);
                }
                true
            }
        };
        if let Some(job) = slot.job.as_ref() {
            inner.emit(job);
        }

        let follow_up = match &mut slot.phase {
            Phase::Running { follow_up } => follow_up.take(),
            _ => None,
        };
        match follow_up {
            Some(reason) => {
                let job = BuildJob::new(id.clone(), reason);
                inner.emit(&job);
                slot.job = Some(job);
                slot.phase = Phase::Queued;
                true
            }
            None => {
                slot.phase = if failed { Phase::Failed } else { Phase::Idle };
                false
            }
        }
    };

    if let Some(channel) = inner.hmr_for(id) {
        if let Some(modules) = hmr_modules {
            channel.publish(&modules);
        } else if let Some(message) = hmr_error {
            channel.publish_error(message);
        }
    }

    follow_up
}
