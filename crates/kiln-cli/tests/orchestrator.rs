//! Orchestrator scheduling, observed through an in-process runner.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use kiln_cli::dev::{BuildReason, HmrChannel, JobStatus, Orchestrator, StatusEvent};
use kiln_config::{PipelineId, PipelineKind, PipelineSpec};
use kiln_graph::{ContentHash, ModuleId, ModuleSnapshot};
use kiln_pipeline::{Artifact, BuildOutput, BundleModules, CompileError, PipelineRunner};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Default)]
struct Counters {
    running: FxHashMap<PipelineId, usize>,
    max_per_pipeline: FxHashMap<PipelineId, usize>,
    running_total: usize,
    max_total: usize,
    runs: FxHashMap<PipelineId, usize>,
}

/// Records concurrency and returns a configurable manifest.
struct FakeRunner {
    delay: Duration,
    counters: Mutex<Counters>,
    failing: Mutex<FxHashSet<PipelineId>>,
    manifests: FxHashMap<PipelineId, Vec<PathBuf>>,
}

impl FakeRunner {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            counters: Mutex::new(Counters::default()),
            failing: Mutex::new(FxHashSet::default()),
            manifests: FxHashMap::default(),
        }
    }

    fn with_manifest(mut self, id: &str, files: &[&str]) -> Self {
        self.manifests.insert(
            PipelineId::new(id),
            files.iter().map(PathBuf::from).collect(),
        );
        self
    }

    fn set_failing(&self, id: &str, failing: bool) {
        let mut set = self.failing.lock();
        if failing {
            set.insert(PipelineId::new(id));
        } else {
            set.remove(&PipelineId::new(id));
        }
    }

    fn runs(&self, id: &str) -> usize {
        self.counters.lock().runs.get(&PipelineId::new(id)).copied().unwrap_or(0)
    }

    fn max_per_pipeline(&self) -> usize {
        self.counters.lock().max_per_pipeline.values().copied().max().unwrap_or(0)
    }

    fn max_total(&self) -> usize {
        self.counters.lock().max_total
    }
}

impl PipelineRunner for FakeRunner {
    fn run(&self, spec: &PipelineSpec) -> kiln_pipeline::Result<BuildOutput> {
        let run = {
            let mut c = self.counters.lock();
            let running = c.running.entry(spec.id.clone()).or_default();
            *running += 1;
            let now = *running;
            let max = c.max_per_pipeline.entry(spec.id.clone()).or_default();
            *max = (*max).max(now);
            c.running_total += 1;
            c.max_total = c.max_total.max(c.running_total);
            let runs = c.runs.entry(spec.id.clone()).or_default();
            *runs += 1;
            *runs
        };

        thread::sleep(self.delay);

        {
            let mut c = self.counters.lock();
            if let Some(running) = c.running.get_mut(&spec.id) {
                *running -= 1;
            }
            c.running_total -= 1;
        }

        if self.failing.lock().contains(&spec.id) {
            return Err(CompileError::new(&spec.id, format!("run {run} failed")));
        }

        let mut output = BuildOutput::new(spec.id.clone());
        output.artifacts.push(Artifact::new(spec.output.clone(), format!("run {run}")));
        output.dependency_manifest = self
            .manifests
            .get(&spec.id)
            .cloned()
            .unwrap_or_else(|| vec![spec.input.clone()])
            .into_iter()
            .collect();
        output.modules = Some(bundle(&format!("run {run}")));
        Ok(output)
    }
}

fn bundle(code: &str) -> BundleModules {
    let entry = ModuleId::new("src/main.js");
    let code: std::collections::BTreeMap<_, _> = [(entry.clone(), code.to_string())].into();
    let hashes = code
        .iter()
        .map(|(id, code)| (id.clone(), ContentHash::of(code)))
        .collect();
    BundleModules {
        snapshot: ModuleSnapshot::new(entry, Vec::new(), hashes),
        code,
    }
}

fn spec(id: &str) -> PipelineSpec {
    PipelineSpec {
        id: PipelineId::new(id),
        kind: PipelineKind::Script,
        input: PathBuf::from(format!("/p/src/{}.js", id.replace(':', "_"))),
        output: PathBuf::from(format!("/p/public/{}.js", id.replace(':', "_"))),
        source_map: false,
        html_targets: Vec::new(),
    }
}

fn orchestrator(runner: Arc<FakeRunner>, ids: &[&str], workers: usize) -> Orchestrator {
    Orchestrator::builder(runner)
        .pipelines(ids.iter().map(|id| spec(id)))
        .workers(workers)
        .build()
}

fn ids(ids: &[&str]) -> BTreeSet<PipelineId> {
    ids.iter().map(|id| PipelineId::new(*id)).collect()
}

#[tokio::test]
async fn triggers_while_queued_are_absorbed() {
    let runner = Arc::new(FakeRunner::new(Duration::from_millis(5)));
    let orch = orchestrator(Arc::clone(&runner), &["js:0"], 1);

    for _ in 0..50 {
        assert!(orch.trigger(&PipelineId::new("js:0"), BuildReason::ManualTrigger));
    }
    orch.wait_idle().await;

    assert_eq!(runner.runs("js:0"), 1);
    assert_eq!(orch.status(&PipelineId::new("js:0")), Some(JobStatus::Succeeded));
}

#[tokio::test]
async fn triggers_while_running_coalesce_into_one_follow_up() {
    let runner = Arc::new(FakeRunner::new(Duration::from_millis(50)));
    let orch = orchestrator(Arc::clone(&runner), &["js:0"], 1);
    let id = PipelineId::new("js:0");

    orch.trigger(&id, BuildReason::Initial);
    tokio::time::sleep(Duration::from_millis(15)).await;
    assert_eq!(orch.status(&id), Some(JobStatus::Running));

    for i in 0..20 {
        orch.trigger(&id, BuildReason::FileChanged(PathBuf::from(format!("/p/src/{i}.js"))));
    }
    orch.wait_idle().await;

    assert_eq!(runner.runs("js:0"), 2);
    assert_eq!(runner.max_per_pipeline(), 1);

    // The follow-up carries the latest reason.
    let job = orch.job(&id).unwrap();
    assert_eq!(job.reason, BuildReason::FileChanged(PathBuf::from("/p/src/19.js")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn at_most_one_running_job_per_pipeline_under_load() {
    let runner = Arc::new(FakeRunner::new(Duration::from_millis(3)));
    let orch = orchestrator(Arc::clone(&runner), &["js:0", "js:1", "css:0"], 3);

    for round in 0..30 {
        orch.rebuild_all(BuildReason::ManualTrigger);
        if round % 3 == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
    orch.wait_idle().await;

    assert_eq!(runner.max_per_pipeline(), 1);
    for id in ["js:0", "js:1", "css:0"] {
        assert!(runner.runs(id) >= 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn worker_limit_bounds_parallel_builds() {
    let runner = Arc::new(FakeRunner::new(Duration::from_millis(30)));
    let orch = orchestrator(Arc::clone(&runner), &["a", "b", "c", "d", "e"], 2);

    orch.rebuild_all(BuildReason::Initial);
    orch.wait_idle().await;

    assert_eq!(runner.max_total(), 2);
    for id in ["a", "b", "c", "d", "e"] {
        assert_eq!(runner.runs(id), 1);
    }
}

#[tokio::test]
async fn failure_keeps_previous_output_and_isolates_pipelines() {
    let runner = Arc::new(FakeRunner::new(Duration::from_millis(1)));
    let orch = orchestrator(Arc::clone(&runner), &["js:0", "css:0"], 2);
    let js = PipelineId::new("js:0");
    let css = PipelineId::new("css:0");

    orch.rebuild_all(BuildReason::Initial);
    orch.wait_idle().await;
    let before = orch.last_output(&js).unwrap();

    runner.set_failing("js:0", true);
    orch.rebuild_all(BuildReason::ManualTrigger);
    orch.wait_idle().await;

    let job = orch.job(&js).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(!job.error.as_deref().unwrap_or_default().is_empty());
    assert_eq!(orch.last_output(&js).unwrap(), before);

    let cached = orch.cached_file(Path::new("/p/public/js_0.js")).unwrap();
    assert_eq!(&cached.contents[..], b"run 1");

    assert_eq!(orch.status(&css), Some(JobStatus::Succeeded));
    assert_eq!(
        &orch.cached_file(Path::new("/p/public/css_0.js")).unwrap().contents[..],
        b"run 2"
    );

    // failed -> queued -> running -> idle
    runner.set_failing("js:0", false);
    assert!(orch.trigger(&js, BuildReason::ManualTrigger));
    orch.wait_idle().await;
    assert_eq!(orch.status(&js), Some(JobStatus::Succeeded));
}

#[tokio::test]
async fn file_changes_map_through_manifests() {
    let runner = Arc::new(
        FakeRunner::new(Duration::from_millis(1))
            .with_manifest("js:0", &["/p/src/shared.js", "/p/src/a.js"])
            .with_manifest("js:1", &["/p/src/shared.js", "/p/src/b.js"]),
    );
    let orch = orchestrator(Arc::clone(&runner), &["js:0", "js:1"], 2);

    assert_eq!(
        orch.dependencies(&PipelineId::new("js:0")),
        BTreeSet::from([PathBuf::from("/p/src/js_0.js")])
    );

    orch.rebuild_all(BuildReason::Initial);
    orch.wait_idle().await;
    assert_eq!(
        orch.dependencies(&PipelineId::new("js:0")),
        BTreeSet::from([PathBuf::from("/p/src/a.js"), PathBuf::from("/p/src/shared.js")])
    );

    assert_eq!(orch.file_changed(Path::new("/p/src/shared.js")), ids(&["js:0", "js:1"]));
    orch.wait_idle().await;
    assert_eq!(runner.runs("js:0"), 2);
    assert_eq!(runner.runs("js:1"), 2);

    assert_eq!(orch.file_changed(Path::new("/p/src/a.js")), ids(&["js:0"]));
    orch.wait_idle().await;
    assert_eq!(runner.runs("js:0"), 3);
    assert_eq!(runner.runs("js:1"), 2);

    assert!(orch.file_changed(Path::new("/p/README.md")).is_empty());
    orch.wait_idle().await;
    assert_eq!(runner.runs("js:0"), 3);
}

#[tokio::test]
async fn pipeline_failing_first_build_is_still_watched() {
    let runner = Arc::new(FakeRunner::new(Duration::from_millis(1)));
    runner.set_failing("js:0", true);
    let orch = orchestrator(Arc::clone(&runner), &["js:0"], 1);

    orch.rebuild_all(BuildReason::Initial);
    orch.wait_idle().await;
    assert_eq!(orch.status(&PipelineId::new("js:0")), Some(JobStatus::Failed));
    assert!(orch.last_output(&PipelineId::new("js:0")).is_none());

    runner.set_failing("js:0", false);
    assert_eq!(orch.file_changed(Path::new("/p/src/js_0.js")), ids(&["js:0"]));
    orch.wait_idle().await;
    assert_eq!(orch.status(&PipelineId::new("js:0")), Some(JobStatus::Succeeded));
}

#[tokio::test]
async fn every_transition_is_broadcast() {
    let runner = Arc::new(FakeRunner::new(Duration::from_millis(1)));
    runner.set_failing("css:0", true);
    let orch = orchestrator(Arc::clone(&runner), &["css:0"], 1);
    let mut events = orch.subscribe();

    orch.trigger(&PipelineId::new("css:0"), BuildReason::Initial);
    orch.wait_idle().await;

    let mut seen: Vec<StatusEvent> = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    let statuses: Vec<JobStatus> = seen.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![JobStatus::Pending, JobStatus::Running, JobStatus::Failed]
    );
    assert_eq!(seen[2].error.as_deref(), Some("[css:0] run 1 failed"));
}

#[tokio::test]
async fn unknown_pipeline_is_rejected() {
    let runner = Arc::new(FakeRunner::new(Duration::from_millis(1)));
    let orch = orchestrator(runner, &["js:0"], 1);
    assert!(!orch.trigger(&PipelineId::new("js:9"), BuildReason::ManualTrigger));
}

#[tokio::test]
async fn hmr_pipeline_publishes_revisions_and_errors() {
    let runner = Arc::new(FakeRunner::new(Duration::from_millis(1)));
    let channel = HmrChannel::new();
    let orch = Orchestrator::builder(Arc::clone(&runner) as Arc<dyn PipelineRunner>)
        .pipelines([spec("hmr"), spec("css:0")])
        .hmr(PipelineId::new("hmr"), channel.clone())
        .build();

    orch.rebuild_all(BuildReason::Initial);
    orch.wait_idle().await;
    assert_eq!(channel.revision(), 1);

    runner.set_failing("hmr", true);
    orch.rebuild_all(BuildReason::ManualTrigger);
    orch.wait_idle().await;
    assert_eq!(channel.revision(), 1);
    assert_eq!(channel.last_error().as_deref(), Some("[hmr] run 2 failed"));

    runner.set_failing("hmr", false);
    orch.trigger(&PipelineId::new("hmr"), BuildReason::ManualTrigger);
    orch.wait_idle().await;
    assert_eq!(channel.revision(), 2);
    assert!(channel.last_error().is_none());
    assert_eq!(channel.module_code("src/main.js").as_deref(), Some("run 3"));
}

#[tokio::test]
async fn orchestrators_are_independent() {
    let a_runner = Arc::new(FakeRunner::new(Duration::from_millis(1)));
    let b_runner = Arc::new(FakeRunner::new(Duration::from_millis(1)));
    let a = orchestrator(Arc::clone(&a_runner), &["js:0"], 1);
    let _b = orchestrator(Arc::clone(&b_runner), &["js:0"], 1);

    a.rebuild_all(BuildReason::Initial);
    a.wait_idle().await;
    assert_eq!(a_runner.runs("js:0"), 1);
    assert_eq!(b_runner.runs("js:0"), 0);
}
