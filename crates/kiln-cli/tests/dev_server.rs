//! Dev flow against a temporary project: real pipelines, HMR revisions
//! and the HTTP surface.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_cli::dev::hmr::ServerMessage;
use kiln_cli::dev::{BuildReason, DevServer, HmrChannel, JobStatus, Orchestrator, RouteTable};
use kiln_config::{load, KilnConfig, RawConfig};
use kiln_pipeline::{Runner, RunnerContext};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

fn write(dir: &Path, rel: &str, contents: &str) -> PathBuf {
    let path = dir.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

fn project() -> (TempDir, KilnConfig) {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "package.json", "{}");
    write(
        dir.path(),
        "src/main.js",
        "import { greet } from './greet';\nconsole.log(greet('kiln'));\n",
    );
    write(
        dir.path(),
        "src/greet.js",
        "export function greet(name) { return 'hello ' + name; }\n",
    );
    write(dir.path(), "public/robots.txt", "User-agent: *\n");
    write(dir.path(), "public/release notes.txt", "v1\n");

    let raw: RawConfig = serde_json::from_str(
        r#"{
            "js": [{
                "input": "src/main.js",
                "output": "public/app.js",
                "html": [{ "filename": "index.html" }]
            }],
            "devServer": {
                "hostname": "127.0.0.1",
                "port": 3000,
                "publicDir": "public",
                "routes": [{ "uri": "/", "file": "public/index.html" }],
                "useHotModuleReplacement": true,
                "hotModuleBuild": { "input": "src/main.js", "output": "public/app.js" }
            }
        }"#,
    )
    .unwrap();
    let config = load(&raw, dir.path()).unwrap();
    (dir, config)
}

fn orchestrator(config: &KilnConfig) -> Orchestrator {
    let context = RunnerContext::from_config(config);
    let hmr = context.hmr_pipeline.clone().unwrap();
    Orchestrator::builder(Arc::new(Runner::new(context)))
        .pipelines(config.all_pipelines())
        .workers(config.build.workers)
        .hmr(hmr, HmrChannel::new())
        .build()
}

#[tokio::test]
async fn edits_become_hmr_updates_or_reloads() {
    let (dir, config) = project();
    let orch = orchestrator(&config);

    // The declared bundle doubles as the HMR entry.
    assert_eq!(orch.pipelines().len(), 1);

    orch.rebuild_all(BuildReason::Initial);
    orch.wait_idle().await;
    let channel = orch.hmr().unwrap().clone();
    assert_eq!(channel.revision(), 1);

    let (session, mut rx) = channel.connect();
    assert_eq!(rx.try_recv().unwrap(), ServerMessage::Connected { revision: 1 });

    let greet = write(
        dir.path(),
        "src/greet.js",
        "export function greet(name) { return 'welcome ' + name; }\n",
    );
    assert_eq!(orch.file_changed(&greet).len(), 1);
    orch.wait_idle().await;

    assert_eq!(
        rx.try_recv().unwrap(),
        ServerMessage::Update {
            revision: 2,
            changed_modules: vec!["src/greet.js".to_string()],
            removed_modules: Vec::new(),
        }
    );
    assert!(channel.module_code("src/greet.js").unwrap().contains("welcome"));
    channel.ack(session, 2).unwrap();

    // Broken leaf: error goes out, revision stays.
    write(dir.path(), "src/greet.js", "export function greet( {\n");
    orch.file_changed(&greet);
    orch.wait_idle().await;
    assert!(matches!(rx.try_recv().unwrap(), ServerMessage::Error { .. }));
    assert_eq!(channel.revision(), 2);

    // The entry itself changed: no hot path.
    let main = write(dir.path(), "src/main.js", "console.log('standalone');\n");
    orch.file_changed(&main);
    orch.wait_idle().await;
    assert!(matches!(rx.try_recv().unwrap(), ServerMessage::FullReload { .. }));
    assert_eq!(channel.revision(), 3);
}

#[tokio::test]
async fn fixing_a_file_after_a_failed_first_build_rebuilds() {
    let (dir, config) = project();
    let greet = write(dir.path(), "src/greet.js", "export function greet( {\n");
    let orch = orchestrator(&config);
    let id = orch.pipelines()[0].id.clone();

    orch.rebuild_all(BuildReason::Initial);
    orch.wait_idle().await;
    assert_eq!(orch.status(&id), Some(JobStatus::Failed));

    write(
        dir.path(),
        "src/greet.js",
        "export function greet(name) { return 'fixed ' + name; }\n",
    );
    assert_eq!(orch.file_changed(&greet).into_iter().collect::<Vec<_>>(), [id.clone()]);
    orch.wait_idle().await;
    assert_eq!(orch.status(&id), Some(JobStatus::Succeeded));
    assert!(fs::read_to_string(dir.path().join("public/app.js"))
        .unwrap()
        .contains("fixed"));
}

async fn get(addr: SocketAddr, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    let text = String::from_utf8_lossy(&buf).into_owned();
    let status = text[9..12].parse().unwrap();
    let body = text
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

#[tokio::test]
async fn serves_built_output_routes_and_hmr_endpoints() {
    let (_dir, config) = project();
    let orch = orchestrator(&config);
    orch.rebuild_all(BuildReason::Initial);
    orch.wait_idle().await;
    assert_eq!(orch.status(&orch.pipelines()[0].id), Some(JobStatus::Succeeded));

    let dev = config.dev_server.as_ref().unwrap();
    let server = DevServer::new("127.0.0.1", 0, RouteTable::from_spec(dev), orch.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.serve(listener, async move {
        let _ = stopped.await;
    }));

    let (status, body) = get(addr, "/").await;
    assert_eq!(status, 200);
    assert!(body.contains(r#"<script src="/app.js"></script>"#));
    assert!(body.contains(r#"<script src="/__kiln/hmr-client.js"></script>"#));

    let (status, body) = get(addr, "/app.js").await;
    assert_eq!(status, 200);
    assert!(body.contains("hello"));

    let (status, body) = get(addr, "/robots.txt").await;
    assert_eq!(status, 200);
    assert_eq!(body, "User-agent: *\n");

    let (status, body) = get(addr, "/release%20notes.txt").await;
    assert_eq!(status, 200);
    assert_eq!(body, "v1\n");

    let (status, _) = get(addr, "/missing.js").await;
    assert_eq!(status, 404);

    let (status, _) = get(addr, "/..%2fpackage.json").await;
    assert_eq!(status, 404);

    let (status, body) = get(addr, "/__kiln/hmr-client.js").await;
    assert_eq!(status, 200);
    assert!(body.contains("WebSocket"));

    let (status, body) = get(addr, "/__kiln/hmr/module?id=src/greet.js").await;
    assert_eq!(status, 200);
    assert!(body.starts_with("__kiln_hmr.define(\"src/greet.js\""));

    let (status, body) = get(addr, "/__kiln/status").await;
    assert_eq!(status, 200);
    let report: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(report["revision"], 1);
    assert_eq!(report["pipelines"][0]["status"], "succeeded");

    stop.send(()).unwrap();
    handle.await.unwrap().unwrap();
}
