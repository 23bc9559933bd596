//! End-to-end: project host talking to a fake tooling daemon over a Unix socket.

mod common;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

use tandem_core::{
    DocumentEvent, EditorId, EditorRef, FailureKind, InitFailure, InitOutcome, InitResult,
    ModuleInfo, Pid, TandemConfig, Workbench, WorkspaceModel,
};
use tandem_daemon::{
    request_status, DaemonError, DaemonRequest, DaemonResponse, InMemoryProjectModel,
    InitOptions, InitState, ProcfsMonitor, ProjectHost, SocketBinder,
};

use common::{eventually, workbench, Calls, NoEditors, RecordingMonitor};

/// Answers every protocol command and records what it was asked.
struct FakeDaemon {
    socket: PathBuf,
    seen: Arc<Mutex<Vec<String>>>,
}

impl FakeDaemon {
    fn spawn(dir: &Path) -> Self {
        let socket = dir.join("tooling.sock");
        let listener = UnixListener::bind(&socket).expect("bind fake daemon");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let started = Arc::new(Mutex::new(false));

        let log = seen.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let log = log.clone();
                let started = started.clone();
                tokio::spawn(async move {
                    let (reader, mut writer) = stream.into_split();
                    let mut lines = BufReader::new(reader).lines();
                    let Ok(Some(line)) = lines.next_line().await else {
                        return;
                    };
                    let request: DaemonRequest = serde_json::from_str(&line).expect("request");
                    log.lock().unwrap().push(request.cmd.clone());

                    let response = match request.cmd.as_str() {
                        "status" => DaemonResponse::ok(json!({
                            "tooling_started": *started.lock().unwrap(),
                            "build_in_progress": false,
                        })),
                        "start_tooling" => {
                            *started.lock().unwrap() = true;
                            DaemonResponse::ok(json!({ "pid": 4242 }))
                        }
                        "metadata" => DaemonResponse::ok(json!({ "pid": 4242 })),
                        "initialize" => {
                            let init = request.request.expect("initialize payload");
                            let result = InitResult::success(Some(WorkspaceModel {
                                root: init.project_dir,
                                modules: vec![ModuleInfo {
                                    path: ":app".into(),
                                    variants: vec!["debug".into(), "release".into()],
                                    selected: Some("debug".into()),
                                }],
                            }));
                            DaemonResponse::ok(serde_json::to_value(result).unwrap())
                        }
                        other => DaemonResponse::error(format!("unknown command: {other}")),
                    };
                    let mut payload = serde_json::to_string(&response).unwrap();
                    payload.push('\n');
                    let _ = writer.write_all(payload.as_bytes()).await;
                });
            }
        });

        Self { socket, seen }
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

fn host(project_dir: &Path, socket: &Path, proc_root: &Path, calls: &Calls) -> ProjectHost {
    ProjectHost::new(
        workbench(project_dir, calls),
        Arc::new(SocketBinder::new(socket)),
        Arc::new(InMemoryProjectModel::new()),
        Arc::new(ProcfsMonitor::with_root(proc_root)),
        &TandemConfig::default(),
    )
}

#[tokio::test]
async fn opens_a_project_through_the_daemon() {
    let tmp = tempfile::tempdir().unwrap();
    let project = tmp.path().join("app");
    std::fs::create_dir(&project).unwrap();
    let daemon = FakeDaemon::spawn(tmp.path());
    let calls = Calls::default();
    let host = host(&project, &daemon.socket, tmp.path(), &calls);

    let outcome = host.open(InitOptions::fresh()).await;

    let InitOutcome::Success(result) = outcome else {
        panic!("expected success, got {outcome:?}");
    };
    assert_eq!(result.workspace.as_ref().map(|w| w.modules.len()), Some(1));
    assert_eq!(host.orchestrator().state(), InitState::Initialized);
    assert_eq!(
        host.orchestrator().session().map(|s| s.pid()),
        Some(Pid(4242))
    );
    assert_eq!(
        daemon.seen().iter().filter(|c| *c == "initialize").count(),
        1
    );
    assert!(daemon.seen().starts_with(&["status".to_string(), "start_tooling".to_string()]));

    let (initialized, variant) = host
        .context()
        .run(|wb| {
            (
                wb.project.initialized,
                wb.variants.effective().get(":app").cloned(),
            )
        })
        .await
        .unwrap();
    assert!(initialized);
    assert_eq!(variant.as_deref(), Some("debug"));
    assert!(calls.all().contains(&"status:Project initialized".to_string()));
    assert!(calls.all().contains(&"build:true".to_string()));
    assert!(calls.all().contains(&"build:false".to_string()));

    let editor = Arc::new(EditorRef::new(EditorId(1)));
    let dispatcher = host.dispatcher_for(&editor);
    let mut events = dispatcher.subscribe();
    let main_rs = project.join("main.rs");
    dispatcher.dispatch(DocumentEvent::open(&main_rs)).unwrap();
    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event in time")
        .expect("event");
    assert_eq!(event, DocumentEvent::open(&main_rs));
    assert!(host.files().is_open(&main_rs).await);
    dispatcher.destroy("editor closed").await;

    let state = host.teardown().await.unwrap();
    assert_eq!(host.orchestrator().state(), InitState::Idle);
    assert!(state.initialized, "teardown keeps the resumption point");
    assert!(!state.initializing);
    assert!(!state.build_in_progress);
    assert!(state.resumable_result().is_some());
}

#[tokio::test]
async fn recreated_host_resumes_without_reinitializing() {
    let tmp = tempfile::tempdir().unwrap();
    let project = tmp.path().join("app");
    std::fs::create_dir(&project).unwrap();
    let daemon = FakeDaemon::spawn(tmp.path());
    let calls = Calls::default();

    let first = host(&project, &daemon.socket, tmp.path(), &calls);
    let InitOutcome::Success(initial) = first.open(InitOptions::fresh()).await else {
        panic!("first open failed");
    };
    let saved = first.teardown().await.unwrap();
    drop(first);

    let recreated = ProjectHost::new(
        Workbench::new(saved, Box::new(calls.clone()), Box::new(NoEditors)),
        Arc::new(SocketBinder::new(&daemon.socket)),
        Arc::new(InMemoryProjectModel::new()),
        Arc::new(ProcfsMonitor::with_root(tmp.path())),
        &TandemConfig::default(),
    );
    let outcome = recreated.open(InitOptions::resume()).await;

    assert_eq!(outcome, InitOutcome::Success(initial));
    assert_eq!(recreated.orchestrator().state(), InitState::Initialized);
    assert_eq!(
        daemon.seen().iter().filter(|c| *c == "initialize").count(),
        1,
        "resume must not send a second initialize"
    );
    recreated.teardown().await.unwrap();
}

#[tokio::test]
async fn memory_sampler_runs_until_teardown() {
    let tmp = tempfile::tempdir().unwrap();
    let calls = Calls::default();
    let monitor = Arc::new(RecordingMonitor::default());
    let mut config = TandemConfig::default();
    config.tooling.sample_interval_ms = 10;

    let host = ProjectHost::new(
        workbench(tmp.path(), &calls),
        Arc::new(SocketBinder::new(tmp.path().join("absent.sock"))),
        Arc::new(InMemoryProjectModel::new()),
        monitor.clone(),
        &config,
    );
    assert!(eventually(Duration::from_secs(2), || monitor.samples() >= 3).await);

    host.teardown().await.unwrap();
    let stopped_at = monitor.samples();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(monitor.samples(), stopped_at, "sampler stopped with the host");
}

#[tokio::test]
async fn missing_socket_means_service_unavailable() {
    let tmp = tempfile::tempdir().unwrap();
    let calls = Calls::default();
    let host = host(tmp.path(), &tmp.path().join("absent.sock"), tmp.path(), &calls);

    let outcome = host.open(InitOptions::fresh()).await;

    assert!(
        matches!(
            outcome,
            InitOutcome::Failure(InitFailure::ServiceUnavailable(_))
        ),
        "got {outcome:?}"
    );
    assert_eq!(host.orchestrator().state(), InitState::Failed);
    assert_eq!(calls.with_prefix("error:").len(), 1);
}

#[tokio::test]
async fn missing_project_dir_is_rejected_before_initialize() {
    let tmp = tempfile::tempdir().unwrap();
    let daemon = FakeDaemon::spawn(tmp.path());
    let calls = Calls::default();
    let host = host(&tmp.path().join("gone"), &daemon.socket, tmp.path(), &calls);

    let outcome = host.open(InitOptions::fresh()).await;

    assert_eq!(
        outcome.failure().and_then(InitFailure::kind),
        Some(FailureKind::NotFound)
    );
    assert!(!daemon.seen().contains(&"initialize".to_string()));
    host.teardown().await.unwrap();
}

#[tokio::test]
async fn status_reports_daemon_not_running() {
    let tmp = tempfile::tempdir().unwrap();
    let err = request_status(&tmp.path().join("nope.sock"))
        .await
        .unwrap_err();
    assert!(matches!(err, DaemonError::DaemonNotRunning { .. }), "got {err}");
}
