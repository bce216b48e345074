//! Integration tests for the orchestrator and operation registry
use async_trait::async_trait;
use gradle_tasks_core::{
    Error, ErrorKind, OperationKey, OperationState, ProjectSummary, Reply, Result, TaskSummary,
};
use gradle_tasks_task::{
    channel, BuildTool, GetProjectRequest, OperationContext, Orchestrator, ResultSink,
    RunTaskRequest, StreamEvent,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Fake build tool whose behaviour is picked by task name
struct ScriptedTool {
    block_projects: bool,
}

#[async_trait]
impl BuildTool for ScriptedTool {
    async fn get_project(&self, ctx: &OperationContext) -> Result<ProjectSummary> {
        ctx.emit(Reply::progress("Configure project")).await;
        if self.block_projects {
            ctx.token().cancelled().await;
            return Err(Error::cancelled(format!(
                "Get project cancelled: {}",
                ctx.source_dir().display()
            )));
        }
        Ok(ProjectSummary {
            source_dir: ctx.source_dir().display().to_string(),
            exit_code: 0,
        })
    }

    async fn run_task(
        &self,
        ctx: &OperationContext,
        task: &str,
        args: &[String],
    ) -> Result<TaskSummary> {
        ctx.emit(Reply::stdout(format!("> Task :{task}"))).await;
        match task {
            "wait" => {
                ctx.token().cancelled().await;
                return Err(Error::cancelled(format!("Task cancelled: {task}")));
            }
            "fail" => return Err(Error::execution_failed("boom")),
            "fail-on-cancel" => {
                ctx.token().cancelled().await;
                return Err(Error::execution_failed("daemon went away"));
            }
            "deaf" => tokio::time::sleep(Duration::from_millis(150)).await,
            _ => {}
        }
        Ok(TaskSummary {
            source_dir: ctx.source_dir().display().to_string(),
            task: task.to_string(),
            args: args.to_vec(),
            exit_code: 0,
        })
    }
}

/// Counts how often the orchestrator actually reaches the build tool
#[derive(Default)]
struct CountingTool {
    calls: AtomicUsize,
}

#[async_trait]
impl BuildTool for CountingTool {
    async fn get_project(&self, ctx: &OperationContext) -> Result<ProjectSummary> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProjectSummary {
            source_dir: ctx.source_dir().display().to_string(),
            exit_code: 0,
        })
    }

    async fn run_task(
        &self,
        ctx: &OperationContext,
        task: &str,
        args: &[String],
    ) -> Result<TaskSummary> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TaskSummary {
            source_dir: ctx.source_dir().display().to_string(),
            task: task.to_string(),
            args: args.to_vec(),
            exit_code: 0,
        })
    }
}

fn orchestrator(block_projects: bool) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(Arc::new(ScriptedTool { block_projects })))
}

type Events = mpsc::Receiver<StreamEvent<Reply>>;

fn spawn_task(
    orchestrator: &Arc<Orchestrator>,
    source_dir: &str,
    task: &str,
) -> (JoinHandle<OperationState>, Events) {
    let (sink, events) = channel::<Reply>(64);
    let sink: Arc<dyn ResultSink<Reply>> = Arc::new(sink);
    let orchestrator = Arc::clone(orchestrator);
    let request = RunTaskRequest {
        source_dir: source_dir.to_string(),
        task: task.to_string(),
        args: vec!["--stacktrace".to_string()],
    };
    let handle = tokio::spawn(async move { orchestrator.run_task(request, sink).await });
    (handle, events)
}

fn spawn_project(
    orchestrator: &Arc<Orchestrator>,
    source_dir: &str,
) -> (JoinHandle<OperationState>, Events) {
    let (sink, events) = channel::<Reply>(64);
    let sink: Arc<dyn ResultSink<Reply>> = Arc::new(sink);
    let orchestrator = Arc::clone(orchestrator);
    let request = GetProjectRequest {
        source_dir: source_dir.to_string(),
    };
    let handle = tokio::spawn(async move { orchestrator.get_project(request, sink).await });
    (handle, events)
}

async fn wait_for_registered(orchestrator: &Orchestrator, count: usize) {
    for _ in 0..200 {
        if orchestrator.registry().len() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "expected {count} registered operations, found {:?}",
        orchestrator.registry().snapshot()
    );
}

async fn finish(handle: JoinHandle<OperationState>) -> OperationState {
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("operation did not finish")
        .unwrap()
}

/// Drain a finished operation's stream and check it ends with one terminal event
async fn collect(mut events: Events) -> (Vec<Reply>, StreamEvent<Reply>) {
    let mut replies = Vec::new();
    let mut terminal = None;
    while let Some(event) = events.recv().await {
        match event {
            StreamEvent::Item(reply) => {
                assert!(terminal.is_none(), "item after terminal signal");
                replies.push(reply);
            }
            other => {
                assert!(terminal.is_none(), "second terminal signal: {other:?}");
                terminal = Some(other);
            }
        }
    }
    (replies, terminal.expect("no terminal signal"))
}

fn dir_string(dir: &TempDir) -> String {
    dir.path().display().to_string()
}

#[tokio::test]
async fn test_run_task_succeeds_and_deregisters() {
    let temp_dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(false);

    let (handle, events) = spawn_task(&orchestrator, &dir_string(&temp_dir), "build");
    assert_eq!(finish(handle).await, OperationState::Completed);

    let (replies, terminal) = collect(events).await;
    assert_eq!(terminal, StreamEvent::Completed);
    assert_eq!(replies[0], Reply::stdout("> Task :build"));
    match &replies[1] {
        Reply::TaskResult(summary) => {
            assert_eq!(summary.task, "build");
            assert_eq!(summary.args, vec!["--stacktrace"]);
        }
        other => panic!("unexpected final reply {other:?}"),
    }
    assert!(orchestrator.registry().snapshot().is_empty());
}

#[tokio::test]
async fn test_missing_directory_is_rejected_without_registering() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("missing").display().to_string();
    let orchestrator = orchestrator(false);

    let (handle, events) = spawn_project(&orchestrator, &missing);
    assert_eq!(finish(handle).await, OperationState::Failed);

    let (replies, terminal) = collect(events).await;
    assert!(replies.is_empty());
    assert_eq!(
        terminal,
        StreamEvent::Failed {
            kind: ErrorKind::InvalidArgument,
            message: format!("Source directory does not exist: {missing}"),
        }
    );
    assert!(orchestrator.registry().is_empty());
}

#[tokio::test]
async fn test_cancel_run_task_ends_with_cancelled() {
    let temp_dir = TempDir::new().unwrap();
    let source_dir = dir_string(&temp_dir);
    let orchestrator = orchestrator(false);

    let (handle, events) = spawn_task(&orchestrator, &source_dir, "wait");
    wait_for_registered(&orchestrator, 1).await;
    assert_eq!(
        orchestrator.registry().snapshot(),
        vec![OperationKey::task(source_dir.as_str(), "wait")]
    );

    let report = orchestrator.cancel_run_task(&source_dir, "wait");
    assert_eq!(report.signalled, 1);
    assert_eq!(finish(handle).await, OperationState::Cancelled);

    let (_, terminal) = collect(events).await;
    assert_eq!(
        terminal,
        StreamEvent::Failed {
            kind: ErrorKind::Cancelled,
            message: "Task cancelled: wait".to_string(),
        }
    );
    assert!(orchestrator.registry().is_empty());
}

#[tokio::test]
async fn test_identical_requests_are_cancelled_together() {
    let temp_dir = TempDir::new().unwrap();
    let source_dir = dir_string(&temp_dir);
    let orchestrator = orchestrator(false);

    let (first, first_events) = spawn_task(&orchestrator, &source_dir, "wait");
    let (second, second_events) = spawn_task(&orchestrator, &source_dir, "wait");
    wait_for_registered(&orchestrator, 2).await;

    let report = orchestrator.cancel_run_task(&source_dir, "wait");
    assert_eq!(report.signalled, 2);
    assert_eq!(report.message, "Cancel requested for 2 operation(s)");

    assert_eq!(finish(first).await, OperationState::Cancelled);
    assert_eq!(finish(second).await, OperationState::Cancelled);
    for events in [first_events, second_events] {
        let (_, terminal) = collect(events).await;
        assert!(matches!(
            terminal,
            StreamEvent::Failed {
                kind: ErrorKind::Cancelled,
                ..
            }
        ));
    }
    assert!(orchestrator.registry().is_empty());
}

#[tokio::test]
async fn test_cancel_run_task_ignores_other_keys() {
    let temp_dir = TempDir::new().unwrap();
    let source_dir = dir_string(&temp_dir);
    let orchestrator = orchestrator(false);

    let (handle, _events) = spawn_task(&orchestrator, &source_dir, "wait");
    wait_for_registered(&orchestrator, 1).await;

    let report = orchestrator.cancel_run_task(&source_dir, "other");
    assert_eq!(report.signalled, 0);
    assert_eq!(report.message, "No matching operations running");
    assert!(!report.was_running());
    assert_eq!(orchestrator.registry().len(), 1);

    orchestrator.cancel_run_task(&source_dir, "wait");
    assert_eq!(finish(handle).await, OperationState::Cancelled);
}

#[tokio::test]
async fn test_bulk_cancels_respect_operation_kind() {
    let dirs: Vec<TempDir> = (0..3).map(|_| TempDir::new().unwrap()).collect();
    let orchestrator = orchestrator(true);

    let mut tasks = Vec::new();
    for dir in &dirs {
        tasks.push(spawn_task(&orchestrator, &dir_string(dir), "wait"));
    }
    let (project, project_events) = spawn_project(&orchestrator, &dir_string(&dirs[0]));
    wait_for_registered(&orchestrator, 4).await;

    let report = orchestrator.cancel_run_tasks();
    assert_eq!(report.signalled, 3);
    for (handle, _) in tasks {
        assert_eq!(finish(handle).await, OperationState::Cancelled);
    }
    assert_eq!(
        orchestrator.registry().snapshot(),
        vec![OperationKey::project(dir_string(&dirs[0]))]
    );

    let report = orchestrator.cancel_get_projects();
    assert_eq!(report.signalled, 1);
    assert_eq!(finish(project).await, OperationState::Cancelled);
    let (replies, terminal) = collect(project_events).await;
    assert_eq!(replies, vec![Reply::progress("Configure project")]);
    assert!(matches!(
        terminal,
        StreamEvent::Failed {
            kind: ErrorKind::Cancelled,
            ..
        }
    ));
    assert!(orchestrator.registry().is_empty());
}

#[tokio::test]
async fn test_cancel_with_nothing_registered_is_a_noop() {
    let orchestrator = orchestrator(false);
    assert_eq!(orchestrator.cancel_run_tasks().signalled, 0);
    assert_eq!(orchestrator.cancel_get_projects().signalled, 0);
    assert_eq!(orchestrator.cancel_run_task("/nowhere", "build").signalled, 0);
    assert!(orchestrator.registry().is_empty());
}

#[tokio::test]
async fn test_execution_failure_is_classified() {
    let temp_dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(false);

    let (handle, events) = spawn_task(&orchestrator, &dir_string(&temp_dir), "fail");
    assert_eq!(finish(handle).await, OperationState::Failed);

    let (_, terminal) = collect(events).await;
    assert_eq!(
        terminal,
        StreamEvent::Failed {
            kind: ErrorKind::ExecutionFailed,
            message: "boom".to_string(),
        }
    );
    assert!(orchestrator.registry().is_empty());
}

#[tokio::test]
async fn test_error_after_cancel_reports_cancelled() {
    let temp_dir = TempDir::new().unwrap();
    let source_dir = dir_string(&temp_dir);
    let orchestrator = orchestrator(false);

    let (handle, events) = spawn_task(&orchestrator, &source_dir, "fail-on-cancel");
    wait_for_registered(&orchestrator, 1).await;
    orchestrator.cancel_run_task(&source_dir, "fail-on-cancel");

    assert_eq!(finish(handle).await, OperationState::Cancelled);
    let (_, terminal) = collect(events).await;
    assert_eq!(
        terminal,
        StreamEvent::Failed {
            kind: ErrorKind::Cancelled,
            message: "Task cancelled: fail-on-cancel".to_string(),
        }
    );
}

#[tokio::test]
async fn test_result_that_ignores_token_still_completes() {
    let temp_dir = TempDir::new().unwrap();
    let source_dir = dir_string(&temp_dir);
    let orchestrator = orchestrator(false);

    let (handle, events) = spawn_task(&orchestrator, &source_dir, "deaf");
    wait_for_registered(&orchestrator, 1).await;
    assert_eq!(orchestrator.cancel_run_task(&source_dir, "deaf").signalled, 1);

    assert_eq!(finish(handle).await, OperationState::Completed);
    let (_, terminal) = collect(events).await;
    assert_eq!(terminal, StreamEvent::Completed);
    assert!(orchestrator.registry().is_empty());
}

#[tokio::test]
async fn test_dropped_caller_cancels_its_operation() {
    let temp_dir = TempDir::new().unwrap();
    let source_dir = dir_string(&temp_dir);
    let orchestrator = orchestrator(false);

    let (gone, gone_events) = spawn_task(&orchestrator, &source_dir, "wait");
    let (kept, kept_events) = spawn_task(&orchestrator, &source_dir, "wait");
    wait_for_registered(&orchestrator, 2).await;

    drop(gone_events);
    assert_eq!(finish(gone).await, OperationState::Cancelled);
    assert_eq!(orchestrator.registry().len(), 1);
    assert!(!kept.is_finished());

    orchestrator.cancel_run_tasks();
    assert_eq!(finish(kept).await, OperationState::Cancelled);
    let (_, terminal) = collect(kept_events).await;
    assert!(matches!(
        terminal,
        StreamEvent::Failed {
            kind: ErrorKind::Cancelled,
            ..
        }
    ));
}

#[tokio::test]
async fn test_many_concurrent_operations_all_deregister() {
    let temp_dir = TempDir::new().unwrap();
    let source_dir = dir_string(&temp_dir);
    let orchestrator = orchestrator(false);

    let mut running = Vec::new();
    for i in 0..32 {
        let task = if i % 2 == 0 { "wait" } else { "build" };
        running.push(spawn_task(&orchestrator, &source_dir, task));
    }

    for _ in 0..200 {
        if orchestrator.registry().len() == 16 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let report = orchestrator.cancel_run_task(&source_dir, "wait");
    assert_eq!(report.signalled, 16);

    for (handle, events) in running {
        let state = finish(handle).await;
        assert!(state.is_terminal());
        collect(events).await;
    }
    assert!(orchestrator.registry().is_empty());
}

#[tokio::test]
async fn test_cancel_before_run_never_reaches_build_tool() {
    let temp_dir = TempDir::new().unwrap();
    let source_dir = dir_string(&temp_dir);
    let tool = Arc::new(CountingTool::default());
    let orchestrator = Orchestrator::new(Arc::clone(&tool) as Arc<dyn BuildTool>);

    let admission = orchestrator
        .admit_task(RunTaskRequest {
            source_dir: source_dir.clone(),
            task: "build".to_string(),
            args: Vec::new(),
        })
        .unwrap();
    assert_eq!(orchestrator.registry().len(), 1);
    assert_eq!(orchestrator.cancel_run_task(&source_dir, "build").signalled, 1);

    let (sink, events) = channel::<Reply>(8);
    let state = orchestrator.run(admission, Arc::new(sink)).await;
    assert_eq!(state, OperationState::Cancelled);
    assert_eq!(tool.calls.load(Ordering::SeqCst), 0);

    let (replies, terminal) = collect(events).await;
    assert!(replies.is_empty());
    assert_eq!(
        terminal,
        StreamEvent::Failed {
            kind: ErrorKind::Cancelled,
            message: "Task cancelled: build".to_string(),
        }
    );
    assert!(orchestrator.registry().is_empty());
}

#[tokio::test]
async fn test_dropped_admission_frees_its_entry() {
    let temp_dir = TempDir::new().unwrap();
    let tool = Arc::new(CountingTool::default());
    let orchestrator = Orchestrator::new(Arc::clone(&tool) as Arc<dyn BuildTool>);

    let admission = orchestrator
        .admit_project(GetProjectRequest {
            source_dir: dir_string(&temp_dir),
        })
        .unwrap();
    assert_eq!(
        admission.key(),
        &OperationKey::project(dir_string(&temp_dir))
    );
    drop(admission);

    assert!(orchestrator.registry().is_empty());
    assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_matches_differently_spelled_source_dir() {
    let temp_dir = TempDir::new().unwrap();
    let source_dir = dir_string(&temp_dir);
    let orchestrator = orchestrator(false);

    let (handle, events) = spawn_task(&orchestrator, &format!("{source_dir}/"), "wait");
    wait_for_registered(&orchestrator, 1).await;
    assert_eq!(
        orchestrator.registry().snapshot(),
        vec![OperationKey::task(source_dir.as_str(), "wait")]
    );

    let report = orchestrator.cancel_run_task(&format!("{source_dir}/."), "wait");
    assert_eq!(report.signalled, 1);
    assert_eq!(finish(handle).await, OperationState::Cancelled);
    collect(events).await;
    assert!(orchestrator.registry().is_empty());
}
