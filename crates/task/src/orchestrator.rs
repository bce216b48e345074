//! Execution orchestrator
//!
//! Per request: `validating → registered → running → {succeeded, failed, cancelled}`.
//! Validation failures never touch the registry. Once registered, the
//! operation always ends with exactly one terminal sink signal followed by
//! removal from the registry, whatever the outcome.
//!
//! Tie-break between cancellation and natural completion: the terminal
//! signal that reaches the sink first wins. A build tool that returns a
//! result is reported as succeeded even if a cancel arrived after it had
//! stopped looking at its token; an error returned while the token is
//! signalled is reported as `Cancelled`.

use crate::build_tool::{BuildTool, Emitter, OperationContext};
use crate::registry::{OperationHandle, OperationRegistry};
use crate::sink::ResultSink;
use gradle_tasks_core::{
    CancelReport, CancellationToken, Error, ErrorKind, OperationKey, OperationState, Reply,
    Result, SOURCE_DIR_ERROR_PREFIX,
};
use gradle_tasks_utils::{operation_finished, operation_span, operation_started};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Request to fetch a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetProjectRequest {
    pub source_dir: String,
}

/// Request to run a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTaskRequest {
    pub source_dir: String,
    pub task: String,
    pub args: Vec<String>,
}

enum Job {
    Project,
    Task { task: String, args: Vec<String> },
}

/// A validated operation holding its registry entry.
///
/// Admission registers synchronously, so a cancel issued right after it
/// always finds the operation. Dropping an admission that never ran
/// resolves it as cancelled and frees the entry.
pub struct Admission {
    registry: Arc<OperationRegistry>,
    handle: OperationHandle,
    source_dir: PathBuf,
    job: Job,
}

impl Admission {
    pub fn id(&self) -> u64 {
        self.handle.id()
    }

    pub fn key(&self) -> &OperationKey {
        self.handle.key()
    }

    pub fn token(&self) -> &CancellationToken {
        self.handle.token()
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        if self.registry.finish(&self.handle, OperationState::Cancelled) {
            tracing::debug!(
                operation_id = self.handle.id(),
                "Operation dropped before it finished"
            );
        }
    }
}

/// Public entry point for starting and cancelling operations
pub struct Orchestrator {
    registry: Arc<OperationRegistry>,
    tool: Arc<dyn BuildTool>,
}

impl Orchestrator {
    pub fn new(tool: Arc<dyn BuildTool>) -> Self {
        Self::with_registry(Arc::new(OperationRegistry::new()), tool)
    }

    pub fn with_registry(registry: Arc<OperationRegistry>, tool: Arc<dyn BuildTool>) -> Self {
        Self { registry, tool }
    }

    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// Validate and register a project fetch without starting it
    pub fn admit_project(&self, request: GetProjectRequest) -> Result<Admission> {
        let source_dir = validate_source_dir(&request.source_dir)?;
        let key = OperationKey::project(normalize_source_dir(&request.source_dir));
        Ok(self.admit(key, source_dir, Job::Project))
    }

    /// Validate and register a task run without starting it
    pub fn admit_task(&self, request: RunTaskRequest) -> Result<Admission> {
        let source_dir = validate_source_dir(&request.source_dir)?;
        let key = OperationKey::task(normalize_source_dir(&request.source_dir), &*request.task);
        let job = Job::Task {
            task: request.task,
            args: request.args,
        };
        Ok(self.admit(key, source_dir, job))
    }

    fn admit(&self, key: OperationKey, source_dir: PathBuf, job: Job) -> Admission {
        Admission {
            registry: Arc::clone(&self.registry),
            handle: self.registry.register(key),
            source_dir,
            job,
        }
    }

    /// Fetch a project, streaming replies into `sink` until one terminal signal
    pub async fn get_project(
        &self,
        request: GetProjectRequest,
        sink: Arc<dyn ResultSink<Reply>>,
    ) -> OperationState {
        match self.admit_project(request) {
            Ok(admission) => self.run(admission, sink).await,
            Err(e) => reject(sink.as_ref(), e).await,
        }
    }

    /// Run a task, streaming replies into `sink` until one terminal signal
    pub async fn run_task(
        &self,
        request: RunTaskRequest,
        sink: Arc<dyn ResultSink<Reply>>,
    ) -> OperationState {
        match self.admit_task(request) {
            Ok(admission) => self.run(admission, sink).await,
            Err(e) => reject(sink.as_ref(), e).await,
        }
    }

    /// Drive an admitted operation to its single terminal signal
    pub async fn run(
        &self,
        admission: Admission,
        sink: Arc<dyn ResultSink<Reply>>,
    ) -> OperationState {
        let span = operation_span(admission.key(), admission.id());
        self.drive(&admission, sink).instrument(span).await
    }

    /// Signal every run of `task` in `source_dir`. Never fails.
    pub fn cancel_run_task(&self, source_dir: &str, task: &str) -> CancelReport {
        let key = OperationKey::task(normalize_source_dir(source_dir), task);
        CancelReport::new(self.registry.cancel_by_key(&key))
    }

    /// Signal every running task. Never fails.
    pub fn cancel_run_tasks(&self) -> CancelReport {
        CancelReport::new(self.registry.cancel_all(OperationKey::is_task))
    }

    /// Signal every running project fetch. Never fails.
    pub fn cancel_get_projects(&self) -> CancelReport {
        CancelReport::new(self.registry.cancel_all(OperationKey::is_project))
    }

    /// Signal everything in flight, used on shutdown
    pub fn cancel_everything(&self) -> CancelReport {
        CancelReport::new(self.registry.cancel_all(|_| true))
    }

    async fn drive(
        &self,
        admission: &Admission,
        sink: Arc<dyn ResultSink<Reply>>,
    ) -> OperationState {
        let handle = &admission.handle;
        let started = Instant::now();
        operation_started(handle.key(), handle.id());

        let token = handle.token().clone();
        let ctx = OperationContext::new(
            admission.source_dir.clone(),
            token.clone(),
            Emitter::new(Arc::clone(&sink), token.clone()),
        );

        let result = if token.is_cancelled() {
            Err(Error::cancelled(cancelled_message(handle.key())))
        } else {
            let work = self.run_job(&ctx, &admission.job);
            tokio::pin!(work);

            let mut caller_gone = false;
            loop {
                tokio::select! {
                    biased;
                    result = &mut work => break result,
                    _ = sink.closed(), if !caller_gone => {
                        caller_gone = true;
                        tracing::debug!("Caller stream closed, cancelling operation");
                        token.signal();
                    }
                }
            }
        };

        let state = self.settle(handle, sink.as_ref(), result).await;
        operation_finished(handle.key(), handle.id(), state, millis(started.elapsed()));
        state
    }

    async fn run_job(&self, ctx: &OperationContext, job: &Job) -> Result<Reply> {
        match job {
            Job::Project => self.tool.get_project(ctx).await.map(Reply::Project),
            Job::Task { task, args } => self
                .tool
                .run_task(ctx, task, args)
                .await
                .map(Reply::TaskResult),
        }
    }

    /// Send the single terminal signal, then deregister
    async fn settle(
        &self,
        handle: &OperationHandle,
        sink: &dyn ResultSink<Reply>,
        result: Result<Reply>,
    ) -> OperationState {
        let state = match result {
            Ok(reply) => {
                if let Err(e) = sink.send(reply).await {
                    tracing::debug!(error = %e, "Final reply not delivered");
                }
                sink.complete().await;
                OperationState::Completed
            }
            Err(e) => {
                let (kind, message) = if e.is_cancelled() || handle.token().is_cancelled() {
                    let message = if e.is_cancelled() {
                        e.to_string()
                    } else {
                        cancelled_message(handle.key())
                    };
                    (ErrorKind::Cancelled, message)
                } else {
                    (e.kind(), e.to_string())
                };
                if kind != ErrorKind::Cancelled {
                    tracing::error!(error = %message, kind = %kind, "Operation failed");
                }
                sink.fail(kind, message).await;
                if kind == ErrorKind::Cancelled {
                    OperationState::Cancelled
                } else {
                    OperationState::Failed
                }
            }
        };

        if !self.registry.finish(handle, state) {
            tracing::warn!(
                kind = %ErrorKind::InternalInconsistency,
                operation_id = handle.id(),
                "Operation was already resolved"
            );
        }
        state
    }
}

fn cancelled_message(key: &OperationKey) -> String {
    match key.task_name() {
        Some(task) => format!("Task cancelled: {task}"),
        None => format!("Get project cancelled: {}", key.source_dir()),
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Check that the requested source directory exists
pub fn validate_source_dir(source_dir: &str) -> Result<PathBuf> {
    let path = PathBuf::from(source_dir.trim());
    if source_dir.trim().is_empty() || !path.exists() {
        return Err(Error::invalid_argument(format!(
            "{SOURCE_DIR_ERROR_PREFIX}{source_dir}"
        )));
    }
    Ok(path)
}

/// Canonical spelling of a source directory for operation keys.
///
/// Trailing and repeated separators and inner `.` segments are dropped, so
/// `/work/app/` and `/work//app` name the same operation as `/work/app`.
/// Symlinks and `..` are left alone.
pub fn normalize_source_dir(source_dir: &str) -> String {
    Path::new(source_dir.trim())
        .components()
        .collect::<PathBuf>()
        .display()
        .to_string()
}

async fn reject(sink: &dyn ResultSink<Reply>, error: Error) -> OperationState {
    tracing::error!(error = %error, "Rejected request");
    sink.fail(error.kind(), error.to_string()).await;
    OperationState::Failed
}
