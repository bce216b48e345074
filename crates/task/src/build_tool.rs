//! Contract between the orchestrator and the build tool that does the work

use crate::sink::{ResultSink, SinkError};
use async_trait::async_trait;
use gradle_tasks_core::{CancellationToken, ProjectSummary, Reply, Result, TaskSummary};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Forwards replies from the build tool to the caller's sink.
///
/// If the caller has gone away the operation's token is signalled, so a
/// disconnected client cancels its own operation and nothing else.
#[derive(Clone)]
pub struct Emitter {
    sink: Arc<dyn ResultSink<Reply>>,
    token: CancellationToken,
}

impl Emitter {
    pub fn new(sink: Arc<dyn ResultSink<Reply>>, token: CancellationToken) -> Self {
        Self { sink, token }
    }

    /// Send one reply. Returns `false` when it could not be delivered.
    pub async fn emit(&self, reply: Reply) -> bool {
        match self.sink.send(reply).await {
            Ok(()) => true,
            Err(SinkError::Disconnected) => {
                tracing::debug!("Caller disconnected, cancelling operation");
                self.token.signal();
                false
            }
            Err(SinkError::Finalized) => false,
        }
    }
}

/// Everything a build tool needs to run one operation
#[derive(Clone)]
pub struct OperationContext {
    source_dir: PathBuf,
    token: CancellationToken,
    emitter: Emitter,
}

impl OperationContext {
    pub fn new(source_dir: PathBuf, token: CancellationToken, emitter: Emitter) -> Self {
        Self {
            source_dir,
            token,
            emitter,
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Poll or await this to stop early
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn emit(&self, reply: Reply) -> bool {
        self.emitter.emit(reply).await
    }
}

/// The external build tool.
///
/// Implementations are expected to observe [`OperationContext::token`] and
/// return [`gradle_tasks_core::Error::Cancelled`] promptly once it is signalled.
/// Cancellation is cooperative: nothing forcibly stops an implementation
/// that ignores the token.
#[async_trait]
pub trait BuildTool: Send + Sync {
    /// Fetch the project rooted at the context's source directory
    async fn get_project(&self, ctx: &OperationContext) -> Result<ProjectSummary>;

    /// Run `task` with `args` in the context's source directory
    async fn run_task(
        &self,
        ctx: &OperationContext,
        task: &str,
        args: &[String],
    ) -> Result<TaskSummary>;
}
