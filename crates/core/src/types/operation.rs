use serde::{Deserialize, Serialize};
use std::fmt;

/// The two families of long-running operations a client can start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    /// Fetch the project model for a source directory
    GetProject,
    /// Run a build task in a source directory
    RunTask,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::GetProject => f.write_str("getProject"),
            OperationKind::RunTask => f.write_str("runTask"),
        }
    }
}

/// Immutable identity of an operation for cancellation purposes.
///
/// Project fetches are keyed by source directory alone; task runs add the
/// task name. Task arguments are deliberately not part of the key so that a
/// cancel request naming only the directory and task reaches every run of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationKey {
    kind: OperationKind,
    source_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    task: Option<String>,
}

impl OperationKey {
    /// Key for a project fetch
    pub fn project(source_dir: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::GetProject,
            source_dir: source_dir.into(),
            task: None,
        }
    }

    /// Key for a task run
    pub fn task(source_dir: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::RunTask,
            source_dir: source_dir.into(),
            task: Some(task.into()),
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn source_dir(&self) -> &str {
        &self.source_dir
    }

    pub fn task_name(&self) -> Option<&str> {
        self.task.as_deref()
    }

    pub fn is_project(&self) -> bool {
        self.kind == OperationKind::GetProject
    }

    pub fn is_task(&self) -> bool {
        self.kind == OperationKind::RunTask
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.task {
            Some(task) => write!(f, "{}({}, {})", self.kind, self.source_dir, task),
            None => write!(f, "{}({})", self.kind, self.source_dir),
        }
    }
}

/// Completion state of a registered operation.
///
/// `Pending` is the only non-terminal state; an operation leaves it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationState {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl OperationState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, OperationState::Pending)
    }

    /// Compact encoding for atomic storage
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            OperationState::Pending => 0,
            OperationState::Completed => 1,
            OperationState::Failed => 2,
            OperationState::Cancelled => 3,
        }
    }

    /// Decode from [`OperationState::as_u8`]; unknown values read as `Failed`
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => OperationState::Pending,
            1 => OperationState::Completed,
            3 => OperationState::Cancelled,
            _ => OperationState::Failed,
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationState::Pending => "pending",
            OperationState::Completed => "completed",
            OperationState::Failed => "failed",
            OperationState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}
