use serde::{Deserialize, Serialize};

/// Which output stream of the build tool a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Final item of a successful project fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub source_dir: String,
    pub exit_code: i32,
}

/// Final item of a successful task run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub source_dir: String,
    pub task: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub exit_code: i32,
}

/// One incremental result streamed to a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Reply {
    /// Human-readable progress message
    Progress { message: String },
    /// A line of build tool output, forwarded verbatim
    Output { stream: OutputStream, line: String },
    /// Project fetch finished
    Project(ProjectSummary),
    /// Task run finished
    TaskResult(TaskSummary),
}

impl Reply {
    pub fn progress(message: impl Into<String>) -> Self {
        Reply::Progress {
            message: message.into(),
        }
    }

    pub fn stdout(line: impl Into<String>) -> Self {
        Reply::Output {
            stream: OutputStream::Stdout,
            line: line.into(),
        }
    }

    pub fn stderr(line: impl Into<String>) -> Self {
        Reply::Output {
            stream: OutputStream::Stderr,
            line: line.into(),
        }
    }
}

/// Outcome of a fire-and-forget cancel request. Cancel requests never fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelReport {
    /// Number of operation tokens signalled (zero is still a success)
    pub signalled: usize,
    pub message: String,
}

impl CancelReport {
    pub fn new(signalled: usize) -> Self {
        let message = if signalled == 0 {
            "No matching operations running".to_string()
        } else {
            format!("Cancel requested for {signalled} operation(s)")
        };
        Self { signalled, message }
    }

    /// Whether anything was still running when the cancel arrived
    pub fn was_running(&self) -> bool {
        self.signalled > 0
    }
}
