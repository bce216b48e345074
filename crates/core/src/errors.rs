use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Result type alias for tasks server operations
pub type Result<T> = std::result::Result<T, Error>;

/// Classification carried by every terminal failure sent to a caller.
///
/// Callers only ever see one of these four kinds; the richer [`Error`]
/// variants collapse onto them through [`Error::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Malformed request or nonexistent source directory, detected before registration
    InvalidArgument,
    /// The build tool reported a failure while running
    ExecutionFailed,
    /// The operation's token was signalled before a result was produced
    Cancelled,
    /// Registry or sink invariants were violated
    InternalInconsistency,
}

impl ErrorKind {
    /// JSON-RPC error code used when this kind crosses the wire
    #[must_use]
    pub fn rpc_code(self) -> i32 {
        match self {
            ErrorKind::InvalidArgument => -32602,
            ErrorKind::ExecutionFailed => -32000,
            ErrorKind::Cancelled => -32800,
            ErrorKind::InternalInconsistency => -32603,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::ExecutionFailed => "execution failed",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InternalInconsistency => "internal inconsistency",
        };
        f.write_str(name)
    }
}

/// Core error type for tasks server operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request arguments are unusable (e.g. missing source directory)
    #[error("{message}")]
    InvalidArgument { message: String },

    /// The build tool failed while the operation was running
    #[error("{message}")]
    ExecutionFailed { message: String },

    /// The operation observed its cancellation token
    #[error("{message}")]
    Cancelled { message: String },

    /// An invariant of the registry or a result sink was violated
    #[error("internal inconsistency: {message}")]
    InternalInconsistency { message: String },

    /// Command execution errors
    #[error("{}", format_command_error(.command, .args, .message, .exit_code))]
    CommandExecution {
        command: String,
        args: Vec<String>,
        message: String,
        exit_code: Option<i32>,
    },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// File system operations
    #[error("file system {operation} operation failed for '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// Wire protocol violations from a client
    #[error("protocol error: {message}")]
    Protocol { message: String },
}

fn format_command_error(
    command: &str,
    args: &[String],
    message: &str,
    exit_code: &Option<i32>,
) -> String {
    let args_str = args.join(" ");
    let invocation = if args_str.is_empty() {
        command.to_string()
    } else {
        format!("{command} {args_str}")
    };
    match exit_code {
        Some(code) => format!("command '{invocation}' failed with exit code {code}: {message}"),
        None => format!("command '{invocation}' failed: {message}"),
    }
}

impl Error {
    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an execution failure carrying the build tool's message
    #[must_use]
    pub fn execution_failed(message: impl Into<String>) -> Self {
        Error::ExecutionFailed {
            message: message.into(),
        }
    }

    /// Create a cancellation error
    #[must_use]
    pub fn cancelled(message: impl Into<String>) -> Self {
        Error::Cancelled {
            message: message.into(),
        }
    }

    /// Create an internal inconsistency error
    #[must_use]
    pub fn internal_inconsistency(message: impl Into<String>) -> Self {
        Error::InternalInconsistency {
            message: message.into(),
        }
    }

    /// Create a command execution error
    #[must_use]
    pub fn command_execution(
        command: impl Into<String>,
        args: Vec<String>,
        message: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Error::CommandExecution {
            command: command.into(),
            args,
            message: message.into(),
            exit_code,
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Create a file system error with context
    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Create a protocol error
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol {
            message: message.into(),
        }
    }

    /// Classify this error into the kind reported to callers
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument { .. }
            | Error::Configuration { .. }
            | Error::Protocol { .. } => ErrorKind::InvalidArgument,
            Error::ExecutionFailed { .. }
            | Error::CommandExecution { .. }
            | Error::FileSystem { .. } => ErrorKind::ExecutionFailed,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
            Error::InternalInconsistency { .. } => ErrorKind::InternalInconsistency,
        }
    }

    /// Whether this error is a cancellation
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }
}
