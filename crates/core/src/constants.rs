/// Constants shared across the tasks server workspace
// Error message templates
pub const SOURCE_DIR_ERROR_PREFIX: &str = "Source directory does not exist: ";

// Environment variable names
pub const TRANSPORT_VAR: &str = "GRADLE_TASKS_TRANSPORT";
pub const SOCKET_VAR: &str = "GRADLE_TASKS_SOCKET";
pub const GRADLE_VAR: &str = "GRADLE_TASKS_GRADLE";
pub const REPLY_BUFFER_VAR: &str = "GRADLE_TASKS_REPLY_BUFFER";

// Build tool defaults
pub const GRADLE_WRAPPER_UNIX: &str = "gradlew";
pub const GRADLE_WRAPPER_WINDOWS: &str = "gradlew.bat";
pub const GRADLE_EXECUTABLE: &str = "gradle";

// Seconds to wait for cancelled operations to settle on shutdown
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

// Default number of replies buffered per operation before backpressure applies
pub const DEFAULT_REPLY_BUFFER: usize = 64;

// JSON-RPC
pub const JSONRPC_VERSION: &str = "2.0";
pub const REPLY_NOTIFICATION: &str = "reply";
