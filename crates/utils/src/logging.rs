use gradle_tasks_core::{OperationKey, OperationState};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tracing::{info, span, warn, Level, Span};

/// Initialize the tracing system
///
/// Output always goes to stderr: stdout belongs to the stdio transport.
/// `RUST_LOG` wins when set; otherwise the level follows `verbosity`
/// (0 = info, 1 = debug, 2+ = trace).
pub fn init(verbosity: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(verbosity)))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(is_tty())
        .compact()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Check if stderr is attached to a terminal
fn is_tty() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stderr())
}

/// Create a span covering one operation from registration to terminal signal
pub fn operation_span(key: &OperationKey, operation_id: u64) -> Span {
    span!(
        Level::INFO,
        "operation",
        operation_id = %operation_id,
        kind = %key.kind(),
        source_dir = %key.source_dir(),
        task = key.task_name().unwrap_or("")
    )
}

/// Emit a structured event when an operation is accepted
pub fn operation_started(key: &OperationKey, operation_id: u64) {
    info!(
        operation_id = %operation_id,
        kind = %key.kind(),
        source_dir = %key.source_dir(),
        task = key.task_name().unwrap_or(""),
        "operation_started"
    );
}

/// Emit a structured event when an operation reaches a terminal state
pub fn operation_finished(
    key: &OperationKey,
    operation_id: u64,
    state: OperationState,
    duration_ms: u64,
) {
    match state {
        OperationState::Completed => info!(
            operation_id = %operation_id,
            kind = %key.kind(),
            duration_ms = %duration_ms,
            "operation_completed"
        ),
        OperationState::Cancelled => info!(
            operation_id = %operation_id,
            kind = %key.kind(),
            duration_ms = %duration_ms,
            "operation_cancelled"
        ),
        _ => warn!(
            operation_id = %operation_id,
            kind = %key.kind(),
            duration_ms = %duration_ms,
            state = %state,
            "operation_failed"
        ),
    }
}
