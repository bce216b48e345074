use eyre::WrapErr;
use gradle_tasks_config::{ServerConfig, Transport};
use gradle_tasks_core::SHUTDOWN_GRACE_SECS;
use gradle_tasks_task::{GradleCli, Orchestrator, TaskServer};
use std::sync::Arc;
use std::time::Duration;

/// Serve until the transport closes or Ctrl+C arrives
pub async fn execute(config: ServerConfig) -> eyre::Result<()> {
    let tool = Arc::new(GradleCli::new(config.build_tool.clone()));
    let orchestrator = Arc::new(Orchestrator::new(tool));
    let server = TaskServer::new(orchestrator, config.reply_buffer);

    let result = match config.transport {
        Transport::Stdio => {
            tokio::select! {
                result = server.serve_stdio() => result.wrap_err("stdio transport failed"),
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received interrupt signal, stopping server");
                    Ok(())
                }
            }
        }
        Transport::Unix => {
            let socket_path = config
                .socket_path
                .clone()
                .ok_or_else(|| eyre::eyre!("The unix transport requires a socket path"))?;
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for interrupt signal");
                    std::future::pending::<()>().await;
                }
                tracing::info!("Received interrupt signal, stopping server");
            };
            server
                .serve_unix(&socket_path, shutdown)
                .await
                .wrap_err_with(|| format!("unix transport failed on {}", socket_path.display()))
        }
    };

    let report = server
        .shutdown(Duration::from_secs(SHUTDOWN_GRACE_SECS))
        .await;
    if report.was_running() {
        tracing::info!(signalled = report.signalled, "Cancelled in-flight operations");
    }
    result
}
