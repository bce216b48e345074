//! Line-delimited JSON-RPC server over a Unix socket or stdio

use super::handlers::{self, Operation};
use super::types::{JsonRpcError, JsonRpcNotification, JsonRpcResponse, PARSE_ERROR};
use crate::orchestrator::Orchestrator;
use crate::sink::{self, ResultSink, StreamEvent};
use gradle_tasks_core::{CancelReport, CancellationToken, Error, ErrorKind, Reply, Result};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

const OUTBOUND_BUFFER: usize = 256;

/// Serves the orchestrator to any number of connections
#[derive(Clone)]
pub struct TaskServer {
    orchestrator: Arc<Orchestrator>,
    reply_buffer: usize,
    operations: TaskTracker,
}

impl TaskServer {
    pub fn new(orchestrator: Arc<Orchestrator>, reply_buffer: usize) -> Self {
        Self {
            orchestrator,
            reply_buffer: reply_buffer.max(1),
            operations: TaskTracker::new(),
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Cancel everything in flight and wait up to `grace` for the
    /// operations to settle, so their child processes are reaped first.
    pub async fn shutdown(&self, grace: Duration) -> CancelReport {
        let report = self.orchestrator.cancel_everything();
        self.operations.close();
        if tokio::time::timeout(grace, self.operations.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.operations.len(),
                grace_secs = grace.as_secs(),
                "Operations still running after shutdown grace period"
            );
        }
        report
    }

    /// Listen on `socket_path` until `shutdown` resolves
    #[cfg(unix)]
    pub async fn serve_unix<F>(&self, socket_path: &Path, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if socket_path.exists() {
            tokio::fs::remove_file(socket_path).await.map_err(|e| {
                Error::file_system(socket_path.to_path_buf(), "remove existing socket", e)
            })?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::file_system(parent.to_path_buf(), "create socket parent directory", e)
            })?;
        }

        let listener = tokio::net::UnixListener::bind(socket_path).map_err(|e| {
            Error::configuration(format!(
                "Failed to bind to socket {}: {e}",
                socket_path.display()
            ))
        })?;
        tracing::info!(socket_path = %socket_path.display(), "Task server started");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let server = self.clone();
                        tokio::spawn(async move {
                            let (reader, writer) = stream.into_split();
                            if let Err(e) = server.serve_connection(reader, writer).await {
                                tracing::error!(error = %e, "Client connection error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }

        if let Err(e) = tokio::fs::remove_file(socket_path).await {
            tracing::debug!(error = %e, "Socket already removed");
        }
        tracing::info!("Task server stopped");
        Ok(())
    }

    /// Serve a single client on stdin/stdout
    pub async fn serve_stdio(&self) -> Result<()> {
        tracing::info!("Task server started in stdio mode");
        self.serve_connection(tokio::io::stdin(), tokio::io::stdout())
            .await
    }

    /// Serve one connection until the reader hits end of stream.
    ///
    /// Streaming requests run concurrently. Closing the connection cancels
    /// the operations it started and leaves everyone else's alone.
    pub async fn serve_connection<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
        let writer_task = tokio::spawn(write_lines(writer, out_rx));
        let closed = CancellationToken::new();

        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let result = loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break Ok(()),
                Ok(_) => {}
                Err(e) => break Err(Error::protocol(format!("Failed to read from client: {e}"))),
            }

            let response = match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => self.dispatch(line.trim(), &out_tx, &closed),
                Err(e) => Some(JsonRpcResponse::failure(
                    Value::Null,
                    JsonRpcError::new(
                        PARSE_ERROR,
                        format!("Invalid JSON-RPC request: line is not valid UTF-8: {e}"),
                    ),
                )),
            };

            if let Some(response) = response {
                if !send_line(&out_tx, &response).await {
                    break Ok(());
                }
            }
        };

        tracing::debug!("Client disconnected");
        closed.signal();
        drop(out_tx);
        if let Err(e) = writer_task.await {
            tracing::warn!(error = %e, "Connection writer task failed");
        }
        result
    }

    /// Handle one request line, returning the response to send now if any
    fn dispatch(
        &self,
        line: &str,
        out_tx: &mpsc::Sender<String>,
        closed: &CancellationToken,
    ) -> Option<JsonRpcResponse> {
        match handlers::parse_request(line) {
            Err(response) => Some(response),
            Ok((method, request)) if method.is_streaming() => {
                match handlers::operation_request(method, &request) {
                    Ok(operation) => self.start_operation(request.id, operation, out_tx, closed),
                    Err(response) => Some(response),
                }
            }
            Ok((method, request)) => Some(handlers::handle_cancel(
                &self.orchestrator,
                method,
                &request,
            )),
        }
    }

    /// Register the operation before the next line is read, then run it in
    /// the background. Rejections come back as the immediate response.
    fn start_operation(
        &self,
        id: Value,
        operation: Operation,
        out_tx: &mpsc::Sender<String>,
        closed: &CancellationToken,
    ) -> Option<JsonRpcResponse> {
        let admission = match handlers::admit(&self.orchestrator, operation) {
            Ok(admission) => admission,
            Err(e) => {
                tracing::error!(error = %e, "Rejected request");
                return Some(JsonRpcResponse::failure(
                    id,
                    JsonRpcError::from_kind(e.kind(), e.to_string()),
                ));
            }
        };

        let (sink, events) = sink::channel::<Reply>(self.reply_buffer);
        let sink: Arc<dyn ResultSink<Reply>> = Arc::new(sink);

        tokio::spawn(forward_events(
            id,
            events,
            out_tx.clone(),
            closed.clone(),
        ));

        let orchestrator = Arc::clone(&self.orchestrator);
        self.operations.spawn(async move {
            orchestrator.run(admission, sink).await;
        });
        None
    }
}

/// Relay one operation's events to the connection. Dropping `events`
/// when the connection closes is what cancels the operation.
async fn forward_events(
    id: Value,
    mut events: mpsc::Receiver<StreamEvent<Reply>>,
    out_tx: mpsc::Sender<String>,
    closed: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = closed.cancelled() => return,
            event = events.recv() => event,
        };

        let Some(event) = event else {
            tracing::warn!(
                kind = %ErrorKind::InternalInconsistency,
                "Operation stream ended without a terminal signal"
            );
            let error = JsonRpcError::from_kind(
                ErrorKind::InternalInconsistency,
                "internal inconsistency: operation ended without a result",
            );
            send_line(&out_tx, &JsonRpcResponse::failure(id, error)).await;
            return;
        };

        let terminal = event.is_terminal();
        let delivered = match event {
            StreamEvent::Item(reply) => {
                send_line(&out_tx, &JsonRpcNotification::reply(id.clone(), reply)).await
            }
            StreamEvent::Completed => {
                send_line(&out_tx, &JsonRpcResponse::success(id.clone(), Value::Null)).await
            }
            StreamEvent::Failed { kind, message } => {
                let error = JsonRpcError::from_kind(kind, message);
                send_line(&out_tx, &JsonRpcResponse::failure(id.clone(), error)).await
            }
        };
        if terminal || !delivered {
            return;
        }
    }
}

async fn send_line<T: Serialize>(out_tx: &mpsc::Sender<String>, message: &T) -> bool {
    match serde_json::to_string(message) {
        Ok(json) => out_tx.send(json).await.is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize message");
            true
        }
    }
}

async fn write_lines<W>(mut writer: W, mut lines: mpsc::Receiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            tracing::debug!(error = %e, "Failed to write to client");
            break;
        }
    }
}
