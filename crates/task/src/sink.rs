//! Result stream sinks
//!
//! A sink carries the replies of exactly one operation to exactly one caller
//! and ends with exactly one terminal signal. The terminal slot is claimed
//! with a compare-and-set: the first `complete`/`fail` wins, later attempts
//! are logged and dropped.

use async_trait::async_trait;
use gradle_tasks_core::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Why a reply could not be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// A terminal signal has already been sent
    #[error("result stream already finalized")]
    Finalized,
    /// The caller stopped listening
    #[error("caller disconnected")]
    Disconnected,
}

/// Destination for one operation's streamed results
#[async_trait]
pub trait ResultSink<T: Send + 'static>: Send + Sync {
    /// Deliver one incremental result, preserving call order
    async fn send(&self, item: T) -> Result<(), SinkError>;

    /// Signal success. Returns `false` if the stream was already finalized.
    async fn complete(&self) -> bool;

    /// Signal a classified failure. Returns `false` if the stream was already finalized.
    async fn fail(&self, kind: ErrorKind, message: String) -> bool;

    /// Resolves once the caller can no longer receive anything
    async fn closed(&self);
}

/// What a [`ChannelSink`] puts on its channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent<T> {
    Item(T),
    Completed,
    Failed { kind: ErrorKind, message: String },
}

impl<T> StreamEvent<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Item(_))
    }
}

/// Sink backed by a bounded tokio channel.
///
/// The bound gives backpressure: a slow caller slows the build tool's output
/// instead of growing memory. Dropping the receiver reads as a disconnect.
pub struct ChannelSink<T> {
    tx: mpsc::Sender<StreamEvent<T>>,
    finalized: AtomicBool,
}

/// Create a sink and the receiver the transport drains
pub fn channel<T>(buffer: usize) -> (ChannelSink<T>, mpsc::Receiver<StreamEvent<T>>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (
        ChannelSink {
            tx,
            finalized: AtomicBool::new(false),
        },
        rx,
    )
}

impl<T> ChannelSink<T> {
    fn claim_terminal(&self) -> bool {
        self.finalized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[async_trait]
impl<T: Send + 'static> ResultSink<T> for ChannelSink<T> {
    async fn send(&self, item: T) -> Result<(), SinkError> {
        if self.finalized.load(Ordering::Acquire) {
            tracing::debug!("Dropping reply sent after terminal signal");
            return Err(SinkError::Finalized);
        }
        self.tx
            .send(StreamEvent::Item(item))
            .await
            .map_err(|_| SinkError::Disconnected)
    }

    async fn complete(&self) -> bool {
        if !self.claim_terminal() {
            tracing::warn!(
                kind = %ErrorKind::InternalInconsistency,
                "Suppressed duplicate terminal signal (complete)"
            );
            return false;
        }
        if self.tx.send(StreamEvent::Completed).await.is_err() {
            tracing::debug!("Caller gone before completion was delivered");
        }
        true
    }

    async fn fail(&self, kind: ErrorKind, message: String) -> bool {
        if !self.claim_terminal() {
            tracing::warn!(
                kind = %ErrorKind::InternalInconsistency,
                suppressed = %kind,
                "Suppressed duplicate terminal signal (fail)"
            );
            return false;
        }
        if self
            .tx
            .send(StreamEvent::Failed { kind, message })
            .await
            .is_err()
        {
            tracing::debug!("Caller gone before failure was delivered");
        }
        true
    }

    async fn closed(&self) {
        self.tx.closed().await;
    }
}
