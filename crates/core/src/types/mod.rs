//! Domain types shared by the registry, the orchestrator and the wire protocol

mod operation;
mod reply;

pub use operation::{OperationKey, OperationKind, OperationState};
pub use reply::{CancelReport, OutputStream, ProjectSummary, Reply, TaskSummary};
