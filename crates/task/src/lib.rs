//! Operation registry, orchestration and transport for the Gradle tasks server
//!
//! This crate tracks in-flight `getProject`/`runTask` operations, lets
//! callers cancel them by key or by kind, and exposes both over JSON-RPC.

pub mod build_tool;
pub mod gradle;
pub mod orchestrator;
pub mod protocol;
pub mod registry;
pub mod sink;

pub use build_tool::{BuildTool, Emitter, OperationContext};
pub use gradle::GradleCli;
pub use orchestrator::{
    normalize_source_dir, validate_source_dir, Admission, GetProjectRequest, Orchestrator,
    RunTaskRequest,
};
pub use protocol::TaskServer;
pub use registry::{OperationHandle, OperationRegistry};
pub use sink::{channel, ChannelSink, ResultSink, SinkError, StreamEvent};
