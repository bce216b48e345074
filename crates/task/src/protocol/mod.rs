//! JSON-RPC surface of the task server
//!
//! Requests and responses are newline-delimited JSON-RPC 2.0 objects.
//! `getProject` and `runTask` stream `reply` notifications carrying the
//! request id, then finish with exactly one response: `result: null` on
//! success or an error whose `data.kind` names the failure. The cancel
//! methods answer immediately with a cancel report.

mod handlers;
mod server;
mod types;

pub use handlers::{admit, handle_cancel, operation_request, parse_request, Operation};
pub use server::TaskServer;
pub use types::*;
