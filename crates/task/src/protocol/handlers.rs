//! Request decoding and dispatch onto the orchestrator

use super::types::{
    CancelRunTaskParams, GetProjectParams, JsonRpcError, JsonRpcRequest, JsonRpcResponse, Method,
    RunTaskParams, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::orchestrator::{Admission, GetProjectRequest, Orchestrator, RunTaskRequest};
use gradle_tasks_core::{CancelReport, Error, ErrorKind, JSONRPC_VERSION};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A streaming request ready to hand to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    GetProject(GetProjectRequest),
    RunTask(RunTaskRequest),
}

/// Decode one line into a known method, or the error response to send back
pub fn parse_request(line: &str) -> Result<(Method, JsonRpcRequest), JsonRpcResponse> {
    let value: Value = serde_json::from_str(line).map_err(|e| {
        JsonRpcResponse::failure(
            Value::Null,
            JsonRpcError::new(PARSE_ERROR, format!("Invalid JSON-RPC request: {e}")),
        )
    })?;
    let id = value.get("id").cloned().unwrap_or(Value::Null);

    let request: JsonRpcRequest = serde_json::from_value(value).map_err(|e| {
        JsonRpcResponse::failure(
            id.clone(),
            JsonRpcError::new(INVALID_REQUEST, format!("Invalid JSON-RPC request: {e}")),
        )
    })?;
    if request.jsonrpc != JSONRPC_VERSION {
        return Err(JsonRpcResponse::failure(
            id,
            JsonRpcError::new(
                INVALID_REQUEST,
                format!("Unsupported JSON-RPC version: {}", request.jsonrpc),
            ),
        ));
    }

    let method = Method::parse(&request.method).ok_or_else(|| {
        JsonRpcResponse::failure(
            id,
            JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        )
    })?;
    Ok((method, request))
}

fn params<T: DeserializeOwned>(request: &JsonRpcRequest) -> Result<T, JsonRpcResponse> {
    serde_json::from_value(request.params.clone()).map_err(|e| {
        JsonRpcResponse::failure(
            request.id.clone(),
            JsonRpcError::new(
                INVALID_PARAMS,
                format!("Invalid params for {}: {e}", request.method),
            ),
        )
    })
}

/// Build the orchestrator request for a streaming method
pub fn operation_request(
    method: Method,
    request: &JsonRpcRequest,
) -> Result<Operation, JsonRpcResponse> {
    match method {
        Method::GetProject => {
            let p: GetProjectParams = params(request)?;
            Ok(Operation::GetProject(GetProjectRequest {
                source_dir: p.source_dir,
            }))
        }
        Method::RunTask => {
            let p: RunTaskParams = params(request)?;
            Ok(Operation::RunTask(RunTaskRequest {
                source_dir: p.source_dir,
                task: p.task,
                args: p.args,
            }))
        }
        _ => Err(JsonRpcResponse::failure(
            request.id.clone(),
            JsonRpcError::new(INVALID_REQUEST, "Not a streaming method"),
        )),
    }
}

/// Validate and register a decoded streaming request
pub fn admit(orchestrator: &Orchestrator, operation: Operation) -> Result<Admission, Error> {
    match operation {
        Operation::GetProject(request) => orchestrator.admit_project(request),
        Operation::RunTask(request) => orchestrator.admit_task(request),
    }
}

/// Answer a cancel method immediately. Cancels never produce an error
/// response once their params decode.
pub fn handle_cancel(
    orchestrator: &Orchestrator,
    method: Method,
    request: &JsonRpcRequest,
) -> JsonRpcResponse {
    let report = match method {
        Method::CancelRunTask => match params::<CancelRunTaskParams>(request) {
            Ok(p) => orchestrator.cancel_run_task(&p.source_dir, &p.task),
            Err(response) => return response,
        },
        Method::CancelRunTasks => orchestrator.cancel_run_tasks(),
        Method::CancelGetProjects => orchestrator.cancel_get_projects(),
        Method::GetProject | Method::RunTask => {
            return JsonRpcResponse::failure(
                request.id.clone(),
                JsonRpcError::new(INVALID_REQUEST, "Not a cancel method"),
            )
        }
    };
    tracing::info!(method = %request.method, signalled = report.signalled, "{}", report.message);
    report_response(request.id.clone(), &report)
}

fn report_response(id: Value, report: &CancelReport) -> JsonRpcResponse {
    match serde_json::to_value(report) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::failure(
            id,
            JsonRpcError::from_kind(
                ErrorKind::InternalInconsistency,
                format!("Failed to serialize cancel report: {e}"),
            ),
        ),
    }
}
